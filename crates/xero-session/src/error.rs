//! Error types for session operations

/// Errors from acquiring or persisting the Xero session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable cached credential; the user must go through consent again.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// Xero rejected the refresh grant; the cached refresh token is dead.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// The cached record is not a parsable auth record.
    #[error("corrupt auth record: {0}")]
    CorruptRecord(String),

    /// Any other Xero call made while establishing the session
    /// (tenant listing, code exchange).
    #[error("Xero request failed: {0}")]
    Provider(#[from] xero_auth::Error),
}

impl Error {
    /// Whether the caller has to send the user back through consent.
    pub fn requires_consent(&self) -> bool {
        matches!(
            self,
            Error::NotAuthenticated(_) | Error::RefreshFailed(_) | Error::CorruptRecord(_)
        )
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_required_for_unusable_credentials() {
        assert!(Error::NotAuthenticated("empty".into()).requires_consent());
        assert!(Error::RefreshFailed("invalid_grant".into()).requires_consent());
        assert!(Error::CorruptRecord("bad json".into()).requires_consent());
        assert!(!Error::StoreUnavailable("refused".into()).requires_consent());
    }

    #[test]
    fn provider_error_converts_with_context() {
        let err: Error = xero_auth::Error::Api {
            status: 503,
            body: "down".into(),
        }
        .into();
        assert!(matches!(err, Error::Provider(_)));
        assert!(err.to_string().contains("503"), "got: {err}");
    }
}
