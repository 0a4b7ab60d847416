//! Error types for Xero identity and API operations

/// Errors from Xero identity and accounting API operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("no token set installed on client")]
    MissingTokenSet,

    #[error("callback state does not match the configured state")]
    StateMismatch,

    #[error("authorization callback rejected: {0}")]
    Callback(String),

    #[error("Xero API returned {status}: {body}")]
    Api { status: u16, body: String },
}

impl Error {
    /// Whether the provider rejected the credentials themselves (revoked or
    /// rotated refresh token, bad client secret) rather than failing in transit.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::InvalidCredentials(_))
    }
}

/// Result alias for Xero operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status_and_body() {
        let err = Error::Api {
            status: 404,
            body: "not found".into(),
        };
        assert_eq!(err.to_string(), "Xero API returned 404: not found");
    }

    #[test]
    fn only_invalid_credentials_is_a_rejection() {
        assert!(Error::InvalidCredentials("revoked".into()).is_rejection());
        assert!(!Error::Http("timeout".into()).is_rejection());
        assert!(!Error::TokenExchange("bad json".into()).is_rejection());
    }
}
