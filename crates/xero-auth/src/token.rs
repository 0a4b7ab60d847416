//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (consent callback)
//! 2. Refresh-token grant (request-time refresh of an expired access token)
//!
//! Both POST to the identity service's token endpoint with the app's client
//! id and secret as HTTP basic auth. Xero rotates the refresh token on every
//! refresh, so the previous one is dead once this call succeeds.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::claims;
use crate::error::{Error, Result};

/// Raw response from the token endpoint for both exchange and refresh.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// The credential bundle kept in the auth record.
///
/// Field names are the OAuth wire names so the persisted JSON reads
/// `tokenSet.refresh_token` like every other client of this store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Absolute expiry in unix seconds, computed when the response arrived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Build a token set from a token endpoint response received at `now`
    /// (unix seconds).
    pub fn from_response(response: TokenResponse, now: i64) -> Self {
        let expires_in = i64::try_from(response.expires_in).unwrap_or(i64::MAX);
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            id_token: response.id_token,
            expires_at: Some(now.saturating_add(expires_in)),
            token_type: response.token_type,
            scope: response.scope,
        }
    }

    /// Expiry of the access token in unix seconds.
    ///
    /// The `exp` claim inside the access token is authoritative; the
    /// `expires_at` computed at receipt is only a fallback for opaque tokens.
    pub fn expires_at(&self) -> Option<i64> {
        claims::expiry(&self.access_token).or(self.expires_at)
    }

    /// Whether the access token is expired at `now` (unix seconds).
    ///
    /// No grace period is applied. A token whose expiry cannot be determined
    /// counts as expired so it gets refreshed rather than sent and rejected.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expires_at() {
            Some(exp) => exp <= now,
            None => true,
        }
    }

    /// Whether the access token is expired right now.
    pub fn expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }
}

/// Current time as unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Exchange an authorization code for tokens (consent callback).
pub async fn exchange_code(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenSet> {
    let response = client
        .post(token_url)
        .basic_auth(client_id, Some(client_secret))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

    debug!("authorization code exchanged");
    Ok(TokenSet::from_response(token, unix_now()))
}

/// Refresh an access token using a refresh token.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh: &str,
) -> Result<TokenSet> {
    let response = client
        .post(token_url)
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // Xero answers invalid_grant with 400 for revoked or already-rotated tokens
        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))?;

    Ok(TokenSet::from_response(token, unix_now()))
}
