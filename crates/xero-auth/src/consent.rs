//! Authorization-code consent flow
//!
//! Builds the consent URL the user is sent to and validates the query string
//! Xero appends when redirecting back. The anti-CSRF `state` is a fixed value
//! taken from config; the callback must echo it unchanged.

use serde::Deserialize;
use url::Url;

use crate::config::XeroConfig;
use crate::error::{Error, Result};

/// Query parameters on the redirect back from Xero.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Build the consent URL with all required OAuth parameters.
pub fn build_consent_url(config: &XeroConfig) -> Result<String> {
    let redirect_uri = config
        .redirect_uri()
        .ok_or_else(|| Error::Callback("no redirect URI configured".into()))?;

    let mut url = Url::parse(&config.endpoints.authorize_url)
        .map_err(|e| Error::Callback(format!("invalid authorize URL: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scopes.join(" "))
        .append_pair("state", &config.state);

    Ok(url.into())
}

/// Check the callback and return the authorization code.
///
/// A provider-reported error wins over everything else; otherwise the state
/// must match before the code is trusted.
pub fn validate_callback(config: &XeroConfig, params: &CallbackParams) -> Result<String> {
    if let Some(error) = &params.error {
        let description = params.error_description.as_deref().unwrap_or("");
        return Err(Error::Callback(format!("{error} {description}").trim().to_string()));
    }

    if params.state.as_deref() != Some(config.state.as_str()) {
        return Err(Error::StateMismatch);
    }

    params
        .code
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Callback("missing authorization code".into()))
}
