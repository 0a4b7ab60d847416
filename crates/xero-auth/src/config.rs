//! Client configuration: app credentials, consent parameters and endpoints

use common::Secret;
use serde::Deserialize;

use crate::constants::{
    ACCOUNTING_API_BASE, AUTHORIZE_ENDPOINT, CONNECTIONS_ENDPOINT, DEFAULT_SCOPES, DEFAULT_STATE,
    TOKEN_ENDPOINT,
};

/// Everything a `XeroClient` needs to talk to Xero on behalf of one app.
#[derive(Debug, Clone)]
pub struct XeroConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// The first entry is sent as `redirect_uri` during consent and exchange
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    pub state: String,
    pub endpoints: Endpoints,
}

impl XeroConfig {
    /// Config with the default scopes, state and production endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        redirect_uris: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            redirect_uris,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            state: DEFAULT_STATE.to_string(),
            endpoints: Endpoints::default(),
        }
    }

    /// Redirect URI registered for this app, if any.
    pub fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uris.first().map(String::as_str)
    }
}

/// Provider URLs. Defaults point at Xero production.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub connections_url: String,
    pub api_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_ENDPOINT.to_string(),
            token_url: TOKEN_ENDPOINT.to_string(),
            connections_url: CONNECTIONS_ENDPOINT.to_string(),
            api_url: ACCOUNTING_API_BASE.to_string(),
        }
    }
}

impl Endpoints {
    /// All endpoints served from one base URL (stub servers, sandboxes).
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            authorize_url: format!("{base}/identity/connect/authorize"),
            token_url: format!("{base}/connect/token"),
            connections_url: format!("{base}/connections"),
            api_url: format!("{base}/api.xro/2.0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_default_scopes_and_state() {
        let config = XeroConfig::new(
            "client",
            Secret::from("secret"),
            vec!["http://localhost:8000/xero/callback".into()],
        );
        assert_eq!(config.state, "id=123");
        assert!(config.scopes.iter().any(|s| s == "offline_access"));
        assert_eq!(config.scopes.len(), 10);
        assert_eq!(
            config.redirect_uri(),
            Some("http://localhost:8000/xero/callback")
        );
    }

    #[test]
    fn endpoints_with_base_strips_trailing_slash() {
        let endpoints = Endpoints::with_base("http://127.0.0.1:9000/");
        assert_eq!(endpoints.token_url, "http://127.0.0.1:9000/connect/token");
        assert_eq!(endpoints.connections_url, "http://127.0.0.1:9000/connections");
    }

    #[test]
    fn endpoints_deserialize_partial_overrides() {
        let endpoints: Endpoints =
            serde_json::from_str(r#"{"api_url":"http://sandbox/api.xro/2.0"}"#).unwrap();
        assert_eq!(endpoints.api_url, "http://sandbox/api.xro/2.0");
        assert_eq!(endpoints.token_url, TOKEN_ENDPOINT);
    }
}
