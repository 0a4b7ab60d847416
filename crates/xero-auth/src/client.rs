//! Authenticated Xero client
//!
//! Holds the app config, the currently installed token set and the tenant
//! list. The session manager builds one per request, installs the cached
//! token set, refreshes it if needed and hands it to the route handler,
//! which then calls the accounting API through it (see `accounting`).

use std::sync::Arc;

use tracing::debug;

use crate::config::XeroConfig;
use crate::consent::{self, CallbackParams};
use crate::error::{Error, Result};
use crate::tenants::{self, Tenant};
use crate::token::{self, TokenSet};

#[derive(Debug, Clone)]
pub struct XeroClient {
    config: Arc<XeroConfig>,
    http: reqwest::Client,
    token_set: Option<TokenSet>,
    tenants: Vec<Tenant>,
}

impl XeroClient {
    pub fn new(config: Arc<XeroConfig>, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            token_set: None,
            tenants: Vec::new(),
        }
    }

    pub fn config(&self) -> &XeroConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// URL to send the user to for consent.
    pub fn build_consent_url(&self) -> Result<String> {
        consent::build_consent_url(&self.config)
    }

    /// Complete the consent flow: validate the callback, exchange the code
    /// and install the resulting token set.
    pub async fn api_callback(&mut self, params: &CallbackParams) -> Result<TokenSet> {
        let code = consent::validate_callback(&self.config, params)?;
        let redirect_uri = self
            .config
            .redirect_uri()
            .ok_or_else(|| Error::Callback("no redirect URI configured".into()))?;

        let token_set = token::exchange_code(
            &self.http,
            &self.config.endpoints.token_url,
            &self.config.client_id,
            self.config.client_secret.expose(),
            &code,
            redirect_uri,
        )
        .await?;

        self.token_set = Some(token_set.clone());
        Ok(token_set)
    }

    pub fn set_token_set(&mut self, token_set: TokenSet) {
        self.token_set = Some(token_set);
    }

    pub fn read_token_set(&self) -> Option<&TokenSet> {
        self.token_set.as_ref()
    }

    /// Run the refresh-token grant with the given credentials and install
    /// the rotated token set.
    pub async fn refresh_with_refresh_token(
        &mut self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenSet> {
        let token_set = token::refresh_token(
            &self.http,
            &self.config.endpoints.token_url,
            client_id,
            client_secret,
            refresh_token,
        )
        .await?;

        debug!("installed refreshed token set");
        self.token_set = Some(token_set.clone());
        Ok(token_set)
    }

    /// Re-fetch the connected tenants with the installed access token.
    pub async fn update_tenants(&mut self) -> Result<&[Tenant]> {
        let tenants = tenants::list_connections(
            &self.http,
            &self.config.endpoints.connections_url,
            self.access_token()?,
        )
        .await?;

        debug!(tenants = tenants.len(), "tenants updated");
        self.tenants = tenants;
        Ok(&self.tenants)
    }

    pub fn tenants(&self) -> &[Tenant] {
        &self.tenants
    }

    /// The tenant API calls act on: the first connection.
    pub fn active_tenant(&self) -> Option<&Tenant> {
        self.tenants.first()
    }

    pub(crate) fn access_token(&self) -> Result<&str> {
        self.token_set
            .as_ref()
            .map(|t| t.access_token.as_str())
            .ok_or(Error::MissingTokenSet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use common::Secret;

    fn test_client() -> XeroClient {
        let mut config = XeroConfig::new(
            "client",
            Secret::from("secret"),
            vec!["http://localhost:8000/xero/callback".into()],
        );
        config.endpoints = Endpoints::with_base("http://127.0.0.1:1");
        XeroClient::new(Arc::new(config), reqwest::Client::new())
    }

    #[test]
    fn new_client_has_no_token_set_or_tenants() {
        let client = test_client();
        assert!(client.read_token_set().is_none());
        assert!(client.tenants().is_empty());
        assert!(client.active_tenant().is_none());
    }

    #[tokio::test]
    async fn update_tenants_without_token_set_fails_fast() {
        let mut client = test_client();
        let err = client.update_tenants().await.unwrap_err();
        assert!(matches!(err, Error::MissingTokenSet), "got: {err}");
    }

    #[tokio::test]
    async fn callback_with_bad_state_never_reaches_token_endpoint() {
        let mut client = test_client();
        let params = CallbackParams {
            code: Some("code".into()),
            state: Some("forged".into()),
            ..Default::default()
        };
        let err = client.api_callback(&params).await.unwrap_err();
        assert!(matches!(err, Error::StateMismatch), "got: {err}");
        assert!(client.read_token_set().is_none());
    }

    #[test]
    fn set_token_set_is_readable() {
        let mut client = test_client();
        client.set_token_set(TokenSet {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            id_token: None,
            expires_at: None,
            token_type: None,
            scope: None,
        });
        assert_eq!(client.read_token_set().unwrap().access_token, "at");
        assert_eq!(client.access_token().unwrap(), "at");
    }
}
