//! Token lifecycle manager
//!
//! Every request that needs the Xero API asks the manager for a client. The
//! manager reads the cached auth record, installs its token set, and then
//! either refreshes an expired access token (rotating the refresh token,
//! re-listing tenants and overwriting the record) or just re-lists tenants.
//!
//! Tenants are re-fetched on every acquisition, even without a refresh,
//! because connection changes made in Xero only become visible through that
//! call. This costs one extra provider round-trip per request.
//!
//! Refresh-and-persist runs under a mutex. A request that waited on it
//! re-reads the record first and reuses a token another request already
//! rotated, instead of presenting the now-dead refresh token to Xero. The
//! mutex is per process; separate gateway instances sharing one store can
//! still race, and the loser gets `RefreshFailed`.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use xero_auth::{CallbackParams, TokenSet, XeroClient, XeroConfig};

use crate::auth_data::{AuthData, project};
use crate::error::{Error, Result};
use crate::store::{AUTH_DATA_KEY, CredentialStore};

pub struct SessionManager {
    config: Arc<XeroConfig>,
    store: Arc<dyn CredentialStore>,
    http_client: reqwest::Client,
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    /// `http_client` should carry the outbound request timeout; a timed-out
    /// refresh surfaces as `RefreshFailed`.
    pub fn new(
        config: Arc<XeroConfig>,
        store: Arc<dyn CredentialStore>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            store,
            http_client,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &XeroConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// A client configured for this app with no token set installed.
    pub fn new_client(&self) -> XeroClient {
        XeroClient::new(self.config.clone(), self.http_client.clone())
    }

    /// Read and parse the cached auth record.
    pub async fn load_auth_data(&self) -> Result<AuthData> {
        let raw = self
            .store
            .get(AUTH_DATA_KEY)
            .await?
            .ok_or_else(|| Error::NotAuthenticated("no cached auth record".into()))?;

        serde_json::from_str(&raw).map_err(|e| {
            warn!(error = %e, "cached auth record is not valid JSON");
            Error::CorruptRecord(e.to_string())
        })
    }

    /// Overwrite the cached auth record.
    pub async fn save_auth_data(&self, auth_data: &AuthData) -> Result<()> {
        let json = serde_json::to_string(auth_data)
            .map_err(|e| Error::CorruptRecord(format!("serializing auth record: {e}")))?;
        self.store.set(AUTH_DATA_KEY, &json).await
    }

    /// Return a client with a valid access token and a fresh tenant list.
    pub async fn acquire_authenticated_client(&self) -> Result<XeroClient> {
        let mut client = self.new_client();

        let token_set = self
            .load_auth_data()
            .await?
            .token_set
            .ok_or_else(|| Error::NotAuthenticated("cached record has no token set".into()))?;
        client.set_token_set(token_set.clone());

        if token_set.expired() {
            debug!("access token expired, refreshing");
            self.refresh(&mut client, &token_set).await?;
        } else {
            client.update_tenants().await?;
            metrics::counter!("xero_token_refresh_total", "outcome" => "skipped").increment(1);
        }

        Ok(client)
    }

    /// Finish the consent flow: exchange the code, list tenants and cache the
    /// new record, replacing whatever session existed before.
    pub async fn complete_consent(&self, params: &CallbackParams) -> Result<(XeroClient, AuthData)> {
        let mut client = self.new_client();
        let token_set = client.api_callback(params).await?;
        client.update_tenants().await?;

        let auth_data = project(&token_set, client.tenants(), client.active_tenant());
        self.save_auth_data(&auth_data).await?;

        info!(tenants = client.tenants().len(), "consent completed, session cached");
        Ok((client, auth_data))
    }

    async fn refresh(&self, client: &mut XeroClient, stale: &TokenSet) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let record = self.load_auth_data().await?;
        let current = record
            .token_set
            .clone()
            .ok_or_else(|| Error::NotAuthenticated("cached record has no token set".into()))?;

        if current != *stale && !current.expired() {
            debug!("token already rotated by a concurrent request");
            client.set_token_set(current);
            client.update_tenants().await?;
            metrics::counter!("xero_token_refresh_total", "outcome" => "skipped").increment(1);
            return Ok(());
        }

        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::RefreshFailed("cached token set has no refresh token".into()))?;

        let token_set = client
            .refresh_with_refresh_token(
                &self.config.client_id,
                self.config.client_secret.expose(),
                refresh_token,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, rejected = e.is_rejection(), "token refresh failed");
                metrics::counter!("xero_token_refresh_total", "outcome" => "failure").increment(1);
                Error::RefreshFailed(e.to_string())
            })?;

        // The old refresh token is dead from here on. Cache the new one with
        // the previous tenants before anything else can fail.
        let rotated = project(&token_set, &record.all_tenants, record.active_tenant.as_ref());
        self.save_auth_data(&rotated).await?;
        metrics::counter!("xero_token_refresh_total", "outcome" => "success").increment(1);

        client.update_tenants().await?;

        let auth_data = project(&token_set, client.tenants(), client.active_tenant());
        self.save_auth_data(&auth_data).await?;

        info!(tenants = client.tenants().len(), "token refreshed and session cached");
        Ok(())
    }
}
