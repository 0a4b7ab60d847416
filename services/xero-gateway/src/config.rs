//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The file is
//! optional; a deployment can run on env vars alone. Client secret and
//! webhook key are usually supplied through the environment so they never
//! sit in the TOML.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::Secret;
use serde::Deserialize;
use xero_auth::{DEFAULT_SCOPES, DEFAULT_STATE, Endpoints, XeroConfig};

/// Default config file looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "xero-gateway.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub xero: XeroSection,
    pub store: StoreConfig,
    pub merchant: MerchantConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Timeout for every outbound call (Xero and the credential store)
    pub timeout_secs: u64,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            timeout_secs: 30,
            max_connections: 1000,
        }
    }
}

/// Xero app registration
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct XeroSection {
    pub client_id: Option<String>,
    pub client_secret: Option<Secret<String>>,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    pub state: String,
    /// Signing key for inbound webhooks; deliveries are rejected without one
    pub webhook_key: Option<Secret<String>>,
    pub endpoints: Endpoints,
}

impl Default for XeroSection {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uris: Vec::new(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            state: DEFAULT_STATE.to_string(),
            webhook_key: None,
            endpoints: Endpoints::default(),
        }
    }
}

/// Where the session record lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// Process-local; the session is lost on restart
    Memory,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".into(),
        }
    }
}

/// Defaults for the payer-validation and payment endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MerchantConfig {
    pub merchant_code: String,
    pub service_group_code: String,
    pub payer_must_pay_total_amount: String,
    pub amount: String,
    pub department_code: String,
    pub department_name: String,
    pub class_name: String,
    pub currency: String,
    pub comment: String,
    /// Bank account receiving overpayments
    pub bank_account_number: String,
    /// Account code payments are applied to
    pub payment_account_code: String,
}

impl Default for MerchantConfig {
    fn default() -> Self {
        Self {
            merchant_code: "TH0001".into(),
            service_group_code: "0001".into(),
            payer_must_pay_total_amount: "NO".into(),
            amount: "5".into(),
            department_code: "0001".into(),
            department_name: "Department 1".into(),
            class_name: "Class 1".into(),
            currency: "RWF".into(),
            comment: "School fees".into(),
            bank_account_number: "1234567890".into(),
            payment_account_code: "890".into(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay
    /// environment variables and validate.
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            None => Config::default(),
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Ok(id) = std::env::var("XERO_CLIENT_ID") {
            self.xero.client_id = Some(id);
        }
        if let Ok(secret) = std::env::var("XERO_CLIENT_SECRET") {
            self.xero.client_secret = Some(Secret::new(secret));
        }
        if let Ok(uris) = std::env::var("XERO_REDIRECT_URI") {
            self.xero.redirect_uris = uris
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(key) = std::env::var("XERO_WEBHOOK_KEY") {
            self.xero.webhook_key = Some(Secret::new(key));
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.store.redis_url = url;
        }
        if let Ok(port) = std::env::var("PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|_| common::Error::InvalidEnv { name: "PORT", value: port.clone() })?;
            self.server.listen_addr.set_port(port);
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        if self.xero.client_id.as_deref().is_none_or(str::is_empty) {
            return Err(common::Error::Config("XERO_CLIENT_ID is not set".into()));
        }
        if self
            .xero
            .client_secret
            .as_ref()
            .is_none_or(|s| s.expose().is_empty())
        {
            return Err(common::Error::Config("XERO_CLIENT_SECRET is not set".into()));
        }
        if self.xero.redirect_uris.is_empty() {
            return Err(common::Error::Config(
                "at least one redirect URI is required (XERO_REDIRECT_URI)".into(),
            ));
        }

        let endpoints = &self.xero.endpoints;
        for url in self.xero.redirect_uris.iter().chain([
            &endpoints.authorize_url,
            &endpoints.token_url,
            &endpoints.connections_url,
            &endpoints.api_url,
        ]) {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "URLs must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.store.backend == StoreBackend::Redis
            && !self.store.redis_url.starts_with("redis://")
            && !self.store.redis_url.starts_with("rediss://")
        {
            return Err(common::Error::Config(format!(
                "redis_url must start with redis:// or rediss://, got: {}",
                self.store.redis_url
            )));
        }

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Client configuration for the Xero crates. Only valid after `load`.
    pub fn xero_config(&self) -> XeroConfig {
        XeroConfig {
            client_id: self.xero.client_id.clone().unwrap_or_default(),
            client_secret: self
                .xero
                .client_secret
                .clone()
                .unwrap_or_else(|| Secret::new(String::new())),
            redirect_uris: self.xero.redirect_uris.clone(),
            scopes: self.xero.scopes.clone(),
            state: self.xero.state.clone(),
            endpoints: self.xero.endpoints.clone(),
        }
    }

    /// Webhook key shared with handlers.
    pub fn webhook_key(&self) -> Option<Arc<Secret<String>>> {
        self.xero.webhook_key.clone().map(Arc::new)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var, falling
    /// back to `xero-gateway.toml` if it exists.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }
}
