//! Xero OAuth and accounting API client library
//!
//! Provides consent URL generation, token exchange/refresh, unverified JWT
//! claim decoding, tenant listing, the accounting API calls the gateway
//! needs, and webhook signature verification. This crate does no caching;
//! the session crate decides when tokens are refreshed and where they live.
//!
//! Credential flow:
//! 1. User is sent to `consent::build_consent_url()`
//! 2. Xero redirects back; `XeroClient::api_callback()` exchanges the code
//! 3. `XeroClient::update_tenants()` fetches the connected organisations
//! 4. On expiry, `XeroClient::refresh_with_refresh_token()` rotates tokens
//! 5. Accounting calls go through the same client with the active tenant

pub mod accounting;
pub mod claims;
pub mod client;
pub mod config;
pub mod consent;
pub mod constants;
pub mod error;
pub mod tenants;
pub mod token;
pub mod webhook;

pub use claims::{AccessTokenClaims, IdTokenClaims, decode_unverified};
pub use client::XeroClient;
pub use config::{Endpoints, XeroConfig};
pub use consent::CallbackParams;
pub use constants::*;
pub use error::{Error, Result};
pub use tenants::Tenant;
pub use token::{TokenResponse, TokenSet};
