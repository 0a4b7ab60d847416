//! Cached Xero session for the gateway
//!
//! Keeps exactly one Xero session (token set + tenants) in a shared
//! credential store under the `authData` key and hands out clients that are
//! ready to call the accounting API.
//!
//! Session lifecycle:
//! 1. Consent callback → `SessionManager::complete_consent()` caches the first record
//! 2. Each request → `SessionManager::acquire_authenticated_client()`
//! 3. Valid access token → tenants re-listed, record left as is
//! 4. Expired access token → refresh grant, tenants re-listed, record overwritten
//! 5. Refresh rejected → `RefreshFailed`; the user has to consent again

pub mod auth_data;
pub mod error;
pub mod manager;
pub mod store;

pub use auth_data::{AuthData, format_expiry, project};
pub use error::{Error, Result};
pub use manager::SessionManager;
pub use store::{AUTH_DATA_KEY, CredentialStore, MemoryStore, RedisStore};
