//! Xero OAuth and API constants
//!
//! Production endpoints for the Xero identity service and the accounting API.
//! All of them can be overridden through `Endpoints` so tests and sandboxes
//! can point the client at a different host.

/// Consent page the user is redirected to
pub const AUTHORIZE_ENDPOINT: &str = "https://login.xero.com/identity/connect/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://identity.xero.com/connect/token";

/// Lists the tenants (organisations) the current token is connected to
pub const CONNECTIONS_ENDPOINT: &str = "https://api.xero.com/connections";

/// Base URL of the accounting API
pub const ACCOUNTING_API_BASE: &str = "https://api.xero.com/api.xro/2.0";

/// Scopes requested during consent. `offline_access` is what makes Xero
/// issue a refresh token.
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "email",
    "accounting.settings",
    "accounting.reports.read",
    "accounting.journals.read",
    "accounting.contacts",
    "accounting.attachments",
    "accounting.transactions",
    "offline_access",
];

/// Fixed anti-CSRF state sent with the consent URL and expected on callback
pub const DEFAULT_STATE: &str = "id=123";

/// Header carrying the base64 HMAC-SHA256 of a webhook body
pub const SIGNATURE_HEADER: &str = "x-xero-signature";

/// Header selecting the tenant an accounting API call acts on
pub const TENANT_HEADER: &str = "xero-tenant-id";
