//! Auth record projection
//!
//! Turns a raw token set and tenant list into the record that is cached and
//! shown to operators. Projection is pure: identical inputs give identical
//! claims. The only formatted value, `access_token_expires`, is rendered
//! from the `exp` claim in UTC so it is deterministic too.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;
use xero_auth::{AccessTokenClaims, IdTokenClaims, Tenant, TokenSet, decode_unverified};

/// The cached session record stored under `authData`.
///
/// Every field is defaulted on read so records written by older versions
/// still parse; a record without `token_set` is treated as logged out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthData {
    pub decoded_id_token: Option<IdTokenClaims>,
    pub token_set: Option<TokenSet>,
    pub decoded_access_token: Option<AccessTokenClaims>,
    /// Display-only rendering of the access token expiry
    pub access_token_expires: String,
    pub all_tenants: Vec<Tenant>,
    pub active_tenant: Option<Tenant>,
}

/// Build the auth record for a freshly obtained or refreshed token set.
pub fn project(
    token_set: &TokenSet,
    tenants: &[Tenant],
    active_tenant: Option<&Tenant>,
) -> AuthData {
    let decoded_id_token = token_set
        .id_token
        .as_deref()
        .and_then(|token| decode_claims::<IdTokenClaims>(token, "id"));
    let decoded_access_token = decode_claims::<AccessTokenClaims>(&token_set.access_token, "access");

    let access_token_expires = decoded_access_token
        .as_ref()
        .and_then(|claims| claims.exp)
        .map(format_expiry)
        .unwrap_or_default();

    AuthData {
        decoded_id_token,
        token_set: Some(token_set.clone()),
        decoded_access_token,
        access_token_expires,
        all_tenants: tenants.to_vec(),
        active_tenant: active_tenant.cloned(),
    }
}

/// Render a unix timestamp like `1/2/2025, 3:04:05 PM` (UTC).
pub fn format_expiry(exp: i64) -> String {
    DateTime::from_timestamp(exp, 0)
        .map(|t| t.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string())
        .unwrap_or_default()
}

fn decode_claims<T: serde::de::DeserializeOwned>(token: &str, kind: &str) -> Option<T> {
    if token.is_empty() {
        return None;
    }
    match decode_unverified::<T>(token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            warn!(kind, error = %e, "token claims could not be decoded");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{Value, json};

    fn mint(claims: &Value) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"fixture-key"),
        )
        .unwrap()
    }

    fn tenant(id: &str) -> Tenant {
        Tenant {
            id: format!("conn-{id}"),
            auth_event_id: None,
            tenant_id: id.into(),
            tenant_type: "ORGANISATION".into(),
            tenant_name: Some(format!("Org {id}")),
            created_date_utc: None,
            updated_date_utc: None,
        }
    }

    fn token_set() -> TokenSet {
        TokenSet {
            access_token: mint(&json!({ "exp": 1_735_787_045, "client_id": "client" })),
            refresh_token: Some("r1".into()),
            id_token: Some(mint(&json!({ "email": "ada@example.com", "sub": "u1" }))),
            expires_at: Some(1_735_787_045),
            token_type: Some("Bearer".into()),
            scope: None,
        }
    }

    #[test]
    fn projects_claims_tenants_and_expiry() {
        let tenants = vec![tenant("t1"), tenant("t2")];
        let data = project(&token_set(), &tenants, tenants.first());

        assert_eq!(
            data.decoded_id_token.unwrap().email.as_deref(),
            Some("ada@example.com")
        );
        assert_eq!(data.decoded_access_token.unwrap().exp, Some(1_735_787_045));
        assert_eq!(data.access_token_expires, "1/2/2025, 3:04:05 AM");
        assert_eq!(data.all_tenants.len(), 2);
        assert_eq!(data.active_tenant.unwrap().tenant_id, "t1");
        assert_eq!(data.token_set.unwrap().refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn projection_is_deterministic() {
        let tenants = vec![tenant("t1")];
        let set = token_set();
        assert_eq!(
            project(&set, &tenants, tenants.first()),
            project(&set, &tenants, tenants.first())
        );
    }

    #[test]
    fn missing_access_token_renders_empty_expiry() {
        let mut set = token_set();
        set.access_token = String::new();
        set.id_token = None;

        let data = project(&set, &[], None);
        assert_eq!(data.access_token_expires, "");
        assert!(data.decoded_access_token.is_none());
        assert!(data.decoded_id_token.is_none());
        assert!(data.active_tenant.is_none());
    }

    #[test]
    fn opaque_access_token_does_not_fail_projection() {
        let mut set = token_set();
        set.access_token = "opaque".into();
        let data = project(&set, &[], None);
        assert!(data.decoded_access_token.is_none());
        assert!(data.decoded_id_token.is_some());
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let tenants = vec![tenant("t1")];
        let value = serde_json::to_value(project(&token_set(), &tenants, tenants.first())).unwrap();
        assert_eq!(value["tokenSet"]["refresh_token"], "r1");
        assert_eq!(value["allTenants"][0]["tenantId"], "t1");
        assert_eq!(value["activeTenant"]["tenantId"], "t1");
        assert!(value["decodedIdToken"].is_object());
        assert!(value["accessTokenExpires"].is_string());
    }

    #[test]
    fn sparse_record_parses_with_defaults() {
        let data: AuthData = serde_json::from_str(
            r#"{"tokenSet":{"access_token":"a","refresh_token":"r1"},"allTenants":[{"id":"c","tenantId":"t1"}]}"#,
        )
        .unwrap();
        assert_eq!(data.token_set.unwrap().refresh_token.as_deref(), Some("r1"));
        assert_eq!(data.all_tenants[0].tenant_id, "t1");
        assert!(data.active_tenant.is_none());
    }
}
