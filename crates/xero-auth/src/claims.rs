//! JWT claim decoding
//!
//! ID and access tokens arrive directly from Xero's token endpoint over TLS,
//! so their claims are read without verifying the signature. If tokens ever
//! reach this code through an untrusted path, switch to a validating decode
//! against Xero's published JWKS.

use jsonwebtoken::{DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Claims carried by the OpenID Connect ID token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xero_userid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Everything else Xero puts in the token, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Claims carried by the access token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xero_userid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_event_id: Option<String>,
    /// Xero sends scopes as an array; other issuers use a space separated string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decode a JWT payload into `T` without checking the signature or any
/// registered claim.
pub fn decode_unverified<T: DeserializeOwned>(token: &str) -> Result<T> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<T>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| Error::InvalidToken(e.to_string()))
}

/// The `exp` claim of a token, if it decodes and carries one.
pub fn expiry(token: &str) -> Option<i64> {
    decode_unverified::<AccessTokenClaims>(token)
        .ok()
        .and_then(|claims| claims.exp)
}

#[cfg(test)]
pub(crate) mod test_support {
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::Value;

    /// Mint an HS256 token with the given claims. The key is irrelevant
    /// because decoding never checks it.
    pub fn mint(claims: &Value) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"fixture-key"),
        )
        .unwrap()
    }
}
