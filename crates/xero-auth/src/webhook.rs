//! Webhook signature verification
//!
//! Xero signs every webhook delivery with HMAC-SHA256 over the raw request
//! body, keyed by the app's webhook key, and sends the base64 digest in
//! `x-xero-signature`. Verification must run on the untouched body bytes:
//! re-serializing the JSON first changes the digest.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the base64 HMAC-SHA256 signature of `raw_body`.
///
/// `None` only if the key is rejected, which HMAC-SHA256 never does.
pub fn sign(raw_body: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = keyed(secret)?;
    mac.update(raw_body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Whether `claimed_signature` is the base64 HMAC-SHA256 of `raw_body`
/// under `secret`.
///
/// The claimed value is decoded and compared in constant time. Canonical
/// base64 is required, so this accepts exactly the strings `sign` produces.
pub fn verify(raw_body: &[u8], claimed_signature: &str, secret: &[u8]) -> bool {
    let Ok(claimed) = STANDARD.decode(claimed_signature) else {
        return false;
    };
    let Some(mut mac) = keyed(secret) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&claimed).is_ok()
}

fn keyed(secret: &[u8]) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(secret).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"event":"x"}"#;

    #[test]
    fn signed_body_verifies() {
        let signature = sign(BODY, b"s").unwrap();
        assert!(verify(BODY, &signature, b"s"));
    }

    #[test]
    fn wrong_secret_fails() {
        let signature = sign(BODY, b"s").unwrap();
        assert!(!verify(BODY, &signature, b"wrong"));
    }

    #[test]
    fn flipping_any_byte_fails() {
        let signature = sign(BODY, b"s").unwrap();
        for i in 0..BODY.len() {
            let mut tampered = BODY.to_vec();
            tampered[i] ^= 0x01;
            assert!(
                !verify(&tampered, &signature, b"s"),
                "byte {i} flipped but signature still verified"
            );
        }
    }

    #[test]
    fn reserialized_json_fails() {
        let signature = sign(BODY, b"s").unwrap();
        assert!(!verify(br#"{ "event": "x" }"#, &signature, b"s"));
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        let signature = sign(b"what do ya want for nothing?", b"Jefe").unwrap();
        assert_eq!(signature, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn key_longer_than_block_size_signs() {
        // RFC 4231 test case 6
        let key = [0xaa_u8; 131];
        let body = b"Test Using Larger Than Block-Size Key - Hash Key First";
        let signature = sign(body, &key).unwrap();
        assert_eq!(signature, "YOQxWR7gtn8Niiaqy/W3f44LxiE3KMUUBUYEDw7jf1Q=");
        assert!(verify(body, &signature, &key));
    }

    #[test]
    fn empty_key_signs_and_verifies() {
        let signature = sign(BODY, b"").unwrap();
        assert_eq!(signature, "MCv6aPEQhedn1RMVFNpLNNaDU1e+WdBxocxWkbrMYww=");
        assert!(verify(BODY, &signature, b""));
        assert!(!verify(BODY, &signature, b"s"));
    }

    #[test]
    fn malformed_signature_fails() {
        assert!(!verify(BODY, "not base64!!", b"s"));
        assert!(!verify(BODY, "", b"s"));
    }
}
