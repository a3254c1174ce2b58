//! Webhook signature check.
//!
//! The platform signs the exact request body bytes with HMAC-SHA256 keyed by
//! the app's API secret and sends the base64 digest in
//! `X-Shopify-Hmac-Sha256`. The body must be the raw bytes as received:
//! decoding and re-encoding JSON changes the bytes and the digest with them.

use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";
pub const TOPIC_HEADER: &str = "x-shopify-topic";

/// Base64 HMAC-SHA256 of `body` under `secret`.
pub fn sign(body: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// True only when `provided_b64` decodes to the HMAC of `raw_body`.
/// Missing input or invalid base64 yields `false`.
pub fn verify(raw_body: &[u8], provided_b64: Option<&str>, secret: &str) -> bool {
    let Some(provided) = provided_b64 else {
        return false;
    };
    if secret.is_empty() || provided.is_empty() {
        return false;
    }
    let Ok(provided) = base64::engine::general_purpose::STANDARD.decode(provided) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "hush";
    const BODY: &[u8] = br#"{"shop_id":954889,"shop_domain":"acme.example"}"#;

    #[test]
    fn accepts_digest_over_exact_bytes() {
        let digest = sign(BODY, SECRET).unwrap();
        assert!(verify(BODY, Some(&digest), SECRET));
    }

    #[test]
    fn rejects_every_single_byte_body_mutation() {
        let digest = sign(BODY, SECRET).unwrap();
        for i in 0..BODY.len() {
            let mut mutated = BODY.to_vec();
            mutated[i] ^= 0x01;
            assert!(!verify(&mutated, Some(&digest), SECRET), "byte {i}");
        }
    }

    #[test]
    fn rejects_every_single_byte_digest_mutation() {
        let digest = sign(BODY, SECRET).unwrap();
        for i in 0..digest.len() {
            let mut mutated = digest.clone().into_bytes();
            mutated[i] = if mutated[i] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(mutated).unwrap();
            assert!(!verify(BODY, Some(&mutated), SECRET), "byte {i}");
        }
    }

    #[test]
    fn rejects_undecodable_and_truncated_macs() {
        let digest = sign(BODY, SECRET).unwrap();
        let raw = base64::engine::general_purpose::STANDARD.decode(&digest).unwrap();
        let truncated = base64::engine::general_purpose::STANDARD.encode(&raw[..16]);

        assert!(!verify(BODY, Some(&truncated), SECRET));
        assert!(!verify(BODY, Some("not*base64!"), SECRET));
        assert!(!verify(BODY, Some(&hex::encode(&raw)), SECRET));
    }

    #[test]
    fn rejects_prefix_and_padded_digests() {
        let digest = sign(BODY, SECRET).unwrap();
        assert!(!verify(BODY, Some(&digest[..digest.len() - 1]), SECRET));
        assert!(!verify(BODY, Some(&format!("{digest} ")), SECRET));
    }

    #[test]
    fn rejects_reserialized_json() {
        let digest = sign(BODY, SECRET).unwrap();
        let value: serde_json::Value = serde_json::from_slice(BODY).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();
        assert!(!verify(&pretty, Some(&digest), SECRET));
    }

    #[test]
    fn missing_header_or_secret_is_false() {
        let digest = sign(BODY, SECRET).unwrap();
        assert!(!verify(BODY, None, SECRET));
        assert!(!verify(BODY, Some(""), SECRET));
        assert!(!verify(BODY, Some(&digest), ""));
    }

    #[test]
    fn wrong_secret_is_false() {
        let digest = sign(BODY, SECRET).unwrap();
        assert!(!verify(BODY, Some(&digest), "other"));
    }
}
