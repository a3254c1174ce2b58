//! Token sealing and OAuth state signing.
//!
//! Sealed tokens are `base64(nonce ‖ AES-256-GCM ciphertext)` and never leave
//! the process in clear. Signed state is `base64url(mac ‖ nonce)`; the mac is
//! HMAC-SHA256 under `STATE_SECRET`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const MAC_LEN: usize = 32;

fn crypto_err(context: &str, detail: impl std::fmt::Display) -> AppError {
    AppError::CryptoError(format!("{context}: {detail}"))
}

pub struct CryptoEngine {
    cipher: Aes256Gcm,
    /// Keyed once; cloned per signature.
    state_mac: HmacSha256,
}

impl CryptoEngine {
    /// `master_key_b64` must decode to exactly 32 bytes.
    pub fn new(master_key_b64: &str, state_secret: &str) -> Result<Self, AppError> {
        let key = STANDARD
            .decode(master_key_b64)
            .map_err(|e| crypto_err("MASTER_KEY is not base64", e))?;
        if key.len() != KEY_LEN {
            return Err(AppError::CryptoError(format!(
                "MASTER_KEY must decode to {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        Self::with_key(&key, state_secret)
    }

    /// Random master key for the in-memory stores. Sealed tokens die with the
    /// process.
    pub fn ephemeral(state_secret: &str) -> Result<Self, AppError> {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self::with_key(&key, state_secret)
    }

    fn with_key(key: &[u8], state_secret: &str) -> Result<Self, AppError> {
        if state_secret.is_empty() {
            return Err(AppError::CryptoError("state secret must not be empty".into()));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| crypto_err("AES key rejected", e))?;
        let state_mac = <HmacSha256 as Mac>::new_from_slice(state_secret.as_bytes())
            .map_err(|e| crypto_err("HMAC key rejected", e))?;

        Ok(Self { cipher, state_mac })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let mut sealed = vec![0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut sealed);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&sealed), plaintext.as_bytes())
            .map_err(|e| crypto_err("seal failed", e))?;
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    pub fn decrypt(&self, sealed_b64: &str) -> Result<String, AppError> {
        let sealed = STANDARD
            .decode(sealed_b64)
            .map_err(|e| crypto_err("sealed token is not base64", e))?;
        if sealed.len() < NONCE_LEN {
            return Err(AppError::CryptoError("sealed token is truncated".into()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| crypto_err("open failed", e))?;

        String::from_utf8(plaintext).map_err(|e| crypto_err("opened token is not UTF-8", e))
    }

    pub fn sign_state(&self, nonce: &str) -> Result<String, AppError> {
        let mut mac = self.state_mac.clone();
        mac.update(nonce.as_bytes());

        let mut signed = mac.finalize().into_bytes().to_vec();
        signed.extend_from_slice(nonce.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(signed))
    }

    /// Returns the nonce inside `signed`. Every failure is `InvalidState`.
    pub fn verify_state(&self, signed: &str) -> Result<String, AppError> {
        let signed = URL_SAFE_NO_PAD
            .decode(signed)
            .map_err(|_| AppError::InvalidState)?;
        if signed.len() <= MAC_LEN {
            return Err(AppError::InvalidState);
        }

        let (tag, nonce) = signed.split_at(MAC_LEN);
        let mut mac = self.state_mac.clone();
        mac.update(nonce);
        mac.verify_slice(tag).map_err(|_| AppError::InvalidState)?;

        String::from_utf8(nonce.to_vec()).map_err(|_| AppError::InvalidState)
    }
}
