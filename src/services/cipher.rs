// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! AEAD encryption for OAuth tokens at rest.
//!
//! AES-256-GCM via `ring`. Every encryption draws a fresh 96-bit nonce and
//! binds a caller-supplied context (user id and field) as associated data, so
//! a ciphertext copied onto another user's record fails authentication.
//!
//! Wire format: `base64(nonce || ciphertext || tag)`.

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::sync::Arc;

const KEY_DERIVATION_INFO: &[u8] = b"pulse-relay token encryption v1";

/// Token encryption service.
#[derive(Clone)]
pub struct TokenCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl TokenCipher {
    /// Derive the AES-256 key from arbitrary-length secret material.
    pub fn from_secret(secret: &[u8]) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Token encryption secret is empty"
            )));
        }

        let hk = Hkdf::<Sha256>::new(None, secret);
        let mut key_bytes = [0u8; 32];
        hk.expand(KEY_DERIVATION_INFO, &mut key_bytes)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Key derivation failed: {}", e)))?;

        Self::from_key(&key_bytes)
    }

    /// Use a raw 32-byte key.
    pub fn from_key(key_bytes: &[u8; 32]) -> Result<Self, AppError> {
        let unbound = UnboundKey::new(&AES_256_GCM, key_bytes).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to create encryption key: {:?}", e))
        })?;

        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt `plaintext` bound to `context`.
    pub fn encrypt(&self, plaintext: &str, context: &str) -> Result<String, AppError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Nonce generation failed: {:?}", e)))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::from(context.as_bytes()), &mut in_out)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Encryption failed: {:?}", e)))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(in_out);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt) with the same
    /// `context`. Any failure is [`AppError::Corruption`]; it is never retried.
    pub fn decrypt(&self, encoded: &str, context: &str) -> Result<String, AppError> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| AppError::Corruption(format!("{}: invalid base64: {}", context, e)))?;

        if combined.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(AppError::Corruption(format!(
                "{}: ciphertext too short",
                context
            )));
        }

        let (nonce_bytes, sealed) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| AppError::Corruption(format!("{}: invalid nonce", context)))?;

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(context.as_bytes()), &mut in_out)
            .map_err(|_| {
                AppError::Corruption(format!("{}: authentication tag mismatch", context))
            })?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|e| AppError::Corruption(format!("{}: invalid UTF-8: {}", context, e)))
    }
}
