// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Provider credential models (decrypted and stored forms).

use serde::{Deserialize, Serialize};

/// Decrypted credential for one provider user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry (epoch milliseconds)
    pub expires_at: i64,
    /// Whether background polling is enabled for this user
    pub polling_enabled: bool,
    /// Last write (RFC 3339)
    pub updated_at: String,
}

impl Credential {
    /// A token is usable only while `now < expires_at`; `margin_ms` shifts
    /// the cutoff earlier so tokens aren't handed out about to expire.
    pub fn is_usable_at(&self, now_ms: i64, margin_ms: i64) -> bool {
        now_ms + margin_ms < self.expires_at
    }
}

/// Credential record as persisted. Token fields are AEAD ciphertexts.
///
/// Document ID: `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub user_id: String,
    /// Encrypted access token (base64 of nonce || ciphertext || tag)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64 of nonce || ciphertext || tag)
    pub refresh_token_encrypted: String,
    /// Access token expiry (epoch milliseconds)
    pub expires_at: i64,
    #[serde(default)]
    pub polling_enabled: bool,
    /// Last write (RFC 3339)
    pub updated_at: String,
}

/// Partial update merged into a credential by `TokenVault::set`.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub polling_enabled: Option<bool>,
}

impl CredentialUpdate {
    /// Full token set, as produced by an authorization or refresh.
    pub fn tokens(access_token: String, refresh_token: String, expires_at: i64) -> Self {
        Self {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            expires_at: Some(expires_at),
            polling_enabled: None,
        }
    }

    pub fn polling(enabled: bool) -> Self {
        Self {
            polling_enabled: Some(enabled),
            ..Default::default()
        }
    }
}
