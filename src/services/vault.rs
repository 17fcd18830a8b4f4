// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Encrypted credential vault with transparent refresh.
//!
//! `get` refreshes expired credentials as a side effect of reading. Refresh is
//! single-flight per user: callers queue on a per-user mutex and re-read the
//! record once they hold it, so only the first caller talks to the token
//! endpoint and the rest pick up its result from the store.
//!
//! Deletion policy: only an explicit grant rejection purges the record.
//! Transient refresh failures leave it in place for a later attempt.

use crate::db::CredentialStore;
use crate::error::AppError;
use crate::models::{Credential, CredentialUpdate, StoredCredential};
use crate::services::cipher::TokenCipher;
use crate::services::provider::TokenEndpoint;
use crate::time_utils::{format_utc_rfc3339, now_millis};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (60 seconds).
pub const TOKEN_REFRESH_MARGIN_MS: i64 = 60 * 1000;

/// Upper bound on a granted token lifetime (one year).
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

/// Per-user mutex to serialize refresh and write operations.
type RefreshLocks = DashMap<String, Arc<Mutex<()>>>;

fn access_context(user_id: &str) -> String {
    format!("{}:access", user_id)
}

fn refresh_context(user_id: &str) -> String {
    format!("{}:refresh", user_id)
}

pub struct TokenVault {
    store: Arc<dyn CredentialStore>,
    cipher: TokenCipher,
    endpoint: Arc<dyn TokenEndpoint>,
    refresh_locks: RefreshLocks,
}

impl TokenVault {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: TokenCipher,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            store,
            cipher,
            endpoint,
            refresh_locks: DashMap::new(),
        }
    }

    // ─── Read Path ───────────────────────────────────────────────────────────

    /// Get a valid (non-expired) credential, refreshing it if needed.
    ///
    /// Fails with `CredentialNotFound` when nothing is stored,
    /// `RefreshRejected` when the grant was rejected (record purged),
    /// `RefreshFailed`/`TransientNetwork` when a refresh could not complete,
    /// and `Corruption` when the record fails authentication.
    pub async fn get(&self, user_id: &str) -> Result<Credential, AppError> {
        // Fast path: no lock while the stored token is still good.
        let credential = self.load_decrypted(user_id).await?;
        if credential.is_usable_at(now_millis(), TOKEN_REFRESH_MARGIN_MS) {
            return Ok(credential);
        }

        let result = self.get_locked(user_id).await;
        if matches!(result, Err(AppError::RefreshRejected(_))) {
            self.release_lock(user_id);
        }
        result
    }

    async fn get_locked(&self, user_id: &str) -> Result<Credential, AppError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        let credential = self.load_decrypted(user_id).await?;
        if credential.is_usable_at(now_millis(), TOKEN_REFRESH_MARGIN_MS) {
            return Ok(credential);
        }

        self.refresh_locked(credential).await
    }

    /// Return the stored credential as-is. Never refreshes.
    pub async fn get_raw(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        match self.load_decrypted(user_id).await {
            Ok(credential) => Ok(Some(credential)),
            Err(AppError::CredentialNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// User ids whose stored polling flag is set.
    pub async fn polling_enabled_users(&self) -> Result<Vec<String>, AppError> {
        self.store.polling_enabled_users().await
    }

    // ─── Write Path ──────────────────────────────────────────────────────────

    /// Merge `update` into the stored record and persist it.
    ///
    /// Creating a record requires access token, refresh token, and expiry.
    pub async fn set(&self, user_id: &str, update: CredentialUpdate) -> Result<(), AppError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        self.write_locked(user_id, update).await?;
        Ok(())
    }

    /// Remove the stored record.
    pub async fn delete(&self, user_id: &str) -> Result<(), AppError> {
        {
            let lock = self.lock_for(user_id);
            let _guard = lock.lock().await;
            self.store.remove(user_id).await?;
        }

        self.release_lock(user_id);
        tracing::info!(user_id, "Credential deleted");
        Ok(())
    }

    /// Number of users with a tracked lock entry.
    pub fn tracked_locks(&self) -> usize {
        self.refresh_locks.len()
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the user's lock unless another caller still holds it.
    fn release_lock(&self, user_id: &str) {
        self.refresh_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn load_decrypted(&self, user_id: &str) -> Result<Credential, AppError> {
        let stored = self
            .store
            .load(user_id)
            .await?
            .ok_or_else(|| AppError::CredentialNotFound(user_id.to_string()))?;

        self.decrypt(stored).map_err(|e| {
            tracing::error!(user_id, error = %e, "Failed to decrypt stored credential");
            e
        })
    }

    fn decrypt(&self, stored: StoredCredential) -> Result<Credential, AppError> {
        let access_token = self
            .cipher
            .decrypt(&stored.access_token_encrypted, &access_context(&stored.user_id))?;
        let refresh_token = self
            .cipher
            .decrypt(&stored.refresh_token_encrypted, &refresh_context(&stored.user_id))?;

        Ok(Credential {
            user_id: stored.user_id,
            access_token,
            refresh_token,
            expires_at: stored.expires_at,
            polling_enabled: stored.polling_enabled,
            updated_at: stored.updated_at,
        })
    }

    /// Refresh with the user's lock held.
    async fn refresh_locked(&self, current: Credential) -> Result<Credential, AppError> {
        let user_id = current.user_id.as_str();
        tracing::info!(user_id, "Access token expired, refreshing");

        let grant = match self.endpoint.refresh(&current.refresh_token).await {
            Ok(grant) => grant,
            Err(AppError::RefreshRejected(reason)) => {
                tracing::warn!(user_id, reason = %reason, "Refresh grant rejected, purging credential");
                if let Err(e) = self.store.remove(user_id).await {
                    tracing::error!(user_id, error = %e, "Failed to purge rejected credential");
                }
                return Err(AppError::RefreshRejected(reason));
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Token refresh failed, keeping credential");
                return Err(e);
            }
        };

        let lifetime_ms = grant.expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS) * 1000;
        let expires_at = now_millis().saturating_add(lifetime_ms);
        let refresh_token = grant
            .refresh_token
            .unwrap_or_else(|| current.refresh_token.clone());

        let stored = self
            .write_locked(
                user_id,
                CredentialUpdate::tokens(
                    grant.access_token.clone(),
                    refresh_token.clone(),
                    expires_at,
                ),
            )
            .await?;

        tracing::info!(user_id, expires_at, "Token refreshed and stored");

        Ok(Credential {
            user_id: stored.user_id,
            access_token: grant.access_token,
            refresh_token,
            expires_at: stored.expires_at,
            polling_enabled: stored.polling_enabled,
            updated_at: stored.updated_at,
        })
    }

    /// Merge and persist with the user's lock held. Only fields present in
    /// `update` are re-encrypted; the rest keep their existing ciphertext.
    async fn write_locked(
        &self,
        user_id: &str,
        update: CredentialUpdate,
    ) -> Result<StoredCredential, AppError> {
        let existing = self.store.load(user_id).await?;

        let access_token_encrypted = match (&update.access_token, &existing) {
            (Some(token), _) => self.cipher.encrypt(token, &access_context(user_id))?,
            (None, Some(existing)) => existing.access_token_encrypted.clone(),
            (None, None) => {
                return Err(AppError::BadRequest(format!(
                    "No credential for {} and no access token supplied",
                    user_id
                )))
            }
        };

        let refresh_token_encrypted = match (&update.refresh_token, &existing) {
            (Some(token), _) => self.cipher.encrypt(token, &refresh_context(user_id))?,
            (None, Some(existing)) => existing.refresh_token_encrypted.clone(),
            (None, None) => {
                return Err(AppError::BadRequest(format!(
                    "No credential for {} and no refresh token supplied",
                    user_id
                )))
            }
        };

        let expires_at = match (update.expires_at, &existing) {
            (Some(expires_at), _) => expires_at,
            (None, Some(existing)) => existing.expires_at,
            (None, None) => {
                return Err(AppError::BadRequest(format!(
                    "No credential for {} and no expiry supplied",
                    user_id
                )))
            }
        };

        let polling_enabled = update
            .polling_enabled
            .or(existing.as_ref().map(|e| e.polling_enabled))
            .unwrap_or(false);

        let record = StoredCredential {
            user_id: user_id.to_string(),
            access_token_encrypted,
            refresh_token_encrypted,
            expires_at,
            polling_enabled,
            updated_at: format_utc_rfc3339(chrono::Utc::now()),
        };

        self.store.save(&record).await?;
        Ok(record)
    }
}
