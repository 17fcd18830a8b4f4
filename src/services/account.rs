// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection lifecycle: connect, toggle polling, disconnect, resume.

use crate::error::AppError;
use crate::models::CredentialUpdate;
use crate::services::provider::TokenEndpoint;
use crate::services::scheduler::PollScheduler;
use crate::services::vault::TokenVault;
use std::sync::Arc;

pub struct AccountService {
    vault: Arc<TokenVault>,
    scheduler: Arc<PollScheduler>,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl AccountService {
    pub fn new(
        vault: Arc<TokenVault>,
        scheduler: Arc<PollScheduler>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            vault,
            scheduler,
            endpoint,
        }
    }

    /// Store tokens from a completed OAuth handshake.
    ///
    /// An existing polling flag is kept; new connections start with polling off.
    pub async fn connect(
        &self,
        user_id: &str,
        access_token: String,
        refresh_token: String,
        expires_at: i64,
    ) -> Result<(), AppError> {
        self.vault
            .set(
                user_id,
                CredentialUpdate::tokens(access_token, refresh_token, expires_at),
            )
            .await?;

        tracing::info!(user_id, "Provider connected");
        Ok(())
    }

    /// Persist the polling flag and arm or cancel the schedule to match.
    ///
    /// Returns whether a schedule is active afterwards.
    pub async fn set_polling(&self, user_id: &str, enabled: bool) -> Result<bool, AppError> {
        if self.vault.get_raw(user_id).await?.is_none() {
            return Err(AppError::CredentialNotFound(user_id.to_string()));
        }

        self.vault
            .set(user_id, CredentialUpdate::polling(enabled))
            .await?;

        if enabled {
            self.scheduler.start_user_polling(user_id);
        } else {
            self.scheduler.stop_user_polling(user_id);
        }

        Ok(self.scheduler.is_polling(user_id))
    }

    /// Tear down a connection.
    ///
    /// Flow:
    /// 1. Stop the schedule so no new cycle picks up the credential
    /// 2. Read the stored tokens into memory
    /// 3. Delete the stored record
    /// 4. If `revoke`, revoke at the provider with the in-memory token (best-effort)
    ///
    /// Returns whether a credential existed.
    pub async fn disconnect(&self, user_id: &str, revoke: bool) -> Result<bool, AppError> {
        self.scheduler.stop_user_polling(user_id);

        let access_token = match self.vault.get_raw(user_id).await {
            Ok(credential) => credential.map(|c| c.access_token),
            Err(AppError::Corruption(e)) => {
                tracing::warn!(user_id, error = %e, "Unreadable credential, skipping revocation");
                None
            }
            Err(e) => return Err(e),
        };

        // Corrupt records are removed too.
        self.vault.delete(user_id).await?;

        match (&access_token, revoke) {
            (Some(token), true) => {
                if let Err(e) = self.endpoint.revoke(token).await {
                    tracing::warn!(user_id, error = %e, "Provider revocation failed (non-fatal)");
                }
            }
            (None, true) => {
                tracing::info!(user_id, "No readable token to revoke");
            }
            (_, false) => {}
        }

        tracing::info!(user_id, revoked = revoke, "Provider disconnected");
        Ok(access_token.is_some())
    }

    /// Re-arm schedules for every user whose polling flag is stored as set.
    pub async fn resume_enabled_schedules(&self) -> Result<usize, AppError> {
        let user_ids = self.vault.polling_enabled_users().await?;
        Ok(self.scheduler.bootstrap(&user_ids))
    }
}
