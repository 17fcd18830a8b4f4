// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential persistence.
//!
//! Records reaching this layer are already encrypted; stores never see
//! plaintext tokens.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::StoredCredential;
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const CREDENTIALS: &str = "credentials";
}

/// Storage contract for encrypted credential records, one per user id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<StoredCredential>, AppError>;

    /// Insert or replace the record keyed by `record.user_id`. Both token
    /// fields land in a single write.
    async fn save(&self, record: &StoredCredential) -> Result<(), AppError>;

    /// Deleting a missing record is not an error.
    async fn remove(&self, user_id: &str) -> Result<(), AppError>;

    /// User ids whose stored `polling_enabled` flag is set.
    async fn polling_enabled_users(&self) -> Result<Vec<String>, AppError>;
}
