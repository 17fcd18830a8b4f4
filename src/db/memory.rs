// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process credential store for local development and tests.

use crate::db::CredentialStore;
use crate::error::AppError;
use crate::models::StoredCredential;
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, StoredCredential>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self, user_id: &str) -> Result<Option<StoredCredential>, AppError> {
        Ok(self.records.get(user_id).map(|r| r.value().clone()))
    }

    async fn save(&self, record: &StoredCredential) -> Result<(), AppError> {
        self.records.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, user_id: &str) -> Result<(), AppError> {
        self.records.remove(user_id);
        Ok(())
    }

    async fn polling_enabled_users(&self) -> Result<Vec<String>, AppError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.value().polling_enabled)
            .map(|r| r.key().clone())
            .collect())
    }
}
