// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Pulse-Relay: relay a biometric provider's live readings to connected viewers
//!
//! This crate holds users' provider credentials encrypted at rest, polls the
//! provider on a per-user schedule, forwards each reading to an analytics sink
//! and streams it to the user's open dashboards.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::CredentialStore;
use services::{
    AccountService, BroadcastHub, MetricSource, PollScheduler, SampleSink, TokenCipher,
    TokenEndpoint, TokenVault,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub vault: Arc<TokenVault>,
    pub hub: Arc<BroadcastHub>,
    pub scheduler: Arc<PollScheduler>,
    pub account: AccountService,
    pub source: Arc<dyn MetricSource>,
}

impl AppState {
    /// Wire the services together around the given collaborators.
    pub fn build(
        config: Config,
        store: Arc<dyn CredentialStore>,
        cipher: TokenCipher,
        endpoint: Arc<dyn TokenEndpoint>,
        source: Arc<dyn MetricSource>,
        sink: Arc<dyn SampleSink>,
    ) -> Self {
        let vault = Arc::new(TokenVault::new(store, cipher, endpoint.clone()));
        let hub = Arc::new(BroadcastHub::new());
        let scheduler = Arc::new(PollScheduler::new(
            vault.clone(),
            source.clone(),
            sink,
            hub.clone(),
            config.poll_interval,
        ));
        let account = AccountService::new(vault.clone(), scheduler.clone(), endpoint);

        Self {
            config,
            vault,
            hub,
            scheduler,
            account,
            source,
        }
    }
}
