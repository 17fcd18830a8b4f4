// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod account;
pub mod cipher;
pub mod hub;
pub mod provider;
pub mod scheduler;
pub mod sink;
pub mod vault;

pub use account::AccountService;
pub use cipher::TokenCipher;
pub use hub::{BroadcastHub, DeliverFn, DeliveryError, SubscriptionHandle};
pub use provider::{MetricRecord, MetricSource, ProviderClient, TokenEndpoint, TokenGrant};
pub use scheduler::{CycleOutcome, PollScheduler};
pub use sink::{SampleSink, SinkClient};
pub use vault::TokenVault;
