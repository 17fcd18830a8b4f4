// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process publish/subscribe registry keyed by user id.
//!
//! Delivery is best-effort and unbuffered: a subscriber only sees samples
//! published while it is registered. Publish works on a snapshot of the
//! user's subscribers taken under the map guard, then calls each delivery
//! function with the guard released.

use crate::models::Sample;
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Why a delivery did not reach its subscriber.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The receiving side is gone; the hub drops the registration.
    #[error("Subscriber closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Delivery callback. Must not block.
pub type DeliverFn = Arc<dyn Fn(&Sample) -> Result<(), DeliveryError> + Send + Sync>;

/// Identifies one registration for `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    user_id: String,
    id: u64,
}

impl SubscriptionHandle {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[derive(Clone)]
struct Subscriber {
    id: u64,
    deliver: DeliverFn,
}

#[derive(Default)]
pub struct BroadcastHub {
    subscribers: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: &str, deliver: DeliverFn) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(user_id.to_string())
            .or_default()
            .push(Subscriber { id, deliver });

        tracing::debug!(user_id, subscription_id = id, "Subscriber registered");
        SubscriptionHandle {
            user_id: user_id.to_string(),
            id,
        }
    }

    /// Remove a registration. Unknown handles are ignored.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.remove(&handle.user_id, handle.id);
        tracing::debug!(user_id = %handle.user_id, subscription_id = handle.id, "Subscriber removed");
    }

    /// Deliver `sample` to every current subscriber of `user_id`.
    ///
    /// Returns the number of successful deliveries.
    pub fn publish(&self, user_id: &str, sample: &Sample) -> usize {
        let snapshot: Vec<Subscriber> = match self.subscribers.get(user_id) {
            Some(subs) => subs.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for sub in snapshot {
            let deliver = sub.deliver.clone();
            match catch_unwind(AssertUnwindSafe(|| deliver(sample))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(DeliveryError::Closed)) => {
                    tracing::debug!(user_id, subscription_id = sub.id, "Subscriber closed, removing");
                    self.remove(user_id, sub.id);
                }
                Ok(Err(e)) => {
                    tracing::warn!(user_id, subscription_id = sub.id, error = %e, "Delivery failed");
                }
                Err(_) => {
                    tracing::error!(user_id, subscription_id = sub.id, "Subscriber panicked during delivery");
                }
            }
        }

        delivered
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.subscribers.get(user_id).map_or(0, |subs| subs.len())
    }

    fn remove(&self, user_id: &str, id: u64) {
        self.subscribers.remove_if_mut(user_id, |_, subs| {
            subs.retain(|s| s.id != id);
            subs.is_empty()
        });
    }
}
