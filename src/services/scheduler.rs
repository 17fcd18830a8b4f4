// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user recurring poll schedules.
//!
//! Each active user owns one spawned task driven by a fixed-period interval.
//! A cycle fetches a valid token from the vault, reads the latest metric,
//! forwards it to the sink and publishes it to live viewers. Cycles run inline
//! in the task loop, so one user's cycles never overlap; different users poll
//! independently.
//!
//! Stopping cancels the schedule's token. An in-flight cycle is allowed to
//! finish its current call but its result is dropped. Cycles also take a
//! per-user lock, so a schedule restarted while the old cycle is still in
//! flight waits for it before running its first cycle.

use crate::error::AppError;
use crate::models::Sample;
use crate::services::hub::BroadcastHub;
use crate::services::provider::MetricSource;
use crate::services::sink::SampleSink;
use crate::services::vault::TokenVault;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Sample forwarded and published to `delivered` viewers
    Published { delivered: usize },
    /// Provider has no data for the user yet
    NoData,
    /// Schedule was stopped mid-cycle; result dropped
    Discarded,
}

struct ScheduleEntry {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Everything a cycle touches.
struct Pipeline {
    vault: Arc<TokenVault>,
    source: Arc<dyn MetricSource>,
    sink: Arc<dyn SampleSink>,
    hub: Arc<BroadcastHub>,
    /// Per-user lock held for the duration of a cycle
    cycle_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Pipeline {
    fn cycle_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.cycle_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the user's cycle lock once no schedule task holds it.
    fn release_cycle_lock(&self, user_id: &str) {
        self.cycle_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn run_cycle(
        &self,
        user_id: &str,
        cancel_token: &CancellationToken,
    ) -> Result<CycleOutcome, AppError> {
        let credential = self.vault.get(user_id).await?;
        if cancel_token.is_cancelled() {
            return Ok(CycleOutcome::Discarded);
        }

        let record = self.source.latest(&credential.access_token).await?;
        if cancel_token.is_cancelled() {
            return Ok(CycleOutcome::Discarded);
        }

        let Some(record) = record else {
            return Ok(CycleOutcome::NoData);
        };

        let sample = Sample {
            user_id: user_id.to_string(),
            metric_value: record.value,
            auxiliary_fields: record.auxiliary,
            collected_at: chrono::Utc::now(),
        };

        if let Err(e) = self.sink.forward(&sample).await {
            tracing::warn!(user_id, error = %e, "Sink forward failed");
        }
        if cancel_token.is_cancelled() {
            return Ok(CycleOutcome::Discarded);
        }

        let delivered = self.hub.publish(user_id, &sample);
        Ok(CycleOutcome::Published { delivered })
    }
}

async fn run_schedule(
    pipeline: Arc<Pipeline>,
    user_id: String,
    period: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // First tick completes immediately.
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let lock = pipeline.cycle_lock(&user_id);
        let _guard = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            guard = lock.lock() => guard,
        };

        let cycle = AssertUnwindSafe(pipeline.run_cycle(&user_id, &cancel_token))
            .catch_unwind()
            .await;

        match cycle {
            Ok(Ok(CycleOutcome::Published { delivered })) => {
                tracing::debug!(user_id = %user_id, delivered, "Sample published");
            }
            Ok(Ok(CycleOutcome::NoData)) => {
                tracing::debug!(user_id = %user_id, "No data yet");
            }
            Ok(Ok(CycleOutcome::Discarded)) => {
                tracing::debug!(user_id = %user_id, "Schedule stopped mid-cycle, result dropped");
            }
            Ok(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "Poll cycle skipped");
            }
            Err(_) => {
                tracing::error!(user_id = %user_id, "Poll cycle panicked, schedule stays armed");
            }
        }
    }

    pipeline.release_cycle_lock(&user_id);
    tracing::debug!(user_id = %user_id, "Schedule task exited");
}

/// Owns every active schedule.
pub struct PollScheduler {
    pipeline: Arc<Pipeline>,
    period: Duration,
    /// Active schedules (user_id -> entry)
    entries: DashMap<String, ScheduleEntry>,
    /// Parent of every schedule's token
    cancel_token: CancellationToken,
}

impl PollScheduler {
    pub fn new(
        vault: Arc<TokenVault>,
        source: Arc<dyn MetricSource>,
        sink: Arc<dyn SampleSink>,
        hub: Arc<BroadcastHub>,
        period: Duration,
    ) -> Self {
        // tokio's interval rejects a zero period.
        let period = period.max(Duration::from_millis(1));

        Self {
            pipeline: Arc::new(Pipeline {
                vault,
                source,
                sink,
                hub,
                cycle_locks: DashMap::new(),
            }),
            period,
            entries: DashMap::new(),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Start polling for `user_id`.
    ///
    /// Returns `true` if a new schedule was armed, `false` if one already
    /// existed or the scheduler has been shut down.
    pub fn start_user_polling(&self, user_id: &str) -> bool {
        if self.cancel_token.is_cancelled() {
            tracing::warn!(user_id, "Scheduler shut down, not starting schedule");
            return false;
        }

        let started = match self.entries.entry(user_id.to_string()) {
            Entry::Occupied(_) => {
                tracing::debug!(user_id, "Schedule already active");
                false
            }
            Entry::Vacant(slot) => {
                let cancel_token = self.cancel_token.child_token();
                let handle = tokio::spawn(run_schedule(
                    Arc::clone(&self.pipeline),
                    user_id.to_string(),
                    self.period,
                    cancel_token.clone(),
                ));

                slot.insert(ScheduleEntry {
                    cancel_token,
                    handle,
                });
                true
            }
        };

        // Shutdown may have drained the map between the check above and the insert.
        if started && self.cancel_token.is_cancelled() {
            self.entries.remove(user_id);
            tracing::warn!(user_id, "Scheduler shut down while starting, schedule dropped");
            return false;
        }

        if started {
            tracing::info!(
                user_id,
                interval_secs = self.period.as_secs(),
                "Polling started"
            );
        }
        started
    }

    /// Stop polling for `user_id`. Returns `false` if nothing was scheduled.
    pub fn stop_user_polling(&self, user_id: &str) -> bool {
        match self.entries.remove(user_id) {
            Some((_, entry)) => {
                entry.cancel_token.cancel();
                tracing::info!(user_id, "Polling stopped");
                true
            }
            None => false,
        }
    }

    /// Resume schedules for `user_ids`. Returns how many were newly armed.
    pub fn bootstrap<I, S>(&self, user_ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let started = user_ids
            .into_iter()
            .filter(|id| self.start_user_polling(id.as_ref()))
            .count();

        tracing::info!(started, "Polling schedules resumed");
        started
    }

    /// Cancel every schedule and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();

        let user_ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<JoinHandle<()>> = user_ids
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .map(|(_, entry)| entry.handle)
            .collect();

        let count = handles.len();
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Schedule task ended abnormally");
            }
        }

        tracing::info!(stopped = count, "Scheduler shut down");
    }

    pub fn is_polling(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    /// Sorted ids of users with an active schedule.
    pub fn active_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
