// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live sample stream over Server-Sent Events.
//!
//! Each connection registers a hub subscriber that pushes into a bounded
//! channel. A full channel drops the sample for that viewer only. Dropping the
//! response stream unsubscribes.

use crate::middleware::auth::AuthUser;
use crate::models::Sample;
use crate::services::hub::{BroadcastHub, DeliverFn, DeliveryError, SubscriptionHandle};
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Samples buffered per viewer before new ones are dropped.
const VIEWER_BUFFER: usize = 32;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/live", get(live))
}

/// Unsubscribes when the response stream is dropped.
struct ViewerGuard {
    hub: Arc<BroadcastHub>,
    handle: SubscriptionHandle,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.handle);
        tracing::debug!(user_id = %self.handle.user_id(), "Live viewer disconnected");
    }
}

fn channel_deliver(tx: mpsc::Sender<Sample>) -> DeliverFn {
    Arc::new(move |sample: &Sample| {
        tx.try_send(sample.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                DeliveryError::Failed("viewer buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    })
}

fn sample_event(sample: &Sample) -> Event {
    Event::default()
        .event("sample")
        .json_data(sample)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to encode sample event");
            Event::default().comment("encode error")
        })
}

async fn live(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(VIEWER_BUFFER);
    let handle = state.hub.subscribe(&user.user_id, channel_deliver(tx));
    tracing::debug!(user_id = %user.user_id, "Live viewer connected");

    let guard = ViewerGuard {
        hub: state.hub.clone(),
        handle,
    };

    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let sample = rx.recv().await?;
        Some((Ok(sample_event(&sample)), (rx, guard)))
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
