// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook route for provider account events.

use crate::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/{secret}", post(handle_event))
}

/// Provider webhook event payload.
#[derive(Deserialize, Debug)]
struct WebhookEvent {
    user_id: String,
    /// e.g. "deauthorized"
    event: String,
}

fn secret_matches(received: &str, expected: &str) -> bool {
    received.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Handle incoming webhook events (POST).
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Path(secret): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    if !secret_matches(&secret, &state.config.webhook_path_secret) {
        tracing::warn!("Security Alert: Webhook path secret mismatch");
        return StatusCode::NOT_FOUND;
    }

    let event: WebhookEvent = match serde_json::from_value(payload) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse webhook event");
            return StatusCode::OK; // Still return 200 to avoid provider retries
        }
    };

    tracing::info!(
        user_id = %event.user_id,
        event = %event.event,
        "Webhook event received"
    );

    match event.event.as_str() {
        "deauthorized" => {
            // The grant is already gone at the provider, so skip revocation.
            match state.account.disconnect(&event.user_id, false).await {
                Ok(had_credential) => {
                    tracing::info!(user_id = %event.user_id, had_credential, "Deauthorized user disconnected");
                    StatusCode::OK
                }
                Err(e) => {
                    tracing::error!(user_id = %event.user_id, error = %e, "Failed to disconnect deauthorized user");
                    // 500 so the provider retries
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
        other => {
            tracing::debug!(event = %other, "Ignoring unhandled event type");
            StatusCode::OK
        }
    }
}
