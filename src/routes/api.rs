// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::Sample;
use crate::AppState;
use axum::{
    extract::State,
    routing::{delete, get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API routes (require a session).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/metric", get(get_metric))
        .route("/api/polling", put(set_polling))
        .route("/api/connection", delete(disconnect))
}

// ─── Connection Status ───────────────────────────────────────

/// Current connection status.
#[derive(Serialize)]
pub struct ConnectionResponse {
    pub user_id: String,
    pub connected: bool,
    pub polling_enabled: bool,
    pub polling_active: bool,
    /// Access token expiry (epoch ms)
    pub expires_at: Option<i64>,
    pub updated_at: Option<String>,
}

/// Report connection status without touching the provider.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConnectionResponse>> {
    let credential = match state.vault.get_raw(&user.user_id).await {
        Ok(credential) => credential,
        // An unreadable record counts as not connected.
        Err(AppError::Corruption(_)) => None,
        Err(e) => return Err(e),
    };

    let polling_active = state.scheduler.is_polling(&user.user_id);

    Ok(Json(match credential {
        Some(c) => ConnectionResponse {
            user_id: user.user_id,
            connected: true,
            polling_enabled: c.polling_enabled,
            polling_active,
            expires_at: Some(c.expires_at),
            updated_at: Some(c.updated_at),
        },
        None => ConnectionResponse {
            user_id: user.user_id,
            connected: false,
            polling_enabled: false,
            polling_active,
            expires_at: None,
            updated_at: None,
        },
    }))
}

// ─── One-shot Metric ─────────────────────────────────────────

/// Fetch the latest reading now, refreshing the token if needed.
///
/// Not forwarded to the sink and not published to live viewers.
async fn get_metric(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Sample>> {
    let credential = state.vault.get(&user.user_id).await?;
    let record = state
        .source
        .latest(&credential.access_token)
        .await?
        .ok_or_else(|| AppError::DataUnavailable("provider has no readings yet".to_string()))?;

    Ok(Json(Sample {
        user_id: user.user_id,
        metric_value: record.value,
        auxiliary_fields: record.auxiliary,
        collected_at: chrono::Utc::now(),
    }))
}

// ─── Polling Toggle ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct PollingRequest {
    pub enabled: bool,
}

#[derive(Serialize)]
pub struct PollingResponse {
    pub polling_enabled: bool,
    pub polling_active: bool,
}

async fn set_polling(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<PollingRequest>,
) -> Result<Json<PollingResponse>> {
    tracing::info!(user_id = %user.user_id, enabled = request.enabled, "Polling toggled");

    let polling_active = state
        .account
        .set_polling(&user.user_id, request.enabled)
        .await?;

    Ok(Json(PollingResponse {
        polling_enabled: request.enabled,
        polling_active,
    }))
}

// ─── Disconnect ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
    /// Whether a readable credential was removed
    pub had_credential: bool,
}

/// Stop polling, delete the stored credential, and revoke it at the provider.
async fn disconnect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DisconnectResponse>> {
    tracing::info!(user_id = %user.user_id, "User-initiated disconnect");

    let had_credential = state.account.disconnect(&user.user_id, true).await?;

    Ok(Json(DisconnectResponse {
        success: true,
        had_credential,
    }))
}
