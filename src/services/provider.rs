// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Biometric provider API client.
//!
//! Handles:
//! - Token refresh (with invalid-grant detection)
//! - Best-effort token revocation
//! - Fetching the most recent metric record
//!
//! Error classification:
//! - transport failure / timeout / 429 / 5xx → `TransientNetwork`
//! - refresh rejected with `invalid_grant` → `RefreshRejected`
//! - any other non-2xx refresh → `RefreshFailed`
//! - 401/403 on the metric endpoint → `Auth`

use crate::config::Config;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

/// OAuth token endpoint used by the vault.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError>;

    /// Revoke a token at the provider. Providers without revocation succeed.
    async fn revoke(&self, _access_token: &str) -> Result<(), AppError> {
        Ok(())
    }
}

/// Source of the user's current metric.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Most recent record, or `None` when the provider has no data yet.
    async fn latest(&self, access_token: &str) -> Result<Option<MetricRecord>, AppError>;
}

/// Token response from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Some providers rotate refresh tokens, some don't.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// One metric record as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricRecord {
    pub value: f64,
    #[serde(flatten)]
    pub auxiliary: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MetricResponse {
    #[serde(default)]
    records: Vec<MetricRecord>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
}

/// HTTP client for the provider.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    token_url: String,
    api_url: String,
    revoke_url: Option<String>,
    client_id: String,
    client_secret: String,
}

impl ProviderClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            token_url: config.provider_token_url.clone(),
            api_url: config.provider_api_url.clone(),
            revoke_url: config.provider_revoke_url.clone(),
            client_id: config.provider_client_id.clone(),
            client_secret: config.provider_client_secret.clone(),
        })
    }

    /// Classify a refresh failure from its status and body.
    fn refresh_error(status: StatusCode, body: &str) -> AppError {
        let grant_rejected = serde_json::from_str::<OAuthErrorBody>(body)
            .map(|b| b.error == "invalid_grant")
            .unwrap_or_else(|_| body.contains("invalid_grant"));

        if grant_rejected {
            return AppError::RefreshRejected(format!("HTTP {}: invalid_grant", status));
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return AppError::TransientNetwork(format!("Token endpoint returned {}", status));
        }

        AppError::RefreshFailed(format!("HTTP {}: {}", status, body))
    }
}

fn transport_error(context: &str, e: reqwest::Error) -> AppError {
    AppError::TransientNetwork(format!("{}: {}", context, e))
}

#[async_trait]
impl TokenEndpoint for ProviderClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| transport_error("Token refresh request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::refresh_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::RefreshFailed(format!("Failed to parse token response: {}", e)))
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AppError> {
        let Some(url) = self.revoke_url.as_deref() else {
            tracing::debug!("No revocation endpoint configured");
            return Ok(());
        };

        let response = self
            .http
            .post(url)
            .form(&[
                ("token", access_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error("Revocation request failed", e))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Revocation returned {}",
                response.status()
            )));
        }

        tracing::info!("Provider token revoked");
        Ok(())
    }
}

#[async_trait]
impl MetricSource for ProviderClient {
    async fn latest(&self, access_token: &str) -> Result<Option<MetricRecord>, AppError> {
        let url = format!("{}/metrics/latest", self.api_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("limit", "1")])
            .send()
            .await
            .map_err(|e| transport_error("Metric request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AppError::Auth(format!("Metric endpoint returned {}", status))
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    tracing::warn!("Provider rate limit hit (429)");
                    AppError::TransientNetwork("Provider rate limit".to_string())
                }
                s if s.is_server_error() => {
                    AppError::TransientNetwork(format!("Metric endpoint returned {}", s))
                }
                s => AppError::Upstream(format!("HTTP {}: {}", s, body)),
            });
        }

        let parsed: MetricResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("JSON parse error: {}", e)))?;

        Ok(parsed.records.into_iter().next())
    }
}
