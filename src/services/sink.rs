// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Forward-only analytics sink.

use crate::config::Config;
use crate::error::AppError;
use crate::models::Sample;
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use serde::Serialize;

/// Destination for forwarded samples.
#[async_trait]
pub trait SampleSink: Send + Sync {
    async fn forward(&self, sample: &Sample) -> Result<(), AppError>;
}

/// Envelope posted to the sink.
#[derive(Debug, Serialize)]
pub struct SinkEvent {
    pub timestamp: String,
    pub category: String,
    /// The sample serialized as a JSON string
    pub payload: String,
}

impl SinkEvent {
    pub fn from_sample(sample: &Sample, category: &str) -> Result<Self, AppError> {
        let payload = serde_json::to_string(sample)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Sample serialization failed: {}", e)))?;

        Ok(Self {
            timestamp: format_utc_rfc3339(sample.collected_at),
            category: category.to_string(),
            payload,
        })
    }
}

/// HTTP sink client. With no endpoint configured, forwarding is a no-op.
#[derive(Clone)]
pub struct SinkClient {
    http: reqwest::Client,
    endpoint: Option<String>,
    category: String,
}

impl SinkClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        if config.sink_url.is_none() {
            tracing::info!("SINK_URL not set, sample forwarding disabled");
        }

        Ok(Self {
            http,
            endpoint: config.sink_url.clone(),
            category: config.sink_category.clone(),
        })
    }
}

#[async_trait]
impl SampleSink for SinkClient {
    async fn forward(&self, sample: &Sample) -> Result<(), AppError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(());
        };

        let event = SinkEvent::from_sample(sample, &self.category)?;

        let response = self
            .http
            .post(endpoint)
            .json(&event)
            .send()
            .await
            .map_err(|e| AppError::TransientNetwork(format!("Sink request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(if status.is_server_error() {
                AppError::TransientNetwork(format!("Sink returned {}", status))
            } else {
                AppError::Upstream(format!("Sink returned {}", status))
            });
        }

        Ok(())
    }
}
