// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Metric sample produced by a polling cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single data point for one user. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub user_id: String,
    pub metric_value: f64,
    /// Every other field the provider returned with the record
    #[serde(default)]
    pub auxiliary_fields: serde_json::Map<String, serde_json::Value>,
    pub collected_at: DateTime<Utc>,
}
