// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Secrets (client secret, token encryption key, JWT key) are injected as
//! environment variables by the deployment and read once at startup.

use std::env;
use std::time::Duration;

/// Which backend holds encrypted credential records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local map; records do not survive a restart.
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Provider OAuth client ID
    pub provider_client_id: String,
    /// Provider OAuth token endpoint (refresh grant)
    pub provider_token_url: String,
    /// Provider API base URL (metric source)
    pub provider_api_url: String,
    /// Optional token revocation endpoint
    pub provider_revoke_url: Option<String>,
    /// Analytics sink endpoint; `None` disables forwarding
    pub sink_url: Option<String>,
    /// `category` field sent with every forwarded sample
    pub sink_category: String,
    /// Fixed interval between polling cycles
    pub poll_interval: Duration,
    /// Timeout applied to every outbound HTTP call
    pub http_timeout: Duration,
    /// Resume schedules for users with polling enabled at startup
    pub resume_polling_on_startup: bool,
    /// Credential persistence backend
    pub credential_store: StoreBackend,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Provider OAuth client secret
    pub provider_client_secret: String,
    /// Secret material the token encryption key is derived from
    pub token_encryption_key: Vec<u8>,
    /// JWT signing key for viewer sessions (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Secret path segment for the provider webhook
    pub webhook_path_secret: String,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            provider_client_id: "test_client_id".to_string(),
            provider_token_url: "http://localhost:9999/oauth/token".to_string(),
            provider_api_url: "http://localhost:9999/api".to_string(),
            provider_revoke_url: None,
            sink_url: None,
            sink_category: "biometric".to_string(),
            poll_interval: Duration::from_secs(60),
            http_timeout: Duration::from_secs(10),
            resume_polling_on_startup: true,
            credential_store: StoreBackend::Memory,
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            provider_client_secret: "test_secret".to_string(),
            token_encryption_key: b"test_token_encryption_key_material".to_vec(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            webhook_path_secret: "test-webhook-secret".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let credential_store = match env::var("CREDENTIAL_STORE")
            .unwrap_or_else(|_| "firestore".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "firestore" => StoreBackend::Firestore,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid(
                    "CREDENTIAL_STORE",
                    format!("unknown backend '{}'", other),
                ))
            }
        };

        Ok(Self {
            provider_client_id: required("PROVIDER_CLIENT_ID")?,
            provider_token_url: required("PROVIDER_TOKEN_URL")?,
            provider_api_url: required("PROVIDER_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            provider_revoke_url: optional("PROVIDER_REVOKE_URL"),
            sink_url: optional("SINK_URL"),
            sink_category: env::var("SINK_CATEGORY").unwrap_or_else(|_| "biometric".to_string()),
            poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 60)?),
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 10)?),
            resume_polling_on_startup: parse_or("RESUME_POLLING_ON_STARTUP", true)?,
            credential_store,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,

            provider_client_secret: required("PROVIDER_CLIENT_SECRET")?,
            token_encryption_key: required("TOKEN_ENCRYPTION_KEY")?.into_bytes(),
            jwt_signing_key: required("JWT_SIGNING_KEY")?.into_bytes(),
            webhook_path_secret: required("WEBHOOK_PATH_SECRET")?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
