// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use pulse_relay::config::Config;
use pulse_relay::db::{FirestoreDb, MemoryStore};
use pulse_relay::error::AppError;
use pulse_relay::middleware::create_jwt;
use pulse_relay::models::{CredentialUpdate, Sample};
use pulse_relay::routes::create_router;
use pulse_relay::services::{
    MetricRecord, MetricSource, SampleSink, TokenCipher, TokenEndpoint, TokenGrant,
};
use pulse_relay::AppState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

#[allow(dead_code)]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ─── Stub Token Endpoint ─────────────────────────────────────

/// How the stub token endpoint answers refresh requests.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum RefreshMode {
    /// Issue `access-{n}` with the given lifetime; rotate the refresh token if set.
    Grant { expires_in: i64, rotate: bool },
    Reject,
    Transient,
}

pub struct StubEndpoint {
    pub refresh_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
    pub revoked: Mutex<Vec<String>>,
    mode: Mutex<RefreshMode>,
    delay: Mutex<Duration>,
}

#[allow(dead_code)]
impl StubEndpoint {
    pub fn new() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            revoked: Mutex::new(Vec::new()),
            mode: Mutex::new(RefreshMode::Grant {
                expires_in: 3600,
                rotate: false,
            }),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_mode(&self, mode: RefreshMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenEndpoint for StubEndpoint {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, AppError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mode = self.mode.lock().unwrap().clone();
        match mode {
            RefreshMode::Grant { expires_in, rotate } => Ok(TokenGrant {
                access_token: format!("access-{}", n),
                refresh_token: rotate.then(|| format!("refresh-{}", n)),
                expires_in,
            }),
            RefreshMode::Reject => Err(AppError::RefreshRejected(
                "HTTP 400: invalid_grant".to_string(),
            )),
            RefreshMode::Transient => Err(AppError::TransientNetwork(
                "Token endpoint returned 503".to_string(),
            )),
        }
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AppError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        self.revoked.lock().unwrap().push(access_token.to_string());
        Ok(())
    }
}

// ─── Stub Metric Source ──────────────────────────────────────

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum SourceMode {
    Value(f64),
    Empty,
    AuthFailure,
    Transient,
    Panic,
}

pub struct StubSource {
    pub calls: AtomicUsize,
    pub tokens_seen: Mutex<Vec<String>>,
    mode: Mutex<SourceMode>,
    delay: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[allow(dead_code)]
impl StubSource {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
            mode: Mutex::new(SourceMode::Value(72.0)),
            delay: Mutex::new(Duration::ZERO),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: SourceMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls ever in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricSource for StubSource {
    async fn latest(&self, access_token: &str) -> Result<Option<MetricRecord>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen
            .lock()
            .unwrap()
            .push(access_token.to_string());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let mode = self.mode.lock().unwrap().clone();
        match mode {
            SourceMode::Value(value) => {
                let mut auxiliary = serde_json::Map::new();
                auxiliary.insert("quality".to_string(), serde_json::json!("good"));
                Ok(Some(MetricRecord { value, auxiliary }))
            }
            SourceMode::Empty => Ok(None),
            SourceMode::AuthFailure => Err(AppError::Auth("Metric endpoint returned 401".to_string())),
            SourceMode::Transient => Err(AppError::TransientNetwork(
                "Metric endpoint returned 503".to_string(),
            )),
            SourceMode::Panic => panic!("metric decoder blew up"),
        }
    }
}

// ─── Stub Sink ───────────────────────────────────────────────

pub struct StubSink {
    pub forwarded: Mutex<Vec<Sample>>,
}

#[allow(dead_code)]
impl StubSink {
    pub fn new() -> Self {
        Self {
            forwarded: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.forwarded.lock().unwrap().len()
    }
}

#[async_trait]
impl SampleSink for StubSink {
    async fn forward(&self, sample: &Sample) -> Result<(), AppError> {
        self.forwarded.lock().unwrap().push(sample.clone());
        Ok(())
    }
}

// ─── Test App ────────────────────────────────────────────────

/// Fully wired state over an in-memory store and stub collaborators.
#[allow(dead_code)]
pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub endpoint: Arc<StubEndpoint>,
    pub source: Arc<StubSource>,
    pub sink: Arc<StubSink>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let endpoint = Arc::new(StubEndpoint::new());
        let source = Arc::new(StubSource::new());
        let sink = Arc::new(StubSink::new());
        let cipher = TokenCipher::from_secret(&config.token_encryption_key).unwrap();

        let state = Arc::new(AppState::build(
            config,
            store.clone(),
            cipher,
            endpoint.clone(),
            source.clone(),
            sink.clone(),
        ));

        Self {
            state,
            store,
            endpoint,
            source,
            sink,
        }
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    /// Store a credential for `user_id` whose access token is `access-seed`.
    pub async fn seed(&self, user_id: &str, expires_at: i64, polling_enabled: bool) {
        self.state
            .vault
            .set(
                user_id,
                CredentialUpdate {
                    access_token: Some("access-seed".to_string()),
                    refresh_token: Some("refresh-seed".to_string()),
                    expires_at: Some(expires_at),
                    polling_enabled: Some(polling_enabled),
                },
            )
            .await
            .unwrap();
    }

    /// Seed a credential valid for another hour.
    pub async fn seed_valid(&self, user_id: &str) {
        self.seed(user_id, now_ms() + 3_600_000, false).await;
    }

    pub fn jwt(&self, user_id: &str) -> String {
        create_jwt(user_id, &self.state.config.jwt_signing_key).unwrap()
    }
}
