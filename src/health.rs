//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the webhooks are registered)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Labels for per-role metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RoleLabels {
    pub role: String,
}

impl EncodeLabelSet for RoleLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("role", self.role.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the registrar
pub struct Metrics {
    /// Successful (or already-present) webhook creates
    pub webhook_creates_total: Family<RoleLabels, Counter>,
    /// Failed webhook creates
    pub webhook_create_errors_total: Family<RoleLabels, Counter>,
    /// Successful namespace selector updates
    pub webhook_updates_total: Family<RoleLabels, Counter>,
    /// Failed namespace selector updates (each one is retried)
    pub webhook_update_errors_total: Family<RoleLabels, Counter>,
    /// Full registration pass duration
    pub register_duration_seconds: Histogram,
    /// Completed teardowns
    pub teardowns_total: Counter,
    /// Unix time of the last successful write of the registrations
    pub last_register_timestamp_seconds: Gauge,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let webhook_creates_total = Family::<RoleLabels, Counter>::default();
        registry.register(
            "registrar_webhook_creates",
            "Total number of webhook configurations created",
            webhook_creates_total.clone(),
        );

        let webhook_create_errors_total = Family::<RoleLabels, Counter>::default();
        registry.register(
            "registrar_webhook_create_errors",
            "Total number of failed webhook configuration creates",
            webhook_create_errors_total.clone(),
        );

        let webhook_updates_total = Family::<RoleLabels, Counter>::default();
        registry.register(
            "registrar_webhook_updates",
            "Total number of namespace selector updates",
            webhook_updates_total.clone(),
        );

        let webhook_update_errors_total = Family::<RoleLabels, Counter>::default();
        registry.register(
            "registrar_webhook_update_errors",
            "Total number of failed namespace selector updates",
            webhook_update_errors_total.clone(),
        );

        let register_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "registrar_register_duration_seconds",
            "Duration of a full registration pass in seconds",
            register_duration_seconds.clone(),
        );

        let teardowns_total = Counter::default();
        registry.register(
            "registrar_teardowns",
            "Total number of webhook configuration teardowns",
            teardowns_total.clone(),
        );

        let last_register_timestamp_seconds = Gauge::default();
        registry.register(
            "registrar_last_register_timestamp_seconds",
            "Unix time of the last successful registration or selector update",
            last_register_timestamp_seconds.clone(),
        );

        Self {
            webhook_creates_total,
            webhook_create_errors_total,
            webhook_updates_total,
            webhook_update_errors_total,
            register_duration_seconds,
            teardowns_total,
            last_register_timestamp_seconds,
            registry,
        }
    }

    fn labels(role: &str) -> RoleLabels {
        RoleLabels {
            role: role.to_string(),
        }
    }

    /// Record a webhook create outcome
    pub fn record_create(&self, role: &str, success: bool) {
        let family = if success {
            &self.webhook_creates_total
        } else {
            &self.webhook_create_errors_total
        };
        family.get_or_create(&Self::labels(role)).inc();
    }

    /// Record a namespace selector update outcome
    pub fn record_update(&self, role: &str, success: bool) {
        let family = if success {
            &self.webhook_updates_total
        } else {
            &self.webhook_update_errors_total
        };
        family.get_or_create(&Self::labels(role)).inc();
    }

    /// Record a full registration pass
    pub fn record_register(&self, duration_secs: f64) {
        self.register_duration_seconds.observe(duration_secs);
    }

    /// Record a completed teardown
    pub fn record_teardown(&self) {
        self.teardowns_total.inc();
    }

    /// Record a successful write of the registrations at `epoch_secs`.
    /// The gauge never moves backwards.
    pub fn record_last_register(&self, epoch_secs: i64) {
        if epoch_secs > self.last_register_timestamp_seconds.get() {
            self.last_register_timestamp_seconds.set(epoch_secs);
        }
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether all webhook configurations are registered
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the registrar as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the registrar is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    /// Record the current time as the last successful write of the registrations
    pub fn touch_last_register(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|d| i64::try_from(d.as_secs()).ok())
            .unwrap_or_default();
        self.metrics.record_last_register(now);
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
/// This is a simple check - if we can respond, we're alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK once the webhook configurations are registered.
/// Returns 503 Service Unavailable if not ready.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0 on the given port and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
