//! HTTP API for the monitoring dashboard.
//!
//! Exposes the monitor's query operations over REST and pushes live
//! `gpio_update` / `system_update` events to clients via server-sent
//! events. The SSE feed is fed by a [`BroadcastSink`] attached to the
//! monitor's broadcast path.
//!
//! # Architecture
//!
//! ```text
//! Sampler ──▶ Broadcast loop ──▶ BroadcastSink ──▶ GET /api/stream (SSE)
//!                   │
//! Dashboard ◀── REST (/api/gpio/*, /api/system/*, /api/config)
//! ```

use crate::monitor::{HistoryEntry, PinMonitor, StatusSnapshot};
use crate::broadcast::{PublishError, PublishSink, UpdateEvent};
use crate::system::SystemInfoCollector;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

/// How many pending stream updates a slow SSE client may fall behind
/// before it starts skipping.
const STREAM_BUFFER: usize = 256;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (port 0 for random)
    pub host: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
        }
    }
}

/// One update on the live stream.
#[derive(Debug, Clone)]
pub struct StreamUpdate {
    pub event: &'static str,
    pub payload: serde_json::Value,
}

/// Publish sink that fans updates out to connected SSE clients.
///
/// Publishing never blocks the broadcast loop; with no client connected
/// the update is simply dropped.
pub struct BroadcastSink {
    tx: broadcast::Sender<StreamUpdate>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STREAM_BUFFER);
        Self { tx }
    }

    pub fn sender(&self) -> broadcast::Sender<StreamUpdate> {
        self.tx.clone()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishSink for BroadcastSink {
    fn publish(&self, event: UpdateEvent, payload: &serde_json::Value) -> Result<(), PublishError> {
        let _ = self.tx.send(StreamUpdate {
            event: event.as_str(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Shared server state
struct ServerState {
    monitor: Arc<PinMonitor>,
    /// Locked only from blocking tasks; sysinfo refreshes are not async.
    system: std::sync::Mutex<SystemInfoCollector>,
    updates: broadcast::Sender<StreamUpdate>,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Generic status response for mutating endpoints
#[derive(Serialize)]
struct ActionResponse {
    status: String,
    message: String,
}

#[derive(Deserialize)]
struct HistoryParams {
    hours: Option<f64>,
}

#[derive(Serialize)]
struct ConfigView {
    pins_monitored: Vec<u8>,
    update_interval_seconds: f64,
    pin_labels: HashMap<u8, String>,
    source: &'static str,
}

#[derive(Deserialize)]
struct ConfigUpdate {
    pin_labels: Option<HashMap<u8, String>>,
}

/// GET /
async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "pinwatch",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/api/gpio/status",
            "/api/gpio/transitions",
            "/api/gpio/history/{pin}",
            "/api/gpio/reset",
            "/api/system/info",
            "/api/system/lightweight",
            "/api/config",
            "/api/stream",
        ],
    }))
}

/// JSON body for unknown routes.
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found"})),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/gpio/status
async fn gpio_status(State(state): State<Arc<ServerState>>) -> Json<StatusSnapshot> {
    Json(state.monitor.get_status())
}

/// GET /api/gpio/transitions
async fn gpio_transitions(State(state): State<Arc<ServerState>>) -> Json<HashMap<u8, u64>> {
    Json(state.monitor.get_transition_summary())
}

/// GET /api/gpio/history/{pin}?hours=
async fn gpio_history(
    State(state): State<Arc<ServerState>>,
    Path(pin): Path<u8>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<HistoryEntry>> {
    let hours = params
        .hours
        .unwrap_or_else(|| state.monitor.default_history_hours());
    let entries = state
        .monitor
        .get_history(pin, hours)
        .iter()
        .map(HistoryEntry::from)
        .collect();
    Json(entries)
}

/// POST /api/gpio/reset
async fn reset_counters(State(state): State<Arc<ServerState>>) -> Json<ActionResponse> {
    state.monitor.reset();
    Json(ActionResponse {
        status: "success".to_string(),
        message: "Counters reset".to_string(),
    })
}

/// GET /api/system/info
///
/// sysinfo refreshes block, so they run on the blocking thread pool
/// rather than an async worker.
async fn system_info(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<crate::system::SystemSummary>, StatusCode> {
    let summary = tokio::task::spawn_blocking(move || lock_collector(&state).summary())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(summary))
}

/// GET /api/system/lightweight
async fn system_lightweight(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<crate::system::LightweightSummary>, StatusCode> {
    let summary =
        tokio::task::spawn_blocking(move || lock_collector(&state).lightweight_summary())
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(summary))
}

fn lock_collector(state: &ServerState) -> std::sync::MutexGuard<'_, SystemInfoCollector> {
    state.system.lock().unwrap_or_else(|e| e.into_inner())
}

/// GET /api/config
async fn get_config(State(state): State<Arc<ServerState>>) -> Json<ConfigView> {
    Json(ConfigView {
        pins_monitored: state.monitor.monitored_pins(),
        update_interval_seconds: state.monitor.config().update_interval.as_secs_f64(),
        pin_labels: state.monitor.labels(),
        source: if state.monitor.is_running() {
            "running"
        } else {
            "stopped"
        },
    })
}

/// POST /api/config
///
/// Only pin labels can change at runtime; everything else needs a restart.
async fn update_config(
    State(state): State<Arc<ServerState>>,
    Json(update): Json<ConfigUpdate>,
) -> Json<ActionResponse> {
    if let Some(labels) = update.pin_labels {
        state.monitor.set_labels(labels);
    }
    Json(ActionResponse {
        status: "success".to_string(),
        message: "Configuration updated".to_string(),
    })
}

/// GET /api/stream
///
/// Live feed of `gpio_update` and `system_update` events. Clients that
/// fall too far behind skip missed updates; the next heartbeat catches
/// them up with a full snapshot.
async fn stream(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.updates.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(update) => Event::default()
            .event(update.event)
            .json_data(&update.payload)
            .ok()
            .map(Ok),
        Err(_) => None, // lagged; skip to the next update
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    monitor: Arc<PinMonitor>,
    updates: broadcast::Sender<StreamUpdate>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState {
        monitor,
        system: std::sync::Mutex::new(SystemInfoCollector::new()),
        updates,
    });

    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/gpio/status", get(gpio_status))
        .route("/api/gpio/transitions", get(gpio_transitions))
        .route("/api/gpio/history/:pin", get(gpio_history))
        .route("/api/gpio/reset", post(reset_counters))
        .route("/api/system/info", get(system_info))
        .route("/api/system/lightweight", get(system_lightweight))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/stream", get(stream))
        .fallback(not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from((config.host, config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Dashboard API listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
