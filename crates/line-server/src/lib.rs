//! Line Server
//!
//! Daemon hosting the UART <-> TCP line bridge: loads settings, opens the
//! serial device and listener, ticks the engine, and serves status, health
//! and Prometheus endpoints.

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use line_bridge::{BridgeEngine, BridgeStats, Client};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use serial_link::{bind_listener, ClientSocket, SerialPortTransport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod bridge;
mod routes;
mod settings;

pub use bridge::run_bridge;
pub use settings::{HostSettings, ServerSettings, DEFAULT_SETTINGS_PATH};

/// State shared between the bridge loop and HTTP handlers
pub struct AppState {
    /// Latest bridge statistics
    pub stats: BridgeStats,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Serial device path
    pub serial_device: String,
    /// TCP port clients connect to
    pub listen_port: u16,
    /// Client cap
    pub max_clients: usize,
    /// Connected clients as of the last tick
    pub clients: Vec<ClientInfo>,
}

impl AppState {
    /// Create new application state
    pub fn new(serial_device: &str, listen_port: u16, max_clients: usize) -> Self {
        Self {
            stats: BridgeStats::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            serial_device: serial_device.to_string(),
            listen_port,
            max_clients,
            clients: Vec::new(),
        }
    }
}

/// One connected client as shown by the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: u64,
    pub peer: String,
    pub backlog_bytes: usize,
    pub connected_seconds: u64,
    pub idle_ms: u64,
}

impl ClientInfo {
    /// Describe `client` as of `now`
    pub fn from_client<C: ClientSocket>(client: &Client<C>, now: Instant) -> Self {
        Self {
            id: client.id().get(),
            peer: client.peer().to_string(),
            backlog_bytes: client.backlog(),
            connected_seconds: now.saturating_duration_since(client.connected_since()).as_secs(),
            idle_ms: now.saturating_duration_since(client.last_activity()).as_millis() as u64,
        }
    }
}

pub type SharedState = Arc<RwLock<AppState>>;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub clients: usize,
}

/// Create the status router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/status", get(routes::status::get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let state = state.read().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        clients: state.stats.connection_count,
    })
}

/// Initialize logging at `level`, falling back to INFO
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let max_level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(max_level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Install the Prometheus exporter on `addr`
pub fn install_metrics(addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid metrics address {}", addr))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}

/// Serve the status API until the process exits
pub async fn serve_status(addr: String, state: SharedState) -> anyhow::Result<()> {
    let app = create_router(state);

    info!("Starting status server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Run the daemon until Ctrl-C
pub async fn run(settings: ServerSettings) -> anyhow::Result<()> {
    let bridge_settings = settings
        .bridge
        .validate()
        .context("Invalid bridge configuration")?;

    let serial = SerialPortTransport::open(&settings.serial)?;
    let serial_device = serial.device().to_string();
    let listener = bind_listener(bridge_settings.port)?;
    let engine = BridgeEngine::new(bridge_settings, serial, listener)?;
    engine.log_config();

    if settings.server.metrics_addr.is_empty() {
        warn!("Prometheus exporter disabled");
    } else {
        install_metrics(&settings.server.metrics_addr)?;
    }

    let state = Arc::new(RwLock::new(AppState::new(
        &serial_device,
        engine.settings().port,
        engine.registry().max_clients(),
    )));

    let status_addr = settings.server.status_addr.clone();
    let status_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_status(status_addr, status_state).await {
            error!("Status server failed: {}", e);
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Shutting down...");
    };
    run_bridge(engine, settings.server.tick_interval(), state, shutdown).await;

    Ok(())
}
