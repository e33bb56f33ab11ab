//! Status Routes

use axum::{extract::State, Json};
use line_bridge::BridgeStats;
use serde::Serialize;

use crate::{ClientInfo, SharedState};

/// Response for the status endpoint
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub serial_device: String,
    pub listen_port: u16,
    pub max_clients: usize,
    pub stats: BridgeStats,
    pub clients: Vec<ClientInfo>,
}

/// Latest bridge statistics snapshot
pub async fn get_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let state = state.read().await;

    Json(StatusResponse {
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        serial_device: state.serial_device.clone(),
        listen_port: state.listen_port,
        max_clients: state.max_clients,
        stats: state.stats,
        clients: state.clients.clone(),
    })
}
