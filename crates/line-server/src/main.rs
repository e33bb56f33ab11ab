//! Line Server - Main Entry Point

use line_server::{init_logging, run, ServerSettings, DEFAULT_SETTINGS_PATH};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = ServerSettings::load(&path)?;
    init_logging(&settings.server.log_level)?;

    info!("=== Line Server v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Settings: {}", path);

    run(settings).await
}
