//! Bridge Scheduler Loop

use line_bridge::BridgeEngine;
use serial_link::{ConnectionListener, SerialTransport};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::{ClientInfo, SharedState};

/// Tick `engine` every `period` until `shutdown` resolves.
///
/// Every tick publishes the engine's statistics into `state`. Serial
/// failures are logged by the engine and the loop keeps going, so a device
/// that comes back is picked up without a restart.
pub async fn run_bridge<S, L, F>(
    mut engine: BridgeEngine<S, L>,
    period: Duration,
    state: SharedState,
    shutdown: F,
) where
    S: SerialTransport,
    L: ConnectionListener,
    F: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!("Bridge running, tick every {:?}", period);
    let mut failed_ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                if let Err(e) = engine.tick() {
                    failed_ticks += 1;
                    debug!("Tick {} failed: {}", failed_ticks, e);
                }
                publish(&engine, &state).await;
            }
        }
    }

    engine.shutdown();
    publish(&engine, &state).await;
    info!("Bridge stopped after {} failed ticks", failed_ticks);
}

/// Copy the engine's statistics and client list into `state`
async fn publish<S, L>(engine: &BridgeEngine<S, L>, state: &SharedState)
where
    S: SerialTransport,
    L: ConnectionListener,
{
    let now = Instant::now();
    let clients: Vec<ClientInfo> = engine
        .registry()
        .iter()
        .map(|client| ClientInfo::from_client(client, now))
        .collect();

    let mut state = state.write().await;
    state.stats = *engine.stats();
    state.clients = clients;
}
