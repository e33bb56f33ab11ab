//! Read-Only Bridge Statistics

use serde::Serialize;

/// Snapshot refreshed once per tick for diagnostic observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// At least one TCP client is connected
    pub connected: bool,
    /// Currently connected clients
    pub connection_count: usize,
    /// Clients accepted since start
    pub total_connections: u64,
    /// Connections refused at the client cap
    pub rejected_connections: u64,
    /// Clients disconnected for any reason
    pub disconnections: u64,
    /// Terminated lines forwarded UART -> TCP
    pub uart_lines: u64,
    /// Terminated lines forwarded TCP -> UART
    pub tcp_lines: u64,
    /// UART timeout flushes (forwarded or discarded)
    pub uart_timeouts: u64,
    /// TCP timeout flushes (forwarded or discarded)
    pub tcp_timeouts: u64,
    /// Bytes lost to UART buffer overflow
    pub uart_overflow_bytes: u64,
    /// Bytes lost to TCP buffer or serial queue overflow
    pub tcp_overflow_bytes: u64,
    /// Keepalive payloads queued to the serial port
    pub keepalives_sent: u64,
    /// Clients dropped for exceeding their backlog bound
    pub slow_client_drops: u64,
}

impl BridgeStats {
    /// Publish through the `metrics` facade
    pub fn publish_metrics(&self) {
        metrics::gauge!("line_bridge_connected").set(if self.connected { 1.0 } else { 0.0 });
        metrics::gauge!("line_bridge_connections").set(self.connection_count as f64);
        metrics::counter!("line_bridge_connections_total").absolute(self.total_connections);
        metrics::counter!("line_bridge_connections_rejected_total").absolute(self.rejected_connections);
        metrics::counter!("line_bridge_disconnections_total").absolute(self.disconnections);
        metrics::counter!("line_bridge_uart_lines_total").absolute(self.uart_lines);
        metrics::counter!("line_bridge_tcp_lines_total").absolute(self.tcp_lines);
        metrics::counter!("line_bridge_uart_timeouts_total").absolute(self.uart_timeouts);
        metrics::counter!("line_bridge_tcp_timeouts_total").absolute(self.tcp_timeouts);
        metrics::counter!("line_bridge_uart_overflow_bytes_total").absolute(self.uart_overflow_bytes);
        metrics::counter!("line_bridge_tcp_overflow_bytes_total").absolute(self.tcp_overflow_bytes);
        metrics::counter!("line_bridge_keepalives_total").absolute(self.keepalives_sent);
        metrics::counter!("line_bridge_slow_client_drops_total").absolute(self.slow_client_drops);
    }
}
