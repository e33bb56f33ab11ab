//! Bridge Engine
//!
//! One [`BridgeEngine::tick`] accepts new clients, moves serial input through
//! the UART buffer to every client, moves client input through the TCP
//! buffer to the serial port, emits keepalives and applies the timeout
//! policies. Nothing in a tick waits for I/O; unfinished writes stay queued
//! for the next tick.

use crate::config::BridgeSettings;
use crate::error::BridgeError;
use crate::flush::{FlushEvent, FlushPolicy, TimeoutOverride};
use crate::keepalive::KeepaliveTimer;
use crate::registry::{ClientRegistry, DisconnectReason};
use crate::stats::BridgeStats;
use ring_buffer::{OverflowPolicy, RingBuffer};
use serial_link::{ConnectionListener, ReadOutcome, SerialTransport};
use std::io;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Size of one read from a transport
const READ_CHUNK: usize = 128;

/// New connections accepted per tick at most
const MAX_ACCEPTS_PER_TICK: usize = 8;

/// Per-tick read budget per source, as a multiple of the target buffer capacity
const READ_BUDGET_FACTOR: usize = 4;

/// Serial output queue bound, as a multiple of the TCP buffer capacity
const SERIAL_QUEUE_FACTOR: usize = 2;

/// What happened during one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Clients accepted
    pub accepted: usize,
    /// UART -> TCP flush events (lines and timeouts)
    pub uart_flushes: usize,
    /// TCP -> UART flush events (lines and timeouts)
    pub tcp_flushes: usize,
    /// A keepalive was queued to the serial port
    pub keepalive_sent: bool,
    /// Clients disconnected by timeout or slow-client policy
    pub dropped_clients: usize,
}

/// Bidirectional UART <-> TCP line bridge
pub struct BridgeEngine<S: SerialTransport, L: ConnectionListener> {
    settings: BridgeSettings,
    serial: S,
    listener: L,
    registry: ClientRegistry<L::Connection>,
    uart_buf: RingBuffer,
    tcp_buf: RingBuffer,
    uart_flush: FlushPolicy,
    tcp_flush: FlushPolicy,
    keepalive: KeepaliveTimer,
    /// Bytes waiting to be written to the serial port
    serial_out: Vec<u8>,
    serial_out_limit: usize,
    serial_out_dropped: u64,
    /// Set while a paced TCP command waits for the serial peer's answer
    awaiting_since: Option<Instant>,
    stats: BridgeStats,
    scratch: [u8; READ_CHUNK],
}

impl<S: SerialTransport, L: ConnectionListener> BridgeEngine<S, L> {
    /// Create an engine whose clocks start now
    pub fn new(settings: BridgeSettings, serial: S, listener: L) -> Result<Self, BridgeError> {
        Self::new_at(settings, serial, listener, Instant::now())
    }

    /// Create an engine whose clocks start at `now`
    pub fn new_at(
        settings: BridgeSettings,
        serial: S,
        listener: L,
        now: Instant,
    ) -> Result<Self, BridgeError> {
        let uart_buf = RingBuffer::with_policy(settings.uart.buffer_size, settings.uart.overflow)?;
        let tcp_buf = RingBuffer::with_policy(settings.tcp.buffer_size, settings.tcp.overflow)?;

        Ok(Self {
            registry: ClientRegistry::new(settings.max_clients, settings.client_backlog_limit),
            uart_flush: FlushPolicy::new(&settings.uart),
            tcp_flush: FlushPolicy::new(&settings.tcp),
            keepalive: KeepaliveTimer::new(&settings.keepalive, now),
            serial_out: Vec::new(),
            serial_out_limit: settings.tcp.buffer_size * SERIAL_QUEUE_FACTOR,
            serial_out_dropped: 0,
            awaiting_since: None,
            stats: BridgeStats::default(),
            scratch: [0u8; READ_CHUNK],
            uart_buf,
            tcp_buf,
            settings,
            serial,
            listener,
        })
    }

    /// Replace the fixed UART timeout with a dynamic override
    pub fn set_uart_override<O: TimeoutOverride + 'static>(&mut self, timeout_override: O) {
        self.uart_flush.set_override(Some(Box::new(timeout_override)));
    }

    /// Replace the fixed TCP timeout with a dynamic override
    pub fn set_tcp_override<O: TimeoutOverride + 'static>(&mut self, timeout_override: O) {
        self.tcp_flush.set_override(Some(Box::new(timeout_override)));
    }

    /// Run one scheduler tick at the current time
    pub fn tick(&mut self) -> Result<TickSummary, BridgeError> {
        self.tick_at(Instant::now())
    }

    /// Run one scheduler tick at `now`.
    ///
    /// A serial transport failure is returned after the rest of the tick has
    /// run; client sockets are still serviced.
    pub fn tick_at(&mut self, now: Instant) -> Result<TickSummary, BridgeError> {
        let mut summary = TickSummary::default();
        let mut serial_error: Option<io::Error> = None;

        if let Err(e) = self.accept_clients(now, &mut summary) {
            serial_error.get_or_insert(e);
        }
        if let Err(e) = self.service_uart(now, &mut summary) {
            serial_error.get_or_insert(e);
        }
        self.service_clients(now, &mut summary)?;

        if self.keepalive_due(now) {
            summary.keepalive_sent = true;
        }
        if let Err(e) = self.write_serial() {
            serial_error.get_or_insert(e);
        }

        if let Some(idle_timeout) = self.settings.client_idle_timeout {
            summary.dropped_clients += self.registry.drop_idle(now, idle_timeout);
        }
        self.registry.flush_pending();
        if self.registry.is_empty() {
            self.awaiting_since = None;
        }
        self.update_stats();

        match serial_error {
            Some(e) => {
                error!("Serial transport failure: {}", e);
                Err(BridgeError::Serial(e))
            }
            None => Ok(summary),
        }
    }

    fn accept_clients(&mut self, now: Instant, summary: &mut TickSummary) -> io::Result<()> {
        for _ in 0..MAX_ACCEPTS_PER_TICK {
            let socket = match self.listener.try_accept() {
                Ok(Some(socket)) => socket,
                Ok(None) => break,
                Err(e) => {
                    warn!("Accepting TCP client failed: {}", e);
                    break;
                }
            };

            let first_client = self.registry.is_empty();
            match self.registry.accept(socket, now) {
                Ok(_) => summary.accepted += 1,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            }

            if first_client && self.settings.flush_stale_on_connect {
                let stale = self.uart_buf.len();
                self.uart_buf.clear();
                self.uart_flush.reset();
                let discarded = self.serial.discard_input()?;
                if stale + discarded > 0 {
                    warn!(
                        "First client connected, discarded {} stale UART bytes",
                        stale + discarded
                    );
                }
            }
        }
        Ok(())
    }

    /// Steps 1-2: serial input -> UART buffer -> clients.
    ///
    /// Under `DropNewest` a full buffer leaves input in the serial driver
    /// until a flush makes room; only stored bytes restart the timeout clock.
    fn service_uart(&mut self, now: Instant, summary: &mut TickSummary) -> io::Result<()> {
        let budget = self.uart_buf.capacity() * READ_BUDGET_FACTOR;
        let mut consumed = 0;

        while consumed < budget {
            if self.uart_buf.is_full() {
                self.flush_uart(now, summary);
                if self.uart_buf.is_full()
                    && self.uart_buf.overflow_policy() == OverflowPolicy::DropNewest
                {
                    debug!("UART buffer full, waiting for a flush");
                    break;
                }
            }

            let free = self.uart_buf.free_space();
            let want = if free == 0 { READ_CHUNK } else { free.min(READ_CHUNK) };
            let n = self.serial.try_read(&mut self.scratch[..want])?;
            if n == 0 {
                break;
            }
            consumed += n;
            self.keepalive.record_activity(now);

            if self.settings.discard_uart_without_clients && self.registry.is_empty() {
                debug!("Discarded {} bytes from UART (no clients connected)", n);
                continue;
            }

            let written = self.uart_buf.write(&self.scratch[..n]);
            if written > 0 {
                self.uart_flush.record_arrival(now);
            }
            if written < n {
                warn!("UART buffer overflow, dropped {} bytes", n - written);
            }
            self.flush_uart(now, summary);
        }

        self.flush_uart(now, summary);
        Ok(())
    }

    fn flush_uart(&mut self, now: Instant, summary: &mut TickSummary) {
        loop {
            let event = match self.uart_flush.poll(&mut self.uart_buf, now) {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => {
                    error!("UART buffer error: {}", e);
                    self.uart_buf.clear();
                    break;
                }
            };
            summary.uart_flushes += 1;

            match event {
                FlushEvent::Line(line) => {
                    self.stats.uart_lines += 1;
                    self.awaiting_since = None;
                    debug!("UART -> TCP [line]: {:?}", String::from_utf8_lossy(&line));
                    self.broadcast(&line, summary);
                }
                FlushEvent::Timeout(data) => {
                    self.stats.uart_timeouts += 1;
                    warn!("UART -> TCP [timeout flush]: {:?}", String::from_utf8_lossy(&data));
                    self.broadcast(&data, summary);
                    self.on_uart_timeout(summary);
                }
                FlushEvent::Discarded(n) => {
                    self.stats.uart_timeouts += 1;
                    warn!("UART partial of {} bytes timed out and was discarded", n);
                    self.on_uart_timeout(summary);
                }
            }
        }
    }

    fn broadcast(&mut self, data: &[u8], summary: &mut TickSummary) {
        if data.is_empty() || self.registry.is_empty() {
            return;
        }
        summary.dropped_clients += self.registry.broadcast(data).len();
    }

    fn on_uart_timeout(&mut self, summary: &mut TickSummary) {
        self.awaiting_since = None;
        if self.settings.drop_clients_on_uart_timeout && !self.registry.is_empty() {
            let dropped = self.registry.disconnect_all(DisconnectReason::UartTimeout);
            warn!("UART timeout, dropped {} TCP clients", dropped);
            summary.dropped_clients += dropped;
        }
    }

    /// Step 3: client input -> TCP buffer -> serial queue
    fn service_clients(&mut self, now: Instant, summary: &mut TickSummary) -> Result<(), BridgeError> {
        let budget = self.tcp_buf.capacity() * READ_BUDGET_FACTOR;

        for id in self.registry.ids() {
            let mut consumed = 0;
            while consumed < budget {
                let n = match self.registry.poll_readable(id, &mut self.scratch, now) {
                    ReadOutcome::Data(n) => n,
                    ReadOutcome::WouldBlock | ReadOutcome::Closed => break,
                };
                consumed += n;

                let written = self.tcp_buf.write(&self.scratch[..n]);
                if written > 0 {
                    self.tcp_flush.record_arrival(now);
                }
                if written < n {
                    warn!("TCP buffer overflow, dropped {} bytes from client {}", n - written, id);
                }
                self.flush_tcp(now, summary)?;
            }
        }

        self.flush_tcp(now, summary)
    }

    fn flush_tcp(&mut self, now: Instant, summary: &mut TickSummary) -> Result<(), BridgeError> {
        if let Some(since) = self.awaiting_since {
            if now.saturating_duration_since(since) < self.settings.uart.timeout {
                return Ok(());
            }
            debug!("No UART response to paced command, releasing TCP queue");
            self.awaiting_since = None;
        }

        while let Some(event) = self.tcp_flush.poll(&mut self.tcp_buf, now)? {
            summary.tcp_flushes += 1;
            match event {
                FlushEvent::Line(command) => {
                    self.stats.tcp_lines += 1;
                    debug!("TCP -> UART [line]: {:?}", String::from_utf8_lossy(&command));
                    self.queue_serial(&command);
                    if self.settings.pace_tcp_commands {
                        self.awaiting_since = Some(now);
                        break;
                    }
                }
                FlushEvent::Timeout(data) => {
                    self.stats.tcp_timeouts += 1;
                    warn!("TCP -> UART [timeout flush]: {:?}", String::from_utf8_lossy(&data));
                    self.queue_serial(&data);
                }
                FlushEvent::Discarded(n) => {
                    self.stats.tcp_timeouts += 1;
                    warn!("TCP partial of {} bytes timed out and was discarded", n);
                }
            }
        }
        Ok(())
    }

    /// Step 4: keepalive toward the serial peer
    fn keepalive_due(&mut self, now: Instant) -> bool {
        if self.settings.keepalive.only_without_clients && !self.registry.is_empty() {
            return false;
        }
        let Some(payload) = self.keepalive.poll(now) else {
            return false;
        };
        let payload = payload.to_vec();
        debug!("UART keepalive: {:?}", String::from_utf8_lossy(&payload));
        self.queue_serial(&payload);
        true
    }

    fn queue_serial(&mut self, data: &[u8]) {
        let room = self.serial_out_limit.saturating_sub(self.serial_out.len());
        let take = data.len().min(room);
        self.serial_out.extend_from_slice(&data[..take]);
        if take < data.len() {
            let dropped = data.len() - take;
            self.serial_out_dropped += dropped as u64;
            warn!("Serial output queue full, dropped {} bytes", dropped);
        }
    }

    fn write_serial(&mut self) -> io::Result<()> {
        if self.serial_out.is_empty() {
            return Ok(());
        }
        let n = self.serial.try_write(&self.serial_out)?;
        self.serial_out.drain(..n);
        Ok(())
    }

    /// Step 6: refresh the snapshot read by diagnostic observers
    fn update_stats(&mut self) {
        let previous = self.stats.connection_count;

        self.stats.connection_count = self.registry.len();
        self.stats.connected = !self.registry.is_empty();
        self.stats.total_connections = self.registry.total_accepted();
        self.stats.rejected_connections = self.registry.rejected();
        self.stats.disconnections = self.registry.disconnections();
        self.stats.slow_client_drops = self.registry.slow_client_drops();
        self.stats.uart_overflow_bytes = self.uart_buf.dropped_bytes();
        self.stats.tcp_overflow_bytes = self.tcp_buf.dropped_bytes() + self.serial_out_dropped;
        self.stats.keepalives_sent = self.keepalive.sent();

        if previous != self.stats.connection_count {
            info!("Connection count: {}", self.stats.connection_count);
        }
        self.stats.publish_metrics();
    }

    /// Disconnect every client
    pub fn shutdown(&mut self) {
        let dropped = self.registry.disconnect_all(DisconnectReason::Shutdown);
        self.update_stats();
        info!(
            "Line bridge shut down, closed {} clients ({} served in total)",
            dropped, self.stats.total_connections
        );
    }

    /// Log the active configuration
    pub fn log_config(&self) {
        let s = &self.settings;
        info!("Line bridge:");
        info!("- Listening on port {}", s.port);
        info!(
            "- UART buffer: size={}, terminator={}, timeout={}ms, include terminator={}",
            s.uart.buffer_size,
            s.uart.terminator,
            s.uart.timeout.as_millis(),
            s.uart.include_terminator
        );
        info!(
            "- TCP buffer: size={}, terminator={}, timeout={}ms, include terminator={}",
            s.tcp.buffer_size,
            s.tcp.terminator,
            s.tcp.timeout.as_millis(),
            s.tcp.include_terminator
        );
        info!(
            "- Clients: max={}, backlog limit={} bytes, drop on UART timeout={}",
            s.max_clients, s.client_backlog_limit, s.drop_clients_on_uart_timeout
        );
        if s.keepalive.is_enabled() {
            info!(
                "- UART keepalive: every {}ms, {} byte payload, only without clients={}",
                s.keepalive.interval.as_millis(),
                s.keepalive.payload.len(),
                s.keepalive.only_without_clients
            );
        }
    }

    /// Latest statistics snapshot
    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Validated settings in use
    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Connected clients
    pub fn registry(&self) -> &ClientRegistry<L::Connection> {
        &self.registry
    }

    /// Bytes waiting in the UART -> TCP buffer
    pub fn uart_buffered(&self) -> usize {
        self.uart_buf.len()
    }

    /// Bytes waiting in the TCP -> UART buffer
    pub fn tcp_buffered(&self) -> usize {
        self.tcp_buf.len()
    }

    /// Bytes queued for the serial port
    pub fn serial_backlog(&self) -> usize {
        self.serial_out.len()
    }
}
