//! Connected Client Registry

use crate::error::BridgeError;
use serial_link::{ClientSocket, ReadOutcome};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Registry-assigned client identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Raw numeric id
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a client left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Remote end closed or reset the connection
    PeerClosed,
    /// Socket read failed
    ReadError,
    /// Socket write failed
    WriteError,
    /// Outbound backlog exceeded its bound
    SlowClient,
    /// Dropped because the UART side timed out
    UartTimeout,
    /// No inbound bytes for the configured idle timeout
    Idle,
    /// Bridge is shutting down
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DisconnectReason::PeerClosed => "peer closed",
            DisconnectReason::ReadError => "read error",
            DisconnectReason::WriteError => "write error",
            DisconnectReason::SlowClient => "slow client",
            DisconnectReason::UartTimeout => "UART timeout",
            DisconnectReason::Idle => "idle",
            DisconnectReason::Shutdown => "shutdown",
        };
        f.write_str(text)
    }
}

/// One connected client and its pending output
pub struct Client<C> {
    id: ClientId,
    socket: C,
    peer: String,
    outbound: Vec<u8>,
    write_offset: usize,
    connected_since: Instant,
    last_activity: Instant,
}

impl<C: ClientSocket> Client<C> {
    /// Registry id
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Peer address captured at accept time
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Bytes queued but not yet written to the socket
    pub fn backlog(&self) -> usize {
        self.outbound.len() - self.write_offset
    }

    /// When the client was accepted
    pub fn connected_since(&self) -> Instant {
        self.connected_since
    }

    /// Last time bytes arrived from this client
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Write as much of the backlog as the socket takes right now
    fn drain_outbound(&mut self) -> std::io::Result<()> {
        while self.write_offset < self.outbound.len() {
            let n = self.socket.try_write(&self.outbound[self.write_offset..])?;
            if n == 0 {
                break;
            }
            self.write_offset += n;
        }

        if self.write_offset == self.outbound.len() {
            self.outbound.clear();
            self.write_offset = 0;
        } else if self.write_offset > self.outbound.len() / 2 {
            self.outbound.drain(..self.write_offset);
            self.write_offset = 0;
        }
        Ok(())
    }
}

/// Set of connected clients with a connection cap and per-client backlog bound
pub struct ClientRegistry<C: ClientSocket> {
    clients: Vec<Client<C>>,
    max_clients: usize,
    backlog_limit: usize,
    next_id: u64,
    total_accepted: u64,
    rejected: u64,
    disconnections: u64,
    slow_client_drops: u64,
}

impl<C: ClientSocket> ClientRegistry<C> {
    /// Create an empty registry
    pub fn new(max_clients: usize, backlog_limit: usize) -> Self {
        Self {
            clients: Vec::with_capacity(max_clients),
            max_clients,
            backlog_limit,
            next_id: 1,
            total_accepted: 0,
            rejected: 0,
            disconnections: 0,
            slow_client_drops: 0,
        }
    }

    /// Register a freshly accepted connection
    pub fn accept(&mut self, mut socket: C, now: Instant) -> Result<ClientId, BridgeError> {
        let peer = socket.peer();
        if self.clients.len() >= self.max_clients {
            self.rejected += 1;
            socket.shutdown();
            warn!("Rejecting client {}: {} clients already connected", peer, self.clients.len());
            return Err(BridgeError::ConnectionLimitExceeded {
                limit: self.max_clients,
            });
        }

        let id = ClientId(self.next_id);
        self.next_id += 1;
        self.total_accepted += 1;

        info!("New client {} connected from {}", id, peer);
        self.clients.push(Client {
            id,
            socket,
            peer,
            outbound: Vec::new(),
            write_offset: 0,
            connected_since: now,
            last_activity: now,
        });
        Ok(id)
    }

    /// Queue `data` for every client and push out what the sockets accept.
    ///
    /// The bound applies to what is still unsent after the write attempt, so
    /// a flush larger than the bound reaches clients that can take it.
    /// Clients left over their bound or failing to write are disconnected;
    /// the returned errors describe the slow ones.
    pub fn broadcast(&mut self, data: &[u8]) -> Vec<BridgeError> {
        let mut slow = Vec::new();
        let mut failed = Vec::new();

        for client in &mut self.clients {
            client.outbound.extend_from_slice(data);
            if let Err(e) = client.drain_outbound() {
                debug!("Write to client {} failed: {}", client.id, e);
                failed.push(client.id);
                continue;
            }

            let backlog = client.backlog();
            if backlog > self.backlog_limit {
                slow.push(BridgeError::SlowClientBacklog {
                    client: client.id,
                    backlog,
                    limit: self.backlog_limit,
                });
            }
        }

        for err in &slow {
            if let BridgeError::SlowClientBacklog { client, .. } = err {
                warn!("{}", err);
                self.disconnect(*client, DisconnectReason::SlowClient);
            }
        }
        for id in failed {
            self.disconnect(id, DisconnectReason::WriteError);
        }
        slow
    }

    /// Retry pending writes on every client
    pub fn flush_pending(&mut self) {
        let mut failed = Vec::new();
        for client in &mut self.clients {
            if let Err(e) = client.drain_outbound() {
                debug!("Write to client {} failed: {}", client.id, e);
                failed.push(client.id);
            }
        }
        for id in failed {
            self.disconnect(id, DisconnectReason::WriteError);
        }
    }

    /// Read pending input from one client.
    ///
    /// EOF and read errors disconnect the client and report `Closed`.
    pub fn poll_readable(&mut self, id: ClientId, buf: &mut [u8], now: Instant) -> ReadOutcome {
        let Some(client) = self.clients.iter_mut().find(|c| c.id == id) else {
            return ReadOutcome::Closed;
        };

        match client.socket.try_read(buf) {
            Ok(ReadOutcome::Data(n)) => {
                client.last_activity = now;
                ReadOutcome::Data(n)
            }
            Ok(ReadOutcome::WouldBlock) => ReadOutcome::WouldBlock,
            Ok(ReadOutcome::Closed) => {
                self.disconnect(id, DisconnectReason::PeerClosed);
                ReadOutcome::Closed
            }
            Err(e) => {
                warn!("Error reading from client {}: {}", id, e);
                self.disconnect(id, DisconnectReason::ReadError);
                ReadOutcome::Closed
            }
        }
    }

    /// Close and forget a client. Returns false if it was already gone.
    pub fn disconnect(&mut self, id: ClientId, reason: DisconnectReason) -> bool {
        let Some(pos) = self.clients.iter().position(|c| c.id == id) else {
            return false;
        };

        let mut client = self.clients.remove(pos);
        client.socket.shutdown();
        self.disconnections += 1;
        if reason == DisconnectReason::SlowClient {
            self.slow_client_drops += 1;
        }

        info!(
            "Client {} ({}) disconnected: {}, connected for {:?}, {} bytes unsent",
            id,
            client.peer,
            reason,
            client.connected_since.elapsed(),
            client.backlog()
        );
        true
    }

    /// Disconnect every client, returning how many were dropped
    pub fn disconnect_all(&mut self, reason: DisconnectReason) -> usize {
        let ids = self.ids();
        for id in &ids {
            self.disconnect(*id, reason);
        }
        ids.len()
    }

    /// Disconnect clients with no inbound bytes for `timeout`
    pub fn drop_idle(&mut self, now: Instant, timeout: Duration) -> usize {
        let idle: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|c| now.saturating_duration_since(c.last_activity) >= timeout)
            .map(|c| c.id)
            .collect();
        for id in &idle {
            self.disconnect(*id, DisconnectReason::Idle);
        }
        idle.len()
    }

    /// Ids of connected clients, in accept order
    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|c| c.id).collect()
    }

    /// Look up a client
    pub fn get(&self, id: ClientId) -> Option<&Client<C>> {
        self.clients.iter().find(|c| c.id == id)
    }

    /// Iterate over connected clients
    pub fn iter(&self) -> impl Iterator<Item = &Client<C>> {
        self.clients.iter()
    }

    /// Number of connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if no client is connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Connection cap
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Clients accepted since start
    pub fn total_accepted(&self) -> u64 {
        self.total_accepted
    }

    /// Connections refused at the cap
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Clients disconnected for any reason
    pub fn disconnections(&self) -> u64 {
        self.disconnections
    }

    /// Clients dropped for exceeding the backlog bound
    pub fn slow_client_drops(&self) -> u64 {
        self.slow_client_drops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_link::mock::MockSocket;

    fn registry() -> ClientRegistry<MockSocket> {
        ClientRegistry::new(2, 16)
    }

    #[test]
    fn test_connection_limit() {
        let now = Instant::now();
        let mut registry = registry();
        registry.accept(MockSocket::new("a"), now).unwrap();
        registry.accept(MockSocket::new("b"), now).unwrap();

        let third = MockSocket::new("c");
        let err = registry.accept(third.clone(), now).unwrap_err();
        assert!(matches!(err, BridgeError::ConnectionLimitExceeded { limit: 2 }));
        assert!(third.is_shut_down());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.rejected(), 1);

        // Capacity frees up after a disconnect
        let first = registry.ids()[0];
        assert!(registry.disconnect(first, DisconnectReason::PeerClosed));
        assert!(registry.accept(MockSocket::new("d"), now).is_ok());
        assert_eq!(registry.total_accepted(), 3);
    }

    #[test]
    fn test_broadcast_reaches_every_client() {
        let now = Instant::now();
        let mut registry = registry();
        let a = MockSocket::new("a");
        let b = MockSocket::new("b");
        registry.accept(a.clone(), now).unwrap();
        registry.accept(b.clone(), now).unwrap();

        assert!(registry.broadcast(b"hello\r\n").is_empty());
        assert_eq!(a.take_output(), b"hello\r\n");
        assert_eq!(b.take_output(), b"hello\r\n");
    }

    #[test]
    fn test_slow_client_isolated() {
        let now = Instant::now();
        let mut registry = registry();
        let fast = MockSocket::new("fast");
        let slow = MockSocket::new("slow");
        registry.accept(fast.clone(), now).unwrap();
        let slow_id = registry.accept(slow.clone(), now).unwrap();
        slow.set_write_limit(Some(0));

        assert!(registry.broadcast(b"0123456789").is_empty());
        assert_eq!(registry.get(slow_id).unwrap().backlog(), 10);

        let errors = registry.broadcast(b"0123456789");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0],
            BridgeError::SlowClientBacklog { backlog: 20, limit: 16, .. }
        ));
        assert!(slow.is_shut_down());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.slow_client_drops(), 1);
        assert_eq!(fast.take_output(), b"01234567890123456789");
    }

    #[test]
    fn test_flush_larger_than_bound_reaches_fast_clients() {
        let now = Instant::now();
        let mut registry = registry();
        let a = MockSocket::new("a");
        let b = MockSocket::new("b");
        registry.accept(a.clone(), now).unwrap();
        registry.accept(b.clone(), now).unwrap();

        let line = [b'x'; 40];
        assert!(registry.broadcast(&line).is_empty());
        assert_eq!(registry.len(), 2);
        assert_eq!(a.take_output(), line);
        assert_eq!(b.take_output(), line);
    }

    #[test]
    fn test_partial_writes_resume() {
        let now = Instant::now();
        let mut registry = registry();
        let socket = MockSocket::new("a");
        let id = registry.accept(socket.clone(), now).unwrap();
        socket.set_write_limit(Some(0));

        registry.broadcast(b"abcdef");
        assert_eq!(registry.get(id).unwrap().backlog(), 6);

        socket.set_write_limit(Some(4));
        registry.flush_pending();
        assert_eq!(socket.take_output(), b"abcdef");
        assert_eq!(registry.get(id).unwrap().backlog(), 0);
    }

    #[test]
    fn test_poll_readable_eof_disconnects() {
        let now = Instant::now();
        let mut registry = registry();
        let socket = MockSocket::new("a");
        let id = registry.accept(socket.clone(), now).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(registry.poll_readable(id, &mut buf, now), ReadOutcome::WouldBlock);
        socket.push_input(b"hi");
        assert_eq!(registry.poll_readable(id, &mut buf, now), ReadOutcome::Data(2));

        socket.close_remote();
        assert_eq!(registry.poll_readable(id, &mut buf, now), ReadOutcome::Closed);
        assert!(registry.is_empty());
        assert_eq!(registry.disconnections(), 1);
    }

    #[test]
    fn test_write_error_disconnects_only_that_client() {
        let now = Instant::now();
        let mut registry = registry();
        let good = MockSocket::new("good");
        let bad = MockSocket::new("bad");
        registry.accept(good.clone(), now).unwrap();
        registry.accept(bad.clone(), now).unwrap();
        bad.fail_io(true);

        registry.broadcast(b"x");
        assert_eq!(registry.len(), 1);
        assert_eq!(good.take_output(), b"x");
    }

    #[test]
    fn test_drop_idle() {
        let t0 = Instant::now();
        let mut registry = registry();
        let quiet = MockSocket::new("quiet");
        let chatty = MockSocket::new("chatty");
        registry.accept(quiet.clone(), t0).unwrap();
        let chatty_id = registry.accept(chatty.clone(), t0).unwrap();

        chatty.push_input(b"x");
        let mut buf = [0u8; 4];
        registry.poll_readable(chatty_id, &mut buf, t0 + Duration::from_secs(5));

        assert_eq!(registry.drop_idle(t0 + Duration::from_secs(6), Duration::from_secs(6)), 1);
        assert!(quiet.is_shut_down());
        assert_eq!(registry.ids(), vec![chatty_id]);
    }
}
