//! In-Memory Mock Transports
//!
//! Handles are cheap clones sharing state, so a test keeps one copy while the
//! engine owns the other.

use crate::transport::{ClientSocket, ConnectionListener, ReadOutcome, SerialTransport};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::rc::Rc;

#[derive(Debug, Default)]
struct SerialState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    writes: Vec<Vec<u8>>,
    write_limit: Option<usize>,
    fail_reads: bool,
}

/// Mock serial port
#[derive(Debug, Clone, Default)]
pub struct MockSerial {
    state: Rc<RefCell<SerialState>>,
}

impl MockSerial {
    /// Create an idle mock port
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if they arrived on the wire
    pub fn push_input(&self, data: &[u8]) {
        self.state.borrow_mut().rx.extend(data);
    }

    /// Bytes not yet read by the bridge
    pub fn pending_input(&self) -> usize {
        self.state.borrow().rx.len()
    }

    /// Everything written so far, clearing the record
    pub fn take_output(&self) -> Vec<u8> {
        let mut state = self.state.borrow_mut();
        state.writes.clear();
        std::mem::take(&mut state.tx)
    }

    /// Each accepted write call, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.borrow().writes.clone()
    }

    /// Cap the bytes accepted per write call (`Some(0)` stalls the port)
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.state.borrow_mut().write_limit = limit;
    }

    /// Make every read fail with an I/O error
    pub fn fail_reads(&self, fail: bool) {
        self.state.borrow_mut().fail_reads = fail;
    }
}

impl SerialTransport for MockSerial {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.fail_reads {
            return Err(io::Error::new(ErrorKind::Other, "mock serial read failure"));
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        if n > 0 {
            state.tx.extend_from_slice(&data[..n]);
            state.writes.push(data[..n].to_vec());
        }
        Ok(n)
    }
}

#[derive(Debug, Default)]
struct SocketState {
    peer: String,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    write_limit: Option<usize>,
    remote_closed: bool,
    shut_down: bool,
    fail_io: bool,
}

/// Mock TCP client connection
#[derive(Debug, Clone)]
pub struct MockSocket {
    state: Rc<RefCell<SocketState>>,
}

impl MockSocket {
    /// Create a connected mock socket
    pub fn new(peer: &str) -> Self {
        Self {
            state: Rc::new(RefCell::new(SocketState {
                peer: peer.to_string(),
                ..Default::default()
            })),
        }
    }

    /// Queue bytes as if the remote client sent them
    pub fn push_input(&self, data: &[u8]) {
        self.state.borrow_mut().rx.extend(data);
    }

    /// Bytes delivered to the remote client, clearing the record
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().tx)
    }

    /// Cap the bytes accepted per write call (`Some(0)` models a client that never drains)
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.state.borrow_mut().write_limit = limit;
    }

    /// Simulate the remote end closing the connection
    pub fn close_remote(&self) {
        self.state.borrow_mut().remote_closed = true;
    }

    /// Make reads and writes fail with an I/O error
    pub fn fail_io(&self, fail: bool) {
        self.state.borrow_mut().fail_io = fail;
    }

    /// Whether the bridge has shut this socket down
    pub fn is_shut_down(&self) -> bool {
        self.state.borrow().shut_down
    }
}

impl ClientSocket for MockSocket {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        let mut state = self.state.borrow_mut();
        if state.fail_io {
            return Err(io::Error::new(ErrorKind::Other, "mock socket read failure"));
        }
        if state.shut_down {
            return Ok(ReadOutcome::Closed);
        }
        if state.rx.is_empty() {
            return Ok(if state.remote_closed {
                ReadOutcome::Closed
            } else {
                ReadOutcome::WouldBlock
            });
        }

        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(ReadOutcome::Data(n))
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if state.fail_io || state.shut_down || state.remote_closed {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "mock socket closed"));
        }
        let n = state.write_limit.map_or(data.len(), |limit| limit.min(data.len()));
        state.tx.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn peer(&self) -> String {
        self.state.borrow().peer.clone()
    }

    fn shutdown(&mut self) {
        self.state.borrow_mut().shut_down = true;
    }
}

/// Mock listener fed by [`MockListener::connect`]
#[derive(Debug, Clone, Default)]
pub struct MockListener {
    pending: Rc<RefCell<VecDeque<MockSocket>>>,
}

impl MockListener {
    /// Create a listener with no pending connections
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a new inbound connection and return the test's handle to it
    pub fn connect(&self, peer: &str) -> MockSocket {
        let socket = MockSocket::new(peer);
        self.pending.borrow_mut().push_back(socket.clone());
        socket
    }
}

impl ConnectionListener for MockListener {
    type Connection = MockSocket;

    fn try_accept(&mut self) -> io::Result<Option<MockSocket>> {
        Ok(self.pending.borrow_mut().pop_front())
    }
}
