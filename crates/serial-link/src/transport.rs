//! Transport Capabilities
//!
//! Every call here returns immediately: reads report what is available
//! right now, writes report how much was accepted.

use crate::error::LinkError;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use tracing::{debug, info};

/// Result of a non-blocking read from a client socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were read into the buffer
    Data(usize),
    /// Nothing available right now
    WouldBlock,
    /// Peer closed or reset the connection
    Closed,
}

/// Serial side of the bridge
pub trait SerialTransport {
    /// Read whatever is pending; `Ok(0)` when the line is idle
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as much as the port accepts without blocking
    fn try_write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Drop pending input, returning how many bytes were discarded
    fn discard_input(&mut self) -> io::Result<usize> {
        let mut scratch = [0u8; 128];
        let mut discarded = 0;
        loop {
            match self.try_read(&mut scratch)? {
                0 => return Ok(discarded),
                n => discarded += n,
            }
        }
    }
}

/// One connected TCP client
pub trait ClientSocket {
    /// Read pending bytes without blocking
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome>;

    /// Write without blocking; `Ok(0)` when the socket cannot take more yet
    fn try_write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Human readable peer identifier
    fn peer(&self) -> String;

    /// Close both directions
    fn shutdown(&mut self);
}

/// Source of new client connections
pub trait ConnectionListener {
    type Connection: ClientSocket;

    /// Accept one pending connection, if any
    fn try_accept(&mut self) -> io::Result<Option<Self::Connection>>;
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
    )
}

impl ClientSocket for TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<ReadOutcome> {
        match self.read(buf) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if is_transient(&e) => Ok(ReadOutcome::WouldBlock),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => Ok(ReadOutcome::Closed),
            Err(e) => Err(e),
        }
    }

    fn try_write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.write(data) {
            Ok(n) => Ok(n),
            Err(e) if is_transient(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn peer(&self) -> String {
        self.peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn shutdown(&mut self) {
        if let Err(e) = TcpStream::shutdown(self, Shutdown::Both) {
            debug!("Socket shutdown failed: {}", e);
        }
    }
}

impl ConnectionListener for TcpListener {
    type Connection = TcpStream;

    fn try_accept(&mut self) -> io::Result<Option<TcpStream>> {
        match self.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(true)?;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not disable Nagle for {}: {}", addr, e);
                }
                Ok(Some(stream))
            }
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Bind a non-blocking listener on all interfaces
pub fn bind_listener(port: u16) -> Result<TcpListener, LinkError> {
    let bind_err = |e: io::Error| LinkError::Bind {
        port,
        reason: e.to_string(),
    };

    let listener = TcpListener::bind(("0.0.0.0", port)).map_err(bind_err)?;
    listener.set_nonblocking(true).map_err(bind_err)?;

    info!("Listening for TCP clients on port {}", port);
    Ok(listener)
}
