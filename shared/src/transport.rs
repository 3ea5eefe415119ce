//! The seam between the sessions and the datagram transport.
//!
//! The protocol core treats the transport as a black box that hands out
//! connection ids and a per-connection event stream. Everything here is
//! non-blocking: `update` advances internal bookkeeping, `pop_event` asks
//! "is there an event ready" and never waits. Any of these operations may
//! fail with a [`TransportError`]; callers log the failure and keep ticking
//! (best-effort datagram semantics). Disposal is the driver's `Drop`.

use std::fmt;
use std::net::SocketAddr;

use crate::command::PeerId;

/// One transport-level event for a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection finished establishing.
    Connect,
    /// One received datagram, i.e. one encoded command frame.
    Data(Vec<u8>),
    /// The connection is gone, remotely closed or timed out.
    Disconnect,
}

#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    NotStarted,
    AlreadyStarted,
    UnknownConnection(PeerId),
    FrameTooLarge { len: usize, max: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "transport I/O error: {}", e),
            TransportError::NotStarted => write!(f, "transport not started"),
            TransportError::AlreadyStarted => write!(f, "transport already started"),
            TransportError::UnknownConnection(id) => {
                write!(f, "no live connection with id {}", id)
            }
            TransportError::FrameTooLarge { len, max } => {
                write!(f, "frame of {} bytes exceeds transport maximum {}", len, max)
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Datagram transport collaborator.
///
/// A server-role driver is started with [`listen`](Driver::listen) and hands
/// out new connections through [`accept`](Driver::accept); a client-role
/// driver is started with [`connect`](Driver::connect) and reports the
/// outcome as a `Connect` (or `Disconnect`) event on the returned id.
pub trait Driver {
    /// Binds and starts accepting connections (server role). Port 0 asks
    /// the OS for an ephemeral port.
    fn listen(&mut self, port: u16) -> Result<(), TransportError>;

    /// Issues a connection attempt (client role) and returns the handle the
    /// eventual `Connect`/`Disconnect` event will arrive on.
    fn connect(&mut self, addr: SocketAddr) -> Result<PeerId, TransportError>;

    /// Advances internal bookkeeping: drains the socket, retries pending
    /// handshakes, expires dead peers. Called once at the top of every tick.
    fn update(&mut self);

    /// Pops one connection newly observed since the last call, if any.
    fn accept(&mut self) -> Option<PeerId>;

    /// Pops the next pending event for `peer`; `None` means no event ready.
    fn pop_event(&mut self, peer: PeerId) -> Option<TransportEvent>;

    /// Sends one frame as a single datagram. Best effort, no delivery
    /// guarantee.
    fn send(&mut self, peer: PeerId, frame: &[u8]) -> Result<(), TransportError>;

    /// Closes the connection and tells the remote side, best effort.
    fn disconnect(&mut self, peer: PeerId);
}
