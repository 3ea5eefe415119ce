//! UDP implementation of the transport [`Driver`].
//!
//! UDP itself has no connections, so the driver runs a minimal session layer
//! over raw datagrams: every datagram starts with a one-byte envelope kind
//! (connect request, accept, data, disconnect) and the driver keeps per-peer
//! state keyed by source address. The envelope byte is internal to the
//! transport; the command frames the sessions exchange are the datagram
//! payload and stay bit-exact.
//!
//! Connection establishment retries the connect request once a second for a
//! bounded number of attempts. Peers that stay silent longer than the idle
//! timeout are reported as disconnected, which is what the protocol's
//! keep-alive command exists to prevent on live-but-quiet links.

use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crate::command::PeerId;
use crate::transport::{Driver, TransportError, TransportEvent};
use crate::MAX_FRAME_SIZE;

const ENVELOPE_CONNECT: u8 = 1;
const ENVELOPE_ACCEPT: u8 = 2;
const ENVELOPE_DATA: u8 = 3;
const ENVELOPE_DISCONNECT: u8 = 4;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Default time of silence after which a peer counts as dead.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Peer {
    addr: SocketAddr,
    last_seen: Instant,
    events: VecDeque<TransportEvent>,
    closed: bool,
}

impl Peer {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            last_seen: Instant::now(),
            events: VecDeque::new(),
            closed: false,
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.events.push_back(TransportEvent::Disconnect);
    }
}

#[derive(Debug, Clone, Copy)]
enum Handshake {
    Connecting { attempts: u32, last_attempt: Instant },
    Established,
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Idle,
    Server,
    Client {
        server_addr: SocketAddr,
        handshake: Handshake,
    },
}

/// Non-blocking UDP datagram driver, usable in either role.
#[derive(Debug)]
pub struct UdpDriver {
    socket: Option<UdpSocket>,
    mode: Mode,
    peers: HashMap<PeerId, Peer>,
    by_addr: HashMap<SocketAddr, PeerId>,
    pending_accepts: VecDeque<PeerId>,
    next_id: PeerId,
    idle_timeout: Duration,
}

impl UdpDriver {
    pub fn new() -> Self {
        Self {
            socket: None,
            mode: Mode::Idle,
            peers: HashMap::new(),
            by_addr: HashMap::new(),
            pending_accepts: VecDeque::new(),
            next_id: 0,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Overrides the idle timeout after which a silent peer is reported
    /// as disconnected.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// The locally bound address, once listening or connecting.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn send_envelope(
        &self,
        addr: SocketAddr,
        kind: u8,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotStarted)?;
        let mut datagram = Vec::with_capacity(1 + payload.len());
        datagram.push(kind);
        datagram.extend_from_slice(payload);
        socket.send_to(&datagram, addr)?;
        Ok(())
    }

    fn handle_datagram(&mut self, datagram: &[u8], addr: SocketAddr) {
        if datagram.is_empty() {
            return;
        }
        let kind = datagram[0];
        let payload = &datagram[1..];

        match self.mode {
            Mode::Idle => {}
            Mode::Server => self.handle_server_datagram(kind, payload, addr),
            Mode::Client { server_addr, .. } => {
                self.handle_client_datagram(kind, payload, addr, server_addr)
            }
        }
    }

    fn handle_server_datagram(&mut self, kind: u8, payload: &[u8], addr: SocketAddr) {
        match kind {
            ENVELOPE_CONNECT => {
                if self.by_addr.contains_key(&addr) {
                    // Duplicate request, the accept datagram was likely lost
                    if let Err(e) = self.send_envelope(addr, ENVELOPE_ACCEPT, &[]) {
                        debug!("Failed to re-acknowledge {}: {}", addr, e);
                    }
                    return;
                }

                let id = self.next_id;
                self.next_id += 1;
                self.peers.insert(id, Peer::new(addr));
                self.by_addr.insert(addr, id);
                self.pending_accepts.push_back(id);
                debug!("Accepted connection {} from {}", id, addr);

                if let Err(e) = self.send_envelope(addr, ENVELOPE_ACCEPT, &[]) {
                    warn!("Failed to acknowledge connection from {}: {}", addr, e);
                }
            }
            ENVELOPE_DATA => match self.by_addr.get(&addr) {
                Some(&id) => {
                    if let Some(peer) = self.peers.get_mut(&id) {
                        peer.last_seen = Instant::now();
                        peer.events.push_back(TransportEvent::Data(payload.to_vec()));
                    }
                }
                None => debug!("Ignoring data from unknown address {}", addr),
            },
            ENVELOPE_DISCONNECT => {
                if let Some(id) = self.by_addr.remove(&addr) {
                    if let Some(peer) = self.peers.get_mut(&id) {
                        peer.close();
                    }
                }
            }
            _ => debug!("Ignoring unknown envelope {} from {}", kind, addr),
        }
    }

    fn handle_client_datagram(
        &mut self,
        kind: u8,
        payload: &[u8],
        addr: SocketAddr,
        server_addr: SocketAddr,
    ) {
        if addr != server_addr {
            debug!("Ignoring datagram from unexpected address {}", addr);
            return;
        }
        let Some(&id) = self.by_addr.get(&addr) else {
            return;
        };

        match kind {
            ENVELOPE_ACCEPT => {
                if let Mode::Client { handshake, .. } = &mut self.mode {
                    if matches!(handshake, Handshake::Connecting { .. }) {
                        *handshake = Handshake::Established;
                        if let Some(peer) = self.peers.get_mut(&id) {
                            peer.last_seen = Instant::now();
                            peer.events.push_back(TransportEvent::Connect);
                        }
                    }
                }
            }
            ENVELOPE_DATA => {
                if let Some(peer) = self.peers.get_mut(&id) {
                    peer.last_seen = Instant::now();
                    peer.events.push_back(TransportEvent::Data(payload.to_vec()));
                }
            }
            ENVELOPE_DISCONNECT => {
                self.by_addr.remove(&addr);
                if let Some(peer) = self.peers.get_mut(&id) {
                    peer.close();
                }
            }
            _ => debug!("Ignoring unknown envelope {} from server", kind),
        }
    }

    /// Retries an in-flight connect request, giving up after a bounded
    /// number of attempts.
    fn advance_handshake(&mut self) {
        let (server_addr, give_up) = match &mut self.mode {
            Mode::Client {
                server_addr,
                handshake: Handshake::Connecting {
                    attempts,
                    last_attempt,
                },
            } => {
                if last_attempt.elapsed() < CONNECT_RETRY_INTERVAL {
                    return;
                }
                if *attempts >= MAX_CONNECT_ATTEMPTS {
                    (*server_addr, true)
                } else {
                    *attempts += 1;
                    *last_attempt = Instant::now();
                    (*server_addr, false)
                }
            }
            _ => return,
        };

        if give_up {
            warn!("Gave up connecting to {}", server_addr);
            if let Some(id) = self.by_addr.remove(&server_addr) {
                if let Some(peer) = self.peers.get_mut(&id) {
                    peer.close();
                }
            }
            self.mode = Mode::Idle;
        } else if let Err(e) = self.send_envelope(server_addr, ENVELOPE_CONNECT, &[]) {
            warn!("Failed to resend connection request to {}: {}", server_addr, e);
        }
    }

    fn expire_idle_peers(&mut self) {
        // While connecting, liveness belongs to the handshake retry logic
        if let Mode::Client {
            handshake: Handshake::Connecting { .. },
            ..
        } = self.mode
        {
            return;
        }

        let now = Instant::now();
        let expired: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, peer)| {
                !peer.closed && now.duration_since(peer.last_seen) > self.idle_timeout
            })
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(peer) = self.peers.get_mut(&id) {
                debug!("Connection {} timed out after {:?} of silence", id, self.idle_timeout);
                let addr = peer.addr;
                peer.close();
                self.by_addr.remove(&addr);
            }
        }
    }
}

impl Default for UdpDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for UdpDriver {
    fn listen(&mut self, port: u16) -> Result<(), TransportError> {
        if self.socket.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;
        self.socket = Some(socket);
        self.mode = Mode::Server;
        Ok(())
    }

    fn connect(&mut self, addr: SocketAddr) -> Result<PeerId, TransportError> {
        if matches!(self.mode, Mode::Server) {
            return Err(TransportError::AlreadyStarted);
        }
        if self.socket.is_none() {
            let socket = UdpSocket::bind(("0.0.0.0", 0))?;
            socket.set_nonblocking(true)?;
            self.socket = Some(socket);
        }

        // A fresh attempt discards whatever an earlier connection left over
        self.peers.clear();
        self.by_addr.clear();
        self.pending_accepts.clear();

        let id = self.next_id;
        self.next_id += 1;
        self.peers.insert(id, Peer::new(addr));
        self.by_addr.insert(addr, id);
        self.mode = Mode::Client {
            server_addr: addr,
            handshake: Handshake::Connecting {
                attempts: 1,
                last_attempt: Instant::now(),
            },
        };
        self.send_envelope(addr, ENVELOPE_CONNECT, &[])?;
        Ok(id)
    }

    fn update(&mut self) {
        if self.socket.is_none() {
            return;
        }

        let mut buf = [0u8; MAX_FRAME_SIZE + 1];
        loop {
            let (len, addr) = {
                let Some(socket) = &self.socket else { return };
                match socket.recv_from(&mut buf) {
                    Ok(received) => received,
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        warn!("Error receiving datagram: {}", e);
                        break;
                    }
                }
            };
            self.handle_datagram(&buf[..len], addr);
        }

        self.advance_handshake();
        self.expire_idle_peers();
    }

    fn accept(&mut self) -> Option<PeerId> {
        self.pending_accepts.pop_front()
    }

    fn pop_event(&mut self, peer: PeerId) -> Option<TransportEvent> {
        let (event, done, addr) = {
            let entry = self.peers.get_mut(&peer)?;
            let event = entry.events.pop_front();
            (event, entry.closed && entry.events.is_empty(), entry.addr)
        };
        if done {
            self.peers.remove(&peer);
            self.by_addr.remove(&addr);
        }
        event
    }

    fn send(&mut self, peer: PeerId, frame: &[u8]) -> Result<(), TransportError> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                len: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let addr = match self.peers.get(&peer) {
            Some(entry) if !entry.closed => entry.addr,
            _ => return Err(TransportError::UnknownConnection(peer)),
        };
        self.send_envelope(addr, ENVELOPE_DATA, frame)
    }

    fn disconnect(&mut self, peer: PeerId) {
        let Some(entry) = self.peers.remove(&peer) else {
            return;
        };
        self.by_addr.remove(&entry.addr);
        if !entry.closed {
            if let Err(e) = self.send_envelope(entry.addr, ENVELOPE_DISCONNECT, &[]) {
                debug!("Failed to notify {} of disconnect: {}", entry.addr, e);
            }
        }
        if let Mode::Client { .. } = self.mode {
            self.mode = Mode::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// Pumps both drivers until `done` reports true or the retry limit is
    /// reached.
    fn pump<F: FnMut(&mut UdpDriver, &mut UdpDriver) -> bool>(
        server: &mut UdpDriver,
        client: &mut UdpDriver,
        mut done: F,
    ) -> bool {
        for _ in 0..200 {
            server.update();
            client.update();
            if done(server, client) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_connect_handshake() {
        let mut server = UdpDriver::new();
        server.listen(0).unwrap();
        let port = server.local_addr().unwrap().port();

        let mut client = UdpDriver::new();
        let conn = client.connect(loopback(port)).unwrap();

        let mut accepted = None;
        let mut connected = false;
        let ok = pump(&mut server, &mut client, |server, client| {
            if accepted.is_none() {
                accepted = server.accept();
            }
            if !connected {
                connected = matches!(client.pop_event(conn), Some(TransportEvent::Connect));
            }
            accepted.is_some() && connected
        });

        assert!(ok, "handshake did not complete");
    }

    #[test]
    fn test_data_roundtrip() {
        let mut server = UdpDriver::new();
        server.listen(0).unwrap();
        let port = server.local_addr().unwrap().port();

        let mut client = UdpDriver::new();
        let conn = client.connect(loopback(port)).unwrap();

        let mut server_side = None;
        pump(&mut server, &mut client, |server, client| {
            if server_side.is_none() {
                server_side = server.accept();
            }
            matches!(client.pop_event(conn), Some(TransportEvent::Connect))
        });
        let server_side = server_side.expect("server never accepted");

        client.send(conn, b"ping").unwrap();
        let mut received = None;
        pump(&mut server, &mut client, |server, _| {
            if let Some(TransportEvent::Data(frame)) = server.pop_event(server_side) {
                received = Some(frame);
            }
            received.is_some()
        });
        assert_eq!(received.as_deref(), Some(&b"ping"[..]));

        server.send(server_side, b"pong").unwrap();
        let mut echoed = None;
        pump(&mut server, &mut client, |_, client| {
            if let Some(TransportEvent::Data(frame)) = client.pop_event(conn) {
                echoed = Some(frame);
            }
            echoed.is_some()
        });
        assert_eq!(echoed.as_deref(), Some(&b"pong"[..]));
    }

    #[test]
    fn test_remote_disconnect_reaches_server() {
        let mut server = UdpDriver::new();
        server.listen(0).unwrap();
        let port = server.local_addr().unwrap().port();

        let mut client = UdpDriver::new();
        let conn = client.connect(loopback(port)).unwrap();

        let mut server_side = None;
        pump(&mut server, &mut client, |server, client| {
            if server_side.is_none() {
                server_side = server.accept();
            }
            matches!(client.pop_event(conn), Some(TransportEvent::Connect))
        });
        let server_side = server_side.expect("server never accepted");

        client.disconnect(conn);

        let mut disconnected = false;
        pump(&mut server, &mut client, |server, _| {
            disconnected = matches!(
                server.pop_event(server_side),
                Some(TransportEvent::Disconnect)
            );
            disconnected
        });
        assert!(disconnected);
        // Handle is gone once the disconnect has been drained
        assert!(server.pop_event(server_side).is_none());
    }

    #[test]
    fn test_idle_peer_times_out() {
        let mut server = UdpDriver::new().with_idle_timeout(Duration::from_millis(50));
        server.listen(0).unwrap();
        let port = server.local_addr().unwrap().port();

        let mut client = UdpDriver::new();
        let conn = client.connect(loopback(port)).unwrap();

        let mut server_side = None;
        pump(&mut server, &mut client, |server, client| {
            if server_side.is_none() {
                server_side = server.accept();
            }
            matches!(client.pop_event(conn), Some(TransportEvent::Connect))
        });
        let server_side = server_side.expect("server never accepted");

        // Client goes silent; the server should declare it dead
        thread::sleep(Duration::from_millis(80));
        server.update();
        assert_eq!(
            server.pop_event(server_side),
            Some(TransportEvent::Disconnect)
        );
    }

    #[test]
    fn test_send_to_unknown_connection_errors() {
        let mut server = UdpDriver::new();
        server.listen(0).unwrap();
        let result = server.send(99, b"anyone there");
        assert!(matches!(
            result,
            Err(TransportError::UnknownConnection(99))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut server = UdpDriver::new();
        server.listen(0).unwrap();
        let frame = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            server.send(0, &frame),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_double_listen_errors() {
        let mut server = UdpDriver::new();
        server.listen(0).unwrap();
        assert!(matches!(
            server.listen(0),
            Err(TransportError::AlreadyStarted)
        ));
    }
}
