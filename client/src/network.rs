//! Client session loop: a single connection to the server, driven one tick
//! at a time.

use log::{debug, info, warn};
use std::net::SocketAddr;
use std::time::Duration;

use shared::codec;
use shared::observer::{Observers, SessionObserver};
use shared::queue::CommandQueue;
use shared::transport::{Driver, TransportError, TransportEvent};
use shared::{Command, PeerId};

use crate::keepalive::KeepAliveTimer;

/// Where the client session currently stands. Disconnecting — locally or
/// remotely — returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Started,
    Connecting,
    Connected,
}

/// Single-connection client session.
///
/// Like the server, the session does nothing on its own: the embedding
/// application calls [`tick`](Client::tick) once per frame or interval.
/// Once connected, a keep-alive command is queued on a fixed interval so
/// the server can tell a quiet client from a dead one.
pub struct Client<D: Driver> {
    driver: D,
    state: ClientState,
    server_connection: Option<PeerId>,
    queue: CommandQueue<Command>,
    keep_alive: KeepAliveTimer,
    observers: Observers,
}

impl<D: Driver> Client<D> {
    pub fn new(driver: D, keep_alive_interval: Duration) -> Self {
        Self {
            driver,
            state: ClientState::Idle,
            server_connection: None,
            queue: CommandQueue::new(),
            keep_alive: KeepAliveTimer::new(keep_alive_interval),
            observers: Observers::new(),
        }
    }

    /// Subscribes an observer to connect/disconnect notifications and
    /// received commands.
    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// Readies the session for a connection attempt. Starting an already
    /// started client is a logged no-op.
    pub fn start(&mut self) {
        if self.state != ClientState::Idle {
            info!("Client driver already started");
            return;
        }
        info!("Starting client");
        self.state = ClientState::Started;
    }

    /// Issues a connection attempt. The outcome arrives as a Connect or
    /// Disconnect event on a later tick. On failure the session stays in
    /// its pre-connect state and the attempt can simply be retried.
    pub fn connect(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        match self.state {
            ClientState::Idle => {
                warn!("Can't connect, client not started");
                return Err(TransportError::NotStarted);
            }
            ClientState::Connecting | ClientState::Connected => {
                warn!("Already connected or connecting");
                return Ok(());
            }
            ClientState::Started => {}
        }

        info!("Connecting to server {}", addr);
        match self.driver.connect(addr) {
            Ok(connection) => {
                self.server_connection = Some(connection);
                self.state = ClientState::Connecting;
                Ok(())
            }
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                Err(e)
            }
        }
    }

    /// Disconnects locally. Converges on the same end state as a remotely
    /// detected disconnect: connection dropped, timer stopped, queue
    /// cleared, one Disconnected notification if a connection was up.
    pub fn disconnect(&mut self) {
        let Some(connection) = self.server_connection else {
            debug!("Not connected, nothing to disconnect");
            return;
        };
        let was_connected = self.state == ClientState::Connected;
        self.driver.disconnect(connection);
        self.teardown(connection, was_connected);
    }

    /// Queues a command for the server, to be sent with this tick's flush.
    pub fn send_to_server(&mut self, command: Command) {
        if self.state != ClientState::Connected {
            info!("Can't send any commands, not connected to server");
            return;
        }
        self.queue.enqueue(command);
    }

    /// Runs one tick: transport bookkeeping, event draining, keep-alive
    /// polling and the queue flush.
    pub fn tick(&mut self) {
        if matches!(self.state, ClientState::Idle | ClientState::Started) {
            return;
        }

        self.driver.update();

        let Some(connection) = self.server_connection else {
            return;
        };

        while let Some(event) = self.driver.pop_event(connection) {
            match event {
                TransportEvent::Connect => {
                    info!("Connected to the server");
                    self.state = ClientState::Connected;
                    self.keep_alive.start();
                    self.observers.notify_connected(connection);
                }
                TransportEvent::Data(frame) => self.handle_frame(connection, &frame),
                TransportEvent::Disconnect => {
                    let was_connected = self.state == ClientState::Connected;
                    self.teardown(connection, was_connected);
                    break;
                }
            }
        }

        if self.state == ClientState::Connected && self.keep_alive.poll() {
            self.queue.enqueue(Command::KeepAlive);
        }

        self.flush();
    }

    fn handle_frame(&mut self, connection: PeerId, frame: &[u8]) {
        match codec::decode(frame) {
            Ok(Some(command)) => {
                match &command {
                    Command::KeepAlive => debug!("Received KeepAlive from server"),
                    Command::CustomMessage(text) => {
                        info!("Received CustomMessage from server. Message: {}", text);
                    }
                    Command::Position(position) => {
                        info!("Received Position from server. Position: {}", position);
                    }
                    Command::Orientation(orientation) => {
                        info!("Received Orientation from server. Orientation: {}", orientation);
                    }
                }
                self.observers.notify_command(connection, &command);
            }
            Ok(None) => debug!("Ignoring unknown command from server"),
            Err(e) => debug!("Dropping malformed frame from server: {}", e),
        }
    }

    /// Single teardown path shared by local and remote disconnects.
    fn teardown(&mut self, connection: PeerId, was_connected: bool) {
        self.server_connection = None;
        self.state = ClientState::Idle;
        self.keep_alive.stop();
        self.queue.clear();
        if was_connected {
            self.observers.notify_disconnected(connection);
            info!("Disconnected from server");
        }
    }

    fn flush(&mut self) {
        let Some(connection) = self.server_connection else {
            return;
        };
        let Self { driver, queue, .. } = self;

        queue.flush(|command| match codec::encode(command) {
            Ok(frame) => match driver.send(connection, &frame) {
                Ok(()) => match command {
                    Command::KeepAlive => debug!("Sending KeepAlive"),
                    Command::CustomMessage(text) => {
                        info!("Sending CustomMessage. Message: {}", text);
                    }
                    Command::Position(position) => {
                        info!("Sending Position. Position: {}", position);
                    }
                    Command::Orientation(orientation) => {
                        info!("Sending Orientation. Orientation: {}", orientation);
                    }
                },
                Err(e) => warn!("Failed to send command: {}", e),
            },
            Err(e) => warn!("Skipping command that failed to encode: {}", e),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Vec3;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::rc::Rc;

    /// Scripted stand-in for the transport, mirrors the one in the server
    /// crate's session tests.
    #[derive(Default)]
    struct FakeState {
        events: HashMap<PeerId, VecDeque<TransportEvent>>,
        sent: Vec<(PeerId, Vec<u8>)>,
        dropped: Vec<PeerId>,
        refuse_connect: bool,
    }

    #[derive(Clone, Default)]
    struct FakeDriver {
        state: Rc<RefCell<FakeState>>,
    }

    impl FakeDriver {
        fn push_event(&self, peer: PeerId, event: TransportEvent) {
            self.state
                .borrow_mut()
                .events
                .entry(peer)
                .or_default()
                .push_back(event);
        }

        fn sent(&self) -> Vec<(PeerId, Vec<u8>)> {
            self.state.borrow().sent.clone()
        }

        fn dropped(&self) -> Vec<PeerId> {
            self.state.borrow().dropped.clone()
        }
    }

    impl Driver for FakeDriver {
        fn listen(&mut self, _port: u16) -> Result<(), TransportError> {
            Ok(())
        }

        fn connect(&mut self, _addr: SocketAddr) -> Result<PeerId, TransportError> {
            if self.state.borrow().refuse_connect {
                return Err(TransportError::NotStarted);
            }
            Ok(0)
        }

        fn update(&mut self) {}

        fn accept(&mut self) -> Option<PeerId> {
            None
        }

        fn pop_event(&mut self, peer: PeerId) -> Option<TransportEvent> {
            self.state
                .borrow_mut()
                .events
                .get_mut(&peer)
                .and_then(|queue| queue.pop_front())
        }

        fn send(&mut self, peer: PeerId, frame: &[u8]) -> Result<(), TransportError> {
            self.state.borrow_mut().sent.push((peer, frame.to_vec()));
            Ok(())
        }

        fn disconnect(&mut self, peer: PeerId) {
            self.state.borrow_mut().dropped.push(peer);
        }
    }

    #[derive(Default)]
    struct Recorded {
        connected: Vec<PeerId>,
        disconnected: Vec<PeerId>,
        commands: Vec<(PeerId, Command)>,
    }

    struct Recorder(Rc<RefCell<Recorded>>);

    impl SessionObserver for Recorder {
        fn peer_connected(&mut self, peer: PeerId) {
            self.0.borrow_mut().connected.push(peer);
        }

        fn peer_disconnected(&mut self, peer: PeerId) {
            self.0.borrow_mut().disconnected.push(peer);
        }

        fn command_received(&mut self, peer: PeerId, command: &Command) {
            self.0.borrow_mut().commands.push((peer, command.clone()));
        }
    }

    fn server_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn connected_client(
        interval: Duration,
    ) -> (Client<FakeDriver>, FakeDriver, Rc<RefCell<Recorded>>) {
        let driver = FakeDriver::default();
        let recorded = Rc::new(RefCell::new(Recorded::default()));
        let mut client = Client::new(driver.clone(), interval);
        client.subscribe(Box::new(Recorder(Rc::clone(&recorded))));
        client.start();
        client.connect(server_addr()).unwrap();
        driver.push_event(0, TransportEvent::Connect);
        client.tick();
        (client, driver, recorded)
    }

    #[test]
    fn test_connect_event_marks_connected_and_notifies() {
        let (client, _, recorded) = connected_client(Duration::from_secs(5));
        assert!(client.is_connected());
        assert_eq!(client.state(), ClientState::Connected);
        assert_eq!(recorded.borrow().connected, vec![0]);
    }

    #[test]
    fn test_connect_requires_start() {
        let driver = FakeDriver::default();
        let mut client = Client::new(driver, Duration::from_secs(5));
        assert!(client.connect(server_addr()).is_err());
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[test]
    fn test_failed_connect_leaves_started_state() {
        let driver = FakeDriver::default();
        driver.state.borrow_mut().refuse_connect = true;
        let mut client = Client::new(driver.clone(), Duration::from_secs(5));
        client.start();

        assert!(client.connect(server_addr()).is_err());
        assert_eq!(client.state(), ClientState::Started);

        // Safe to retry once the transport cooperates
        driver.state.borrow_mut().refuse_connect = false;
        assert!(client.connect(server_addr()).is_ok());
        assert_eq!(client.state(), ClientState::Connecting);
    }

    #[test]
    fn test_send_before_connected_is_refused() {
        let driver = FakeDriver::default();
        let mut client = Client::new(driver.clone(), Duration::from_secs(5));
        client.start();
        client.connect(server_addr()).unwrap();

        client.send_to_server(Command::CustomMessage("too early".to_string()));
        client.tick();

        assert!(driver.sent().is_empty());
    }

    #[test]
    fn test_queued_commands_flush_in_order() {
        let (mut client, driver, _) = connected_client(Duration::from_secs(5));

        client.send_to_server(Command::CustomMessage("first".to_string()));
        client.send_to_server(Command::Position(Vec3::new(1.0, 2.0, 3.0)));
        client.tick();

        let sent = driver.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            codec::decode(&sent[0].1).unwrap(),
            Some(Command::CustomMessage("first".to_string()))
        );
        assert_eq!(
            codec::decode(&sent[1].1).unwrap(),
            Some(Command::Position(Vec3::new(1.0, 2.0, 3.0)))
        );
    }

    #[test]
    fn test_keep_alive_fires_once_per_tick_when_due() {
        // Zero interval: due on every tick from the connect tick onwards
        let (mut client, driver, _) = connected_client(Duration::from_secs(0));
        assert_eq!(driver.sent().len(), 1);

        client.tick();
        let sent = driver.sent();
        assert_eq!(sent.len(), 2);
        for (_, frame) in &sent {
            assert_eq!(codec::decode(frame).unwrap(), Some(Command::KeepAlive));
        }
    }

    #[test]
    fn test_keep_alive_not_sent_before_connect() {
        let driver = FakeDriver::default();
        let mut client = Client::new(driver.clone(), Duration::from_secs(0));
        client.start();
        client.connect(server_addr()).unwrap();

        client.tick();
        client.tick();

        assert!(driver.sent().is_empty());
    }

    #[test]
    fn test_received_commands_are_surfaced() {
        let (mut client, driver, recorded) = connected_client(Duration::from_secs(5));

        let frame = codec::encode(&Command::Position(Vec3::new(4.0, 5.0, 6.0))).unwrap();
        driver.push_event(0, TransportEvent::Data(frame));
        driver.push_event(0, TransportEvent::Data(vec![250, 0, 0, 0]));
        client.tick();

        // The unknown tag is dropped, the position is surfaced
        assert_eq!(
            recorded.borrow().commands,
            vec![(0, Command::Position(Vec3::new(4.0, 5.0, 6.0)))]
        );
    }

    #[test]
    fn test_local_disconnect_converges() {
        let (mut client, driver, recorded) = connected_client(Duration::from_secs(0));
        let sent_before = driver.sent().len();

        client.disconnect();

        assert_eq!(client.state(), ClientState::Idle);
        assert!(!client.is_connected());
        assert_eq!(driver.dropped(), vec![0]);
        assert_eq!(recorded.borrow().disconnected, vec![0]);

        // The timer is stopped: further ticks send nothing
        client.tick();
        assert_eq!(driver.sent().len(), sent_before);
    }

    #[test]
    fn test_remote_disconnect_converges() {
        let (mut client, driver, recorded) = connected_client(Duration::from_secs(0));
        let sent_before = driver.sent().len();

        driver.push_event(0, TransportEvent::Disconnect);
        client.tick();

        assert_eq!(client.state(), ClientState::Idle);
        assert_eq!(recorded.borrow().disconnected, vec![0]);

        client.tick();
        assert_eq!(driver.sent().len(), sent_before);
        assert_eq!(recorded.borrow().disconnected, vec![0]);
    }

    #[test]
    fn test_disconnect_while_connecting_skips_notification() {
        let driver = FakeDriver::default();
        let recorded = Rc::new(RefCell::new(Recorded::default()));
        let mut client = Client::new(driver.clone(), Duration::from_secs(5));
        client.subscribe(Box::new(Recorder(Rc::clone(&recorded))));
        client.start();
        client.connect(server_addr()).unwrap();

        client.disconnect();

        assert_eq!(client.state(), ClientState::Idle);
        assert!(recorded.borrow().disconnected.is_empty());
    }

    #[test]
    fn test_double_disconnect_notifies_once() {
        let (mut client, _, recorded) = connected_client(Duration::from_secs(5));
        client.disconnect();
        client.disconnect();
        assert_eq!(recorded.borrow().disconnected, vec![0]);
    }

    #[test]
    fn test_teardown_drops_pending_commands() {
        let (mut client, driver, _) = connected_client(Duration::from_secs(5));

        client.send_to_server(Command::CustomMessage("never sent".to_string()));
        driver.push_event(0, TransportEvent::Disconnect);
        client.tick();

        assert!(driver.sent().is_empty());
    }

    #[test]
    fn test_double_start_is_a_no_op() {
        let driver = FakeDriver::default();
        let mut client = Client::new(driver, Duration::from_secs(5));
        client.start();
        client.start();
        assert_eq!(client.state(), ClientState::Started);
    }

    #[test]
    fn test_reconnect_after_disconnect() {
        let (mut client, driver, recorded) = connected_client(Duration::from_secs(5));
        client.disconnect();

        client.start();
        client.connect(server_addr()).unwrap();
        driver.push_event(0, TransportEvent::Connect);
        client.tick();

        assert!(client.is_connected());
        assert_eq!(recorded.borrow().connected, vec![0, 0]);
    }
}
