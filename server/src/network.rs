//! Server session loop: accepts connections, drains incoming command frames
//! and flushes the outbound queue once per tick.

use log::{debug, info, warn};

use shared::codec;
use shared::observer::{Observers, SessionObserver};
use shared::queue::CommandQueue;
use shared::transport::{Driver, TransportError, TransportEvent};
use shared::{Command, PeerId, Target};

use crate::registry::ConnectionRegistry;

/// A queued command together with the single connection it is destined for.
/// Broadcasts are expanded before they reach the queue, so no sentinel id
/// ever reaches the codec or the transport.
#[derive(Debug, Clone)]
struct Outbound {
    command: Command,
    peer: PeerId,
}

/// Multi-connection server session.
///
/// The session is driven externally: the embedding application calls
/// [`tick`](Server::tick) once per frame or interval and everything —
/// accepting, event draining, dispatch, flushing — happens inside that call
/// on the caller's thread.
pub struct Server<D: Driver> {
    driver: D,
    registry: ConnectionRegistry,
    queue: CommandQueue<Outbound>,
    observers: Observers,
    listening: bool,
}

impl<D: Driver> Server<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            registry: ConnectionRegistry::new(0),
            queue: CommandQueue::new(),
            observers: Observers::new(),
            listening: false,
        }
    }

    /// Subscribes an observer to connect/disconnect notifications and
    /// received commands.
    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.subscribe(observer);
    }

    /// Binds the transport and starts accepting up to `max_clients`
    /// concurrent connections. Starting an already started server is a
    /// logged no-op.
    pub fn start(&mut self, port: u16, max_clients: usize) -> Result<(), TransportError> {
        if self.listening {
            warn!("Server already started");
            return Ok(());
        }

        info!("Starting server, port: {}", port);
        self.driver.listen(port)?;
        self.registry = ConnectionRegistry::new(max_clients);
        self.listening = true;
        info!("Server started successfully");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Ids of the currently live client connections.
    pub fn client_ids(&self) -> Vec<PeerId> {
        self.registry.ids()
    }

    /// Queues a command for one client or for every currently registered
    /// client. Broadcasts snapshot the live set at enqueue time; a target
    /// that has vanished by flush time is silently skipped.
    pub fn send_to_clients(&mut self, command: Command, target: Target) {
        if !self.listening {
            warn!("Can't send any commands, server not started");
            return;
        }

        match target {
            Target::Broadcast => {
                for peer in self.registry.ids() {
                    self.queue.enqueue(Outbound {
                        command: command.clone(),
                        peer,
                    });
                }
            }
            Target::Peer(peer) => self.queue.enqueue(Outbound { command, peer }),
        }
    }

    /// Runs one tick: transport bookkeeping, registry cleanup, new accepts,
    /// per-connection event draining and finally the queue flush.
    pub fn tick(&mut self) {
        if !self.listening {
            return;
        }

        self.driver.update();
        self.registry.cleanup();
        self.accept_new_connections();

        for peer in self.registry.ids() {
            while let Some(event) = self.driver.pop_event(peer) {
                match event {
                    TransportEvent::Connect => {
                        // Registration already happened on accept
                        debug!("Connection {} reported connect", peer);
                    }
                    TransportEvent::Data(frame) => self.dispatch(peer, &frame),
                    TransportEvent::Disconnect => {
                        // The notification carries the id captured before
                        // the handle is invalidated
                        let gone = peer;
                        self.registry.invalidate(peer);
                        info!("Client {} disconnected from server", gone);
                        self.observers.notify_disconnected(gone);
                    }
                }
            }
        }

        self.flush();
    }

    fn accept_new_connections(&mut self) {
        while let Some(peer) = self.driver.accept() {
            if self.registry.is_full() {
                warn!("Refusing client {}: server full", peer);
                self.driver.disconnect(peer);
                continue;
            }
            self.registry.insert(peer);
            info!("Client connected. ID: {}", peer);
            self.observers.notify_connected(peer);
        }
    }

    /// Decodes one received frame and reacts to it. A keep-alive is echoed
    /// back to its sender through the queue; every other kind is surfaced
    /// to the observers and otherwise ignored.
    fn dispatch(&mut self, peer: PeerId, frame: &[u8]) {
        match codec::decode(frame) {
            Ok(Some(command)) => {
                match &command {
                    Command::KeepAlive => {
                        debug!("Received KeepAlive from client {}", peer);
                        self.queue.enqueue(Outbound {
                            command: Command::KeepAlive,
                            peer,
                        });
                    }
                    Command::CustomMessage(text) => {
                        info!("Received CustomMessage from client {}. Message: {}", peer, text);
                    }
                    Command::Position(position) => {
                        info!("Received Position from client {}. Position: {}", peer, position);
                    }
                    Command::Orientation(orientation) => {
                        info!(
                            "Received Orientation from client {}. Orientation: {}",
                            peer, orientation
                        );
                    }
                }
                self.observers.notify_command(peer, &command);
            }
            Ok(None) => debug!("Ignoring unknown command from client {}", peer),
            Err(e) => debug!("Dropping malformed frame from client {}: {}", peer, e),
        }
    }

    fn flush(&mut self) {
        let Self {
            driver,
            registry,
            queue,
            ..
        } = self;

        queue.flush(|outbound| {
            if !registry.is_live(outbound.peer) {
                // The peer vanished between enqueue and flush
                debug!(
                    "Dropping {:?} for vanished client {}",
                    outbound.command.kind(),
                    outbound.peer
                );
                return;
            }

            match codec::encode(&outbound.command) {
                Ok(frame) => match driver.send(outbound.peer, &frame) {
                    Ok(()) => match &outbound.command {
                        Command::KeepAlive => {
                            debug!("Sending KeepAlive to client {}", outbound.peer);
                        }
                        Command::CustomMessage(text) => {
                            info!(
                                "Sending CustomMessage to client {}. Message: {}",
                                outbound.peer, text
                            );
                        }
                        Command::Position(position) => {
                            info!(
                                "Sending Position to client {}. Position: {}",
                                outbound.peer, position
                            );
                        }
                        Command::Orientation(orientation) => {
                            info!(
                                "Sending Orientation to client {}. Orientation: {}",
                                outbound.peer, orientation
                            );
                        }
                    },
                    Err(e) => warn!("Failed to send to client {}: {}", outbound.peer, e),
                },
                Err(e) => warn!(
                    "Failed to encode command for client {}: {}",
                    outbound.peer, e
                ),
            }
        });
    }
}
