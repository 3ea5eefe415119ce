//! Connect/disconnect notifications for external observers.
//!
//! Sessions never depend on a process-wide log singleton; anything that
//! wants to react to connection transitions or surfaced commands subscribes
//! an observer at construction time. Delivery is synchronous, within the
//! tick that detected the transition and before that tick's flush.

use crate::command::{Command, PeerId};

/// Receiver for session notifications. All methods default to no-ops so an
/// observer only implements what it cares about.
pub trait SessionObserver {
    /// A peer finished connecting.
    fn peer_connected(&mut self, _peer: PeerId) {}

    /// A peer disconnected, locally or remotely. Fired exactly once per
    /// transition, with the id the peer held while it was alive.
    fn peer_disconnected(&mut self, _peer: PeerId) {}

    /// A decoded command arrived from `peer`. Purely observational; the
    /// session has already done whatever the protocol requires.
    fn command_received(&mut self, _peer: PeerId, _command: &Command) {}
}

/// The set of subscribed observers. Each observer sees every transition
/// exactly once; delivery order among observers is unspecified.
#[derive(Default)]
pub struct Observers {
    observers: Vec<Box<dyn SessionObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn notify_connected(&mut self, peer: PeerId) {
        for observer in &mut self.observers {
            observer.peer_connected(peer);
        }
    }

    pub fn notify_disconnected(&mut self, peer: PeerId) {
        for observer in &mut self.observers {
            observer.peer_disconnected(peer);
        }
    }

    pub fn notify_command(&mut self, peer: PeerId, command: &Command) {
        for observer in &mut self.observers {
            observer.command_received(peer, command);
        }
    }
}
