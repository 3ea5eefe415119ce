//! Protocol pieces shared by the client and server crates: the command
//! model, the wire codec, the outbound queue, the observer seam and the
//! datagram transport.

use std::time::Duration;

pub mod codec;
pub mod command;
pub mod observer;
pub mod queue;
pub mod transport;
pub mod udp;

pub use command::{Command, CommandKind, PeerId, Target, Vec3, BROADCAST_ID};

/// Largest encoded frame the protocol will put on the wire, tag included.
pub const MAX_FRAME_SIZE: usize = 256;

/// How often a connected client signals liveness unless configured otherwise.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);
