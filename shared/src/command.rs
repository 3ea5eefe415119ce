//! Typed command model exchanged between the peers.

use std::fmt;

/// Connection identifier assigned by the transport.
pub type PeerId = i32;

/// Reserved id meaning "every currently registered connection".
pub const BROADCAST_ID: PeerId = -1;

/// Three-component float payload carried by position and orientation
/// commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A single protocol command. The payload shape is fully determined by the
/// variant; payloads never outlive the tick that produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Periodic liveness signal, no payload.
    KeepAlive,
    /// Free-form UTF-8 text.
    CustomMessage(String),
    Position(Vec3),
    /// Same wire layout as `Position`, distinct meaning.
    Orientation(Vec3),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::KeepAlive => CommandKind::KeepAlive,
            Command::CustomMessage(_) => CommandKind::CustomMessage,
            Command::Position(_) => CommandKind::Position,
            Command::Orientation(_) => CommandKind::Orientation,
        }
    }
}

/// Wire-level command kinds. The tag values are part of the protocol and
/// must match between peer implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    KeepAlive = 1,
    CustomMessage = 2,
    Position = 3,
    Orientation = 4,
}

impl CommandKind {
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Maps a wire tag back to a kind. Unknown tags return `None` so the
    /// caller can drop the frame without failing.
    pub fn from_tag(tag: u32) -> Option<CommandKind> {
        match tag {
            1 => Some(CommandKind::KeepAlive),
            2 => Some(CommandKind::CustomMessage),
            3 => Some(CommandKind::Position),
            4 => Some(CommandKind::Orientation),
            _ => None,
        }
    }
}

/// Where an outbound command is headed on the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Peer(PeerId),
    Broadcast,
}

impl Target {
    /// Interprets a raw id, honoring the reserved broadcast sentinel.
    pub fn from_raw(id: PeerId) -> Target {
        if id == BROADCAST_ID {
            Target::Broadcast
        } else {
            Target::Peer(id)
        }
    }
}
