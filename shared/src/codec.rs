//! Wire codec for the flat frame layout: a 4-byte little-endian kind tag
//! followed by the kind-specific payload. One frame corresponds to exactly
//! one transport datagram, so the frame length bounds the payload and text
//! messages need no explicit length prefix.

use std::fmt;
use std::str::Utf8Error;

use crate::command::{Command, CommandKind, Vec3};
use crate::MAX_FRAME_SIZE;

const TAG_SIZE: usize = 4;
const VEC3_SIZE: usize = 12;

/// Encoding failure. Oversized payloads are a caller error and are rejected
/// before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    FrameTooLarge { len: usize, max: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::FrameTooLarge { len, max } => {
                write!(f, "encoded frame would be {} bytes, maximum is {}", len, max)
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Decoding failure for a frame whose tag was recognized but whose payload
/// does not fit the kind. Unknown tags are not errors (see [`decode`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Truncated { len: usize },
    InvalidText(Utf8Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { len } => {
                write!(f, "frame of {} bytes is too short for its kind", len)
            }
            DecodeError::InvalidText(e) => write!(f, "message payload is not UTF-8: {}", e),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Serializes a command into a wire frame.
pub fn encode(command: &Command) -> Result<Vec<u8>, EncodeError> {
    let mut frame = Vec::with_capacity(TAG_SIZE + VEC3_SIZE);
    frame.extend_from_slice(&command.kind().tag().to_le_bytes());

    match command {
        Command::KeepAlive => {}
        Command::CustomMessage(text) => {
            let len = TAG_SIZE + text.len();
            if len > MAX_FRAME_SIZE {
                return Err(EncodeError::FrameTooLarge {
                    len,
                    max: MAX_FRAME_SIZE,
                });
            }
            frame.extend_from_slice(text.as_bytes());
        }
        Command::Position(v) | Command::Orientation(v) => {
            frame.extend_from_slice(&v.x.to_le_bytes());
            frame.extend_from_slice(&v.y.to_le_bytes());
            frame.extend_from_slice(&v.z.to_le_bytes());
        }
    }

    Ok(frame)
}

/// Deserializes a wire frame.
///
/// `Ok(None)` means the tag was not recognized; the caller is expected to
/// drop the frame silently to tolerate protocol version skew. A keep-alive
/// decodes to its unit payload regardless of trailing bytes.
pub fn decode(frame: &[u8]) -> Result<Option<Command>, DecodeError> {
    if frame.len() < TAG_SIZE {
        return Err(DecodeError::Truncated { len: frame.len() });
    }

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(&frame[..TAG_SIZE]);
    let tag = u32::from_le_bytes(tag_bytes);
    let payload = &frame[TAG_SIZE..];

    let command = match CommandKind::from_tag(tag) {
        None => return Ok(None),
        Some(CommandKind::KeepAlive) => Command::KeepAlive,
        Some(CommandKind::CustomMessage) => {
            let text = std::str::from_utf8(payload).map_err(DecodeError::InvalidText)?;
            Command::CustomMessage(text.to_owned())
        }
        Some(CommandKind::Position) => Command::Position(read_vec3(frame.len(), payload)?),
        Some(CommandKind::Orientation) => Command::Orientation(read_vec3(frame.len(), payload)?),
    };

    Ok(Some(command))
}

fn read_vec3(frame_len: usize, payload: &[u8]) -> Result<Vec3, DecodeError> {
    if payload.len() < VEC3_SIZE {
        return Err(DecodeError::Truncated { len: frame_len });
    }

    let mut components = [0.0f32; 3];
    for (i, component) in components.iter_mut().enumerate() {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&payload[i * 4..i * 4 + 4]);
        *component = f32::from_le_bytes(bytes);
    }

    Ok(Vec3::new(components[0], components[1], components[2]))
}
