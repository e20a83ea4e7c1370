//! # Message Framing
//!
//! `magic(4) | command(12, NUL padded) | length(4) | checksum(4) | payload`
//!
//! The checksum is the first four bytes of the payload's double-SHA256.

use shared_types::double_sha256;

use super::messages::Message;
use crate::error::ProtocolError;

/// Frame header length.
pub const HEADER_SIZE: usize = 24;

/// Largest payload accepted in one frame.
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

const COMMAND_SIZE: usize = 12;

/// Encodes and decodes frames for one network.
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    magic: u32,
}

impl FrameCodec {
    pub fn new(magic: u32) -> Self {
        Self { magic }
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    /// Frame `message` for the wire.
    pub fn encode(&self, message: &Message) -> Vec<u8> {
        let mut payload = Vec::new();
        message.encode_payload(&mut payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.magic.to_le_bytes());
        let mut command = [0u8; COMMAND_SIZE];
        let name = message.command().as_bytes();
        let len = name.len().min(COMMAND_SIZE);
        command[..len].copy_from_slice(&name[..len]);
        frame.extend_from_slice(&command);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&checksum(&payload));
        frame.extend_from_slice(&payload);
        frame
    }

    /// Take one complete frame off the front of `buffer`.
    ///
    /// Returns `Ok(None)` while the frame is still incomplete. Errors are
    /// fatal to the stream: the buffer is left as it was.
    pub fn decode(&self, buffer: &mut Vec<u8>) -> Result<Option<Message>, ProtocolError> {
        if buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let magic = u32::from_le_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]);
        if magic != self.magic {
            return Err(ProtocolError::BadMagic {
                expected: self.magic,
                actual: magic,
            });
        }

        let command_bytes = &buffer[4..4 + COMMAND_SIZE];
        let end = command_bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(COMMAND_SIZE);
        let command = String::from_utf8_lossy(&command_bytes[..end]).into_owned();

        let len = u32::from_le_bytes([buffer[16], buffer[17], buffer[18], buffer[19]]) as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPayload {
                len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if buffer.len() < HEADER_SIZE + len {
            return Ok(None);
        }

        let payload = &buffer[HEADER_SIZE..HEADER_SIZE + len];
        if checksum(payload) != buffer[20..24] {
            return Err(ProtocolError::BadChecksum { command });
        }

        let message =
            Message::decode(&command, payload).map_err(|source| ProtocolError::Decode {
                command: command.clone(),
                source,
            })?;
        buffer.drain(..HEADER_SIZE + len);
        Ok(Some(message))
    }
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = double_sha256(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}
