//! Message values, correlation ids and multi-part sequencing.

use std::time::{SystemTime, UNIX_EPOCH};

use super::constants::*;
use super::parsing::ParseError;
use crate::error::{Error, Result};

/// One control-channel message.
///
/// The payload length always equals [`MessageType::payload_len`] for the
/// message's type; this is checked when the message is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    index: u16,
    message_type: MessageType,
    id: u32,
    payload: Vec<u8>,
}

impl Message {
    pub fn new(
        index: u16,
        message_type: MessageType,
        id: u32,
        payload: Vec<u8>,
    ) -> std::result::Result<Self, ParseError> {
        let expected = message_type.payload_len();
        if payload.len() != expected {
            return Err(ParseError::PayloadLength {
                message_type,
                expected,
                actual: payload.len(),
            });
        }
        Ok(Self {
            index,
            message_type,
            id,
            payload,
        })
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total encoded size: header, id and payload.
    pub fn wire_len(&self) -> usize {
        PREFIX_LEN + self.payload.len()
    }
}

/// Source of correlation ids for one session.
///
/// A wrapping counter seeded from the clock. Ids only need to be distinct
/// among outstanding exchanges, not unpredictable.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    next: u32,
}

impl IdGenerator {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos() ^ elapsed.as_secs() as u32)
            .unwrap_or(1);
        Self::starting_at(seed)
    }

    /// Deterministic generator whose first id is `seed`.
    pub fn starting_at(seed: u32) -> Self {
        Self { next: seed }
    }

    pub fn new_id(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Zero-pad `payload` to the fixed size for `message_type`.
fn padded(message_type: MessageType, payload: &[u8]) -> std::result::Result<Vec<u8>, ParseError> {
    let expected = message_type.payload_len();
    if payload.len() > expected {
        return Err(ParseError::PayloadLength {
            message_type,
            expected,
            actual: payload.len(),
        });
    }
    let mut bytes = payload.to_vec();
    bytes.resize(expected, 0);
    Ok(bytes)
}

/// Build a single-shot message: index 1 and a fresh id.
///
/// Shorter payloads are zero-padded; longer ones are rejected.
pub fn build(
    ids: &mut IdGenerator,
    message_type: MessageType,
    payload: &[u8],
) -> std::result::Result<Message, ParseError> {
    let payload = padded(message_type, payload)?;
    Message::new(INDEX_COMMAND, message_type, ids.new_id(), payload)
}

/// Build the next part of a two-part sequence.
///
/// The result shares `previous`'s id and carries `previous.index + 1`.
/// A predecessor of any other type is a sequencing error and is rejected
/// before anything reaches the wire.
pub fn build_followup(previous: &Message, payload: &[u8]) -> Result<Message> {
    if previous.message_type() != MessageType::TwoPart {
        return Err(Error::ProtocolSequenceViolation(format!(
            "follow-up requires a two_part predecessor, got {}",
            previous.message_type()
        )));
    }
    let Some(index) = previous.index().checked_add(1) else {
        return Err(Error::ProtocolSequenceViolation(format!(
            "two_part sequence {} has no index after {}",
            previous.id(),
            previous.index()
        )));
    };
    let payload = padded(MessageType::TwoPart, payload)?;
    Ok(Message::new(
        index,
        MessageType::TwoPart,
        previous.id(),
        payload,
    )?)
}
