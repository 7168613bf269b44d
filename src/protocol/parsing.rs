//! Binary encoding and decoding of control-channel messages.
//!
//! Every message shares one fixed little-endian prefix:
//!
//! ```text
//! +----------+----------+------------------+---------------------+
//! | Index    | Type     | Correlation id   | Payload             |
//! | (u16 LE) | (u16 LE) | (u32 LE)         | (fixed per type)    |
//! +----------+----------+------------------+---------------------+
//! ```
//!
//! Camera replies reuse the layout: a data packet (index 2) carries the
//! request's type code, and the final response (index 3) carries a status
//! code in the type slot.
//!
//! # Error Handling
//!
//! Decoding never panics on short or malformed input; it reports a
//! [`ParseError`]. Network failures and retries are not handled here.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::constants::*;
use super::message::Message;

/// Errors that can occur when encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Type code outside the known catalogue
    UnknownMessageType(u16),
    /// Not enough bytes available to complete parsing
    InsufficientData { needed: usize, available: usize },
    /// Payload size does not match the fixed size for its type
    PayloadLength {
        message_type: MessageType,
        expected: usize,
        actual: usize,
    },
    /// Data format doesn't match expected structure
    InvalidFormat(&'static str),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnknownMessageType(code) => {
                write!(f, "Unknown message type: 0x{:04x}", code)
            }
            ParseError::InsufficientData { needed, available } => write!(
                f,
                "Insufficient data: needed {} bytes, got {}",
                needed, available
            ),
            ParseError::PayloadLength {
                message_type,
                expected,
                actual,
            } => write!(
                f,
                "Payload for {} must be {} bytes, got {}",
                message_type, expected, actual
            ),
            ParseError::InvalidFormat(what) => write!(f, "Invalid data format: {}", what),
        }
    }
}

impl std::error::Error for ParseError {}

/// The fixed prefix of any inbound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub index: u16,
    /// Message type for requests and data packets, status for responses
    pub code: u16,
    /// Correlation id, present when the buffer is long enough to carry one
    pub id: Option<u32>,
}

impl Header {
    /// Resolve the type slot against the message catalogue.
    pub fn message_type(&self) -> Result<MessageType, ParseError> {
        MessageType::from_code(self.code).ok_or(ParseError::UnknownMessageType(self.code))
    }

    pub fn is_response(&self) -> bool {
        self.index == INDEX_RESPONSE
    }
}

/// Serialize a message into its exact on-wire layout.
pub fn encode(message: &Message) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(message.wire_len());
    // Writes into a Vec cannot fail.
    let _ = bytes.write_u16::<LittleEndian>(message.index());
    let _ = bytes.write_u16::<LittleEndian>(message.message_type().code());
    let _ = bytes.write_u32::<LittleEndian>(message.id());
    bytes.extend_from_slice(message.payload());
    bytes
}

/// Serialize a bare header, as used by the terminate packet.
pub fn encode_header(index: u16, message_type: MessageType) -> [u8; HEADER_LEN] {
    let mut bytes = [0u8; HEADER_LEN];
    bytes[..2].copy_from_slice(&index.to_le_bytes());
    bytes[2..].copy_from_slice(&message_type.code().to_le_bytes());
    bytes
}

/// Read the fixed prefix of an inbound buffer.
///
/// Requires at least the 4-byte `{index, type}` header; the id is decoded
/// when 8 or more bytes are present.
pub fn decode_header(data: &[u8]) -> Result<Header, ParseError> {
    let mut cursor = Cursor::new(data);
    let index = read_u16(&mut cursor, data.len())?;
    let code = read_u16(&mut cursor, data.len())?;
    let id = if data.len() >= PREFIX_LEN {
        Some(read_u32(&mut cursor, data.len())?)
    } else {
        None
    };
    Ok(Header { index, code, id })
}

/// Decode a complete message of a known type, validating its payload size.
pub fn decode(data: &[u8]) -> Result<Message, ParseError> {
    let header = decode_header(data)?;
    let message_type = header.message_type()?;
    let id = header.id.ok_or(ParseError::InsufficientData {
        needed: PREFIX_LEN,
        available: data.len(),
    })?;
    Message::new(header.index, message_type, id, data[PREFIX_LEN..].to_vec())
}

/// Report whether `data` is an affirmative final response to request `id`.
///
/// A short buffer, a non-response packet, a non-OK status or a different
/// correlation id all count as failure.
pub fn is_success(id: u32, data: &[u8]) -> bool {
    match decode_header(data) {
        Ok(Header {
            index: INDEX_RESPONSE,
            code: STATUS_OK,
            id: Some(reply_id),
        }) => reply_id == id,
        _ => false,
    }
}

/// Return the bytes after the 8-byte prefix of a data packet sent in
/// answer to request `id`.
pub fn data_payload(id: u32, data: &[u8]) -> Result<&[u8], ParseError> {
    let header = decode_header(data)?;
    if header.index != INDEX_DATA {
        return Err(ParseError::InvalidFormat("expected a data packet"));
    }
    match header.id {
        Some(reply_id) if reply_id == id => Ok(&data[PREFIX_LEN..]),
        Some(_) => Err(ParseError::InvalidFormat("data packet id mismatch")),
        None => Err(ParseError::InsufficientData {
            needed: PREFIX_LEN,
            available: data.len(),
        }),
    }
}

// Helpers for reading primitive types; `len` is only used for error context.

pub(crate) fn read_u16(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<u16, ParseError> {
    let needed = cursor.position() as usize + 2;
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|_| ParseError::InsufficientData {
            needed,
            available: len,
        })
}

pub(crate) fn read_u32(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<u32, ParseError> {
    let needed = cursor.position() as usize + 4;
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| ParseError::InsufficientData {
            needed,
            available: len,
        })
}

pub(crate) fn read_bytes(
    cursor: &mut Cursor<&[u8]>,
    count: usize,
    len: usize,
) -> Result<Vec<u8>, ParseError> {
    let needed = cursor.position() as usize + count;
    let mut bytes = vec![0u8; count];
    cursor
        .read_exact(&mut bytes)
        .map_err(|_| ParseError::InsufficientData {
            needed,
            available: len,
        })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::IdGenerator;
    use crate::protocol::message::build;

    fn response(index: u16, code: u16, id: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&index.to_le_bytes());
        bytes.extend_from_slice(&code.to_le_bytes());
        bytes.extend_from_slice(&id.to_le_bytes());
        bytes
    }

    #[test]
    fn test_encode_layout() {
        let message = Message::new(1, MessageType::Aperture, 0x0403_0201, vec![1, 0, 0, 0]).unwrap();
        let bytes = encode(&message);
        assert_eq!(
            bytes,
            vec![0x01, 0x00, 0x2d, 0x90, 0x01, 0x02, 0x03, 0x04, 0x01, 0x00, 0x00, 0x00]
        );
        assert_eq!(bytes.len(), message.wire_len());
    }

    #[test]
    fn test_header_recovers_every_type() {
        let mut ids = IdGenerator::starting_at(100);
        for message_type in MessageType::ALL {
            let message = build(&mut ids, message_type, &[]).unwrap();
            let header = decode_header(&encode(&message)).unwrap();
            assert_eq!(header.index, message.index());
            assert_eq!(header.message_type().unwrap(), message_type);
            assert_eq!(header.id, Some(message.id()));
        }
    }

    #[test]
    fn test_decode_full_message() {
        let message = Message::new(2, MessageType::TwoPart, 77, vec![0x2a, 0xd0, 0, 0]).unwrap();
        assert_eq!(decode(&encode(&message)).unwrap(), message);
    }

    #[test]
    fn test_decode_short_input() {
        assert_eq!(
            decode_header(&[0x01, 0x00, 0x2d]),
            Err(ParseError::InsufficientData {
                needed: 4,
                available: 3
            })
        );
        assert!(decode_header(&[]).is_err());
        assert!(decode(&[0x01, 0x00, 0x2d, 0x90, 0x01]).is_err());
    }

    #[test]
    fn test_decode_unknown_type_is_reported() {
        let bytes = response(1, 0xbeef, 5);
        let header = decode_header(&bytes).unwrap();
        assert_eq!(header.code, 0xbeef);
        assert_eq!(header.message_type(), Err(ParseError::UnknownMessageType(0xbeef)));
        assert_eq!(decode(&bytes), Err(ParseError::UnknownMessageType(0xbeef)));
    }

    #[test]
    fn test_decode_wrong_payload_length() {
        let mut bytes = response(1, MSG_SHUTTER, 5);
        bytes.extend_from_slice(&[0, 0]);
        assert!(matches!(
            decode(&bytes),
            Err(ParseError::PayloadLength { expected: 4, actual: 2, .. })
        ));
    }

    #[test]
    fn test_is_success() {
        assert!(is_success(7, &response(INDEX_RESPONSE, STATUS_OK, 7)));
        assert!(!is_success(7, &response(INDEX_RESPONSE, STATUS_OK, 8)));
        assert!(!is_success(7, &response(INDEX_RESPONSE, 0x2002, 7)));
        assert!(!is_success(7, &response(INDEX_DATA, STATUS_OK, 7)));
        assert!(!is_success(7, &[0x03, 0x00, 0x01, 0x20]));
        assert!(!is_success(7, &[]));
    }

    #[test]
    fn test_data_payload() {
        let mut bytes = response(INDEX_DATA, MSG_SINGLE_PART, 9);
        bytes.extend_from_slice(&[0xaa, 0xbb]);
        assert_eq!(data_payload(9, &bytes).unwrap(), &[0xaa, 0xbb]);
        assert!(data_payload(10, &bytes).is_err());
        assert!(data_payload(9, &response(INDEX_RESPONSE, STATUS_OK, 9)).is_err());
    }

    #[test]
    fn test_encode_terminate_header() {
        assert_eq!(
            encode_header(INDEX_TERMINATE, MessageType::Stop),
            [0x00, 0x00, 0x03, 0x10]
        );
    }
}
