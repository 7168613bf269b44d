//! Capabilities advertised once after the handshake.
//!
//! Only the outer framing of the capability payload is understood: a `u16`
//! descriptor count, then per descriptor a `u32` length (including itself)
//! and a `u16` property code. Descriptor bodies are kept as opaque bytes and
//! the whole payload is retained verbatim.

use std::io::Cursor;

use serde::Serialize;

use super::property::Property;
use crate::protocol::{read_bytes, read_u16, read_u32};

/// Bytes of a descriptor taken up by its length and property code
const DESCRIPTOR_HEADER_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityDescriptor {
    pub property_code: u16,
    /// Undecoded remainder of the descriptor
    pub body: Vec<u8>,
}

impl CapabilityDescriptor {
    pub fn property(&self) -> Option<Property> {
        Property::from_code(self.property_code)
    }
}

/// Read-only capability list for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    descriptors: Vec<CapabilityDescriptor>,
    /// False when the payload did not match the descriptor framing
    complete: bool,
    #[serde(with = "hex_bytes")]
    raw: Vec<u8>,
}

impl CapabilitySet {
    /// Parse as many descriptors as the framing allows. Never fails: the
    /// raw payload is always retained.
    pub fn parse(payload: &[u8]) -> Self {
        let (descriptors, complete) = parse_descriptors(payload);
        Self {
            descriptors,
            complete,
            raw: payload.to_vec(),
        }
    }

    pub fn descriptors(&self) -> &[CapabilityDescriptor] {
        &self.descriptors
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn get(&self, property: Property) -> Option<&CapabilityDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.property_code == property.code())
    }
}

fn parse_descriptors(payload: &[u8]) -> (Vec<CapabilityDescriptor>, bool) {
    let len = payload.len();
    let mut cursor = Cursor::new(payload);
    let mut descriptors = Vec::new();

    let Ok(count) = read_u16(&mut cursor, len) else {
        return (descriptors, false);
    };
    for _ in 0..count {
        let Ok(descriptor_len) = read_u32(&mut cursor, len) else {
            return (descriptors, false);
        };
        let Some(body_len) = (descriptor_len as usize).checked_sub(DESCRIPTOR_HEADER_LEN) else {
            return (descriptors, false);
        };
        let Ok(property_code) = read_u16(&mut cursor, len) else {
            return (descriptors, false);
        };
        let Ok(body) = read_bytes(&mut cursor, body_len, len) else {
            return (descriptors, false);
        };
        descriptors.push(CapabilityDescriptor {
            property_code,
            body,
        });
    }
    (descriptors, true)
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(code: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = ((body.len() + DESCRIPTOR_HEADER_LEN) as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&code.to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_parse_descriptors() {
        let mut payload = vec![0x02, 0x00];
        payload.extend(descriptor(0xd02a, &[0x04, 0x00, 0x01]));
        payload.extend(descriptor(0x9999, &[]));

        let caps = CapabilitySet::parse(&payload);
        assert!(caps.is_complete());
        assert_eq!(caps.descriptors().len(), 2);
        assert_eq!(caps.get(Property::Iso).unwrap().body, vec![0x04, 0x00, 0x01]);
        assert_eq!(caps.descriptors()[1].property(), None);
        assert_eq!(caps.raw(), payload.as_slice());
    }

    #[test]
    fn test_unframed_payload_is_kept() {
        let payload = vec![0x05, 0x00, 0x02, 0x00, 0x00, 0x00, 0xff];
        let caps = CapabilitySet::parse(&payload);
        assert!(!caps.is_complete());
        assert!(caps.descriptors().is_empty());
        assert_eq!(caps.raw(), payload.as_slice());
    }

    #[test]
    fn test_serializes_raw_as_hex() {
        let caps = CapabilitySet::parse(&[0x00, 0x00, 0xab]);
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["raw"], "0000ab");
    }
}
