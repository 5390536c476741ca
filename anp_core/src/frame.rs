//! Meta-protocol transport framing
//!
//! Negotiation messages travel over any bidirectional transport inside a
//! minimal frame: one header octet whose two high bits carry the protocol
//! type and whose six low bits are reserved zero, followed by the payload.

use serde::{Deserialize, Serialize};

/// The protocol type carried by a frame, encoded in the two high bits of the
/// header octet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum ProtocolType {
    Meta = 0b00,
    Application = 0b01,
    NaturalLanguage = 0b10,
    Verification = 0b11,
}

impl TryFrom<u8> for ProtocolType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0b00 => Ok(ProtocolType::Meta),
            0b01 => Ok(ProtocolType::Application),
            0b10 => Ok(ProtocolType::NaturalLanguage),
            0b11 => Ok(ProtocolType::Verification),
            _ => Err(FrameError::InvalidHeader(value)),
        }
    }
}

/// Possible errors when decoding a protocol frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is empty")]
    Empty,

    #[error("invalid frame header {0:#010b}: reserved bits must be zero")]
    InvalidHeader(u8),
}

/// Encodes a payload into a frame with the given protocol type.
pub fn encode_frame(protocol: ProtocolType, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + payload.len());
    frame.push((protocol as u8) << 6);
    frame.extend_from_slice(payload);
    frame
}

/// Decodes a frame into its protocol type and payload.
/// Rejects empty input and headers with nonzero reserved bits.
pub fn decode_frame(frame: &[u8]) -> Result<(ProtocolType, &[u8]), FrameError> {
    let (header, payload) = frame.split_first().ok_or(FrameError::Empty)?;
    if header & 0b0011_1111 != 0 {
        return Err(FrameError::InvalidHeader(*header));
    }
    let protocol = ProtocolType::try_from(header >> 6)?;
    Ok((protocol, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_types() {
        let payload = b"{\"action\":\"protocolNegotiation\"}";
        for t in [
            ProtocolType::Meta,
            ProtocolType::Application,
            ProtocolType::NaturalLanguage,
            ProtocolType::Verification,
        ] {
            let frame = encode_frame(t, payload);
            let (back_t, back_p) = decode_frame(&frame).unwrap();
            assert_eq!(back_t, t);
            assert_eq!(back_p, payload);
        }
    }

    #[test]
    fn empty_payload_roundtrip() {
        let frame = encode_frame(ProtocolType::Meta, &[]);
        let (t, p) = decode_frame(&frame).unwrap();
        assert_eq!(t, ProtocolType::Meta);
        assert!(p.is_empty());
    }

    #[test]
    fn reserved_bits_are_rejected() {
        assert!(matches!(decode_frame(&[]), Err(FrameError::Empty)));
        assert!(matches!(
            decode_frame(&[0b0100_0001, 1, 2]),
            Err(FrameError::InvalidHeader(_))
        ));
    }
}
