//! Minimal CoAP (RFC 7252) message codec.
//!
//! Covers exactly the subset the device-to-cloud protocol uses: version
//! 1 headers, the four message types, the Empty/GET/POST request codes
//! and 2.04/2.05 response codes, tokens up to 8 bytes, repeatable
//! Uri-Path options (with extended delta/length forms), and the 0xFF
//! payload marker. Unknown options are skipped on parse; unknown codes
//! are carried through opaquely.

use crate::error::CoapError;

/// CoAP protocol version
pub const COAP_VERSION: u8 = 1;

/// Payload marker byte
const PAYLOAD_MARKER: u8 = 0xFF;

/// Uri-Path option number
const OPTION_URI_PATH: u16 = 11;

/// Maximum token length
const MAX_TOKEN_LEN: usize = 8;

/// CoAP message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoapType {
    /// Requires acknowledgement
    Confirmable,
    /// Fire and forget
    NonConfirmable,
    /// Acknowledges a confirmable message
    Acknowledgement,
    /// Rejects a message
    Reset,
}

impl CoapType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }

    fn as_bits(self) -> u8 {
        match self {
            Self::Confirmable => 0,
            Self::NonConfirmable => 1,
            Self::Acknowledgement => 2,
            Self::Reset => 3,
        }
    }
}

/// CoAP message code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoapCode {
    /// 0.00, used by pings and empty ACKs
    Empty,
    /// 0.01
    Get,
    /// 0.02
    Post,
    /// 2.04
    Changed,
    /// 2.05
    Content,
    /// Any code this stack does not interpret
    Other(u8),
}

impl CoapCode {
    /// Decode from the raw code byte
    #[must_use]
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0x00 => Self::Empty,
            0x01 => Self::Get,
            0x02 => Self::Post,
            0x44 => Self::Changed,
            0x45 => Self::Content,
            other => Self::Other(other),
        }
    }

    /// Encode to the raw code byte
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Empty => 0x00,
            Self::Get => 0x01,
            Self::Post => 0x02,
            Self::Changed => 0x44,
            Self::Content => 0x45,
            Self::Other(raw) => raw,
        }
    }
}

/// A decoded (or to-be-encoded) CoAP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapPacket {
    /// Message type
    pub msg_type: CoapType,
    /// Message code
    pub code: CoapCode,
    /// Message id, big-endian on the wire
    pub message_id: u16,
    /// Token, 0–8 bytes
    pub token: Vec<u8>,
    /// Uri-Path segments in order
    pub uri_path: Vec<String>,
    /// Payload after the 0xFF marker
    pub payload: Vec<u8>,
}

impl CoapPacket {
    /// First Uri-Path segment, the dispatch key of this protocol.
    #[must_use]
    pub fn first_path_segment(&self) -> Option<&str> {
        self.uri_path.first().map(String::as_str)
    }

    /// Whether this is an empty acknowledgement (`code 0.00`, type ACK).
    #[must_use]
    pub fn is_empty_ack(&self) -> bool {
        self.msg_type == CoapType::Acknowledgement && self.code == CoapCode::Empty
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CoapError> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(CoapError::InvalidTokenLength(self.token.len() as u8));
        }

        let mut out = Vec::with_capacity(4 + self.token.len() + self.payload.len() + 16);
        out.push((COAP_VERSION << 6) | (self.msg_type.as_bits() << 4) | self.token.len() as u8);
        out.push(self.code.as_u8());
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token);

        let mut prev_number = 0u16;
        for segment in &self.uri_path {
            encode_option(&mut out, OPTION_URI_PATH - prev_number, segment.as_bytes());
            prev_number = OPTION_URI_PATH;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        Ok(out)
    }

    /// Parse wire bytes.
    pub fn parse(buf: &[u8]) -> Result<Self, CoapError> {
        if buf.len() < 4 {
            return Err(CoapError::TooShort(buf.len()));
        }

        let version = buf[0] >> 6;
        if version != COAP_VERSION {
            return Err(CoapError::InvalidVersion(version));
        }
        let msg_type = CoapType::from_bits(buf[0] >> 4);
        let tkl = (buf[0] & 0x0F) as usize;
        if tkl > MAX_TOKEN_LEN {
            return Err(CoapError::InvalidTokenLength(tkl as u8));
        }
        let code = CoapCode::from_u8(buf[1]);
        let message_id = u16::from_be_bytes([buf[2], buf[3]]);

        if buf.len() < 4 + tkl {
            return Err(CoapError::Truncated);
        }
        let token = buf[4..4 + tkl].to_vec();

        let mut uri_path = Vec::new();
        let mut payload = Vec::new();
        let mut pos = 4 + tkl;
        let mut number = 0u16;

        while pos < buf.len() {
            if buf[pos] == PAYLOAD_MARKER {
                if pos + 1 >= buf.len() {
                    // A marker with no payload is a format error
                    return Err(CoapError::Truncated);
                }
                payload = buf[pos + 1..].to_vec();
                break;
            }

            let header_pos = pos;
            let delta_nibble = buf[pos] >> 4;
            let len_nibble = (buf[pos] & 0x0F) as usize;
            pos += 1;

            let delta = decode_extended(buf, &mut pos, delta_nibble)
                .ok_or(CoapError::MalformedOption(header_pos))?;
            let length = decode_extended(buf, &mut pos, len_nibble as u8)
                .ok_or(CoapError::MalformedOption(header_pos))?;

            if pos + length as usize > buf.len() {
                return Err(CoapError::Truncated);
            }
            number = number
                .checked_add(delta)
                .ok_or(CoapError::MalformedOption(header_pos))?;
            let value = &buf[pos..pos + length as usize];
            pos += length as usize;

            if number == OPTION_URI_PATH {
                uri_path.push(String::from_utf8_lossy(value).into_owned());
            }
            // Other options are legal; this stack has no use for them
        }

        Ok(Self {
            msg_type,
            code,
            message_id,
            token,
            uri_path,
            payload,
        })
    }
}

/// Append one option with delta/length nibbles and extended forms.
fn encode_option(out: &mut Vec<u8>, delta: u16, value: &[u8]) {
    let (delta_nibble, delta_ext) = split_extended(delta);
    let (len_nibble, len_ext) = split_extended(value.len() as u16);

    out.push((delta_nibble << 4) | len_nibble);
    out.extend_from_slice(&delta_ext);
    out.extend_from_slice(&len_ext);
    out.extend_from_slice(value);
}

/// Split a value into its header nibble and extended bytes.
fn split_extended(value: u16) -> (u8, Vec<u8>) {
    if value < 13 {
        (value as u8, Vec::new())
    } else if value < 269 {
        (13, vec![(value - 13) as u8])
    } else {
        (14, (value - 269).to_be_bytes().to_vec())
    }
}

/// Decode a nibble's extended form; `None` on the reserved nibble 15 or
/// a truncated buffer.
fn decode_extended(buf: &[u8], pos: &mut usize, nibble: u8) -> Option<u16> {
    match nibble {
        0..=12 => Some(u16::from(nibble)),
        13 => {
            let ext = *buf.get(*pos)?;
            *pos += 1;
            Some(u16::from(ext) + 13)
        }
        14 => {
            let hi = *buf.get(*pos)?;
            let lo = *buf.get(*pos + 1)?;
            *pos += 2;
            Some(u16::from_be_bytes([hi, lo]).checked_add(269)?)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: &CoapPacket) -> CoapPacket {
        CoapPacket::parse(&packet.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_ping_roundtrip() {
        let ping = CoapPacket {
            msg_type: CoapType::Confirmable,
            code: CoapCode::Empty,
            message_id: 0xBEEF,
            token: Vec::new(),
            uri_path: Vec::new(),
            payload: Vec::new(),
        };
        assert_eq!(roundtrip(&ping), ping);
        // Empty confirmable is the 4-byte minimum
        assert_eq!(ping.encode().unwrap().len(), 4);
    }

    #[test]
    fn test_post_event_roundtrip() {
        let packet = CoapPacket {
            msg_type: CoapType::Confirmable,
            code: CoapCode::Post,
            message_id: 1,
            token: vec![0xDE, 0xAD, 0xBE, 0xEF],
            uri_path: vec!["e".into(), "temperature".into()],
            payload: b"{\"value\":21}".to_vec(),
        };
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_long_segment_uses_extended_length() {
        let packet = CoapPacket {
            msg_type: CoapType::Confirmable,
            code: CoapCode::Post,
            message_id: 7,
            token: Vec::new(),
            uri_path: vec!["e".into(), "x".repeat(40)],
            payload: Vec::new(),
        };
        assert_eq!(roundtrip(&packet), packet);
    }

    #[test]
    fn test_response_token_echo() {
        let reply = CoapPacket {
            msg_type: CoapType::Acknowledgement,
            code: CoapCode::Content,
            message_id: 99,
            token: vec![0xAB],
            uri_path: Vec::new(),
            payload: vec![1, 2, 3, 4],
        };
        let parsed = roundtrip(&reply);
        assert_eq!(parsed.token, vec![0xAB]);
        assert_eq!(parsed.code, CoapCode::Content);
        assert!(!parsed.is_empty_ack());
    }

    #[test]
    fn test_empty_ack_detection() {
        let ack = CoapPacket {
            msg_type: CoapType::Acknowledgement,
            code: CoapCode::Empty,
            message_id: 5,
            token: Vec::new(),
            uri_path: Vec::new(),
            payload: Vec::new(),
        };
        assert!(ack.is_empty_ack());
        assert!(CoapPacket::parse(&ack.encode().unwrap()).unwrap().is_empty_ack());
    }

    #[test]
    fn test_first_path_segment() {
        let packet = CoapPacket {
            msg_type: CoapType::Confirmable,
            code: CoapCode::Get,
            message_id: 2,
            token: Vec::new(),
            uri_path: vec!["v".into(), "temperature".into()],
            payload: Vec::new(),
        };
        assert_eq!(packet.first_path_segment(), Some("v"));
    }

    #[test]
    fn test_parse_rejects_short_buffer() {
        assert!(matches!(
            CoapPacket::parse(&[0x40, 0x00]),
            Err(CoapError::TooShort(2))
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        assert!(matches!(
            CoapPacket::parse(&[0x80, 0x00, 0x00, 0x01]),
            Err(CoapError::InvalidVersion(2))
        ));
    }

    #[test]
    fn test_parse_rejects_marker_without_payload() {
        let mut wire = CoapPacket {
            msg_type: CoapType::Confirmable,
            code: CoapCode::Post,
            message_id: 1,
            token: Vec::new(),
            uri_path: Vec::new(),
            payload: Vec::new(),
        }
        .encode()
        .unwrap();
        wire.push(PAYLOAD_MARKER);

        assert!(matches!(CoapPacket::parse(&wire), Err(CoapError::Truncated)));
    }

    #[test]
    fn test_unknown_option_skipped() {
        // Hand-build: Uri-Path "h" followed by option 12 (Content-Format)
        let mut wire = vec![0x40, 0x02, 0x00, 0x01];
        wire.push(0xB1); // delta 11, len 1
        wire.push(b'h');
        wire.push(0x11); // delta 1 -> option 12, len 1
        wire.push(0x2A);

        let packet = CoapPacket::parse(&wire).unwrap();
        assert_eq!(packet.uri_path, vec!["h".to_string()]);
    }

    #[test]
    fn test_encode_rejects_long_token() {
        let packet = CoapPacket {
            msg_type: CoapType::Confirmable,
            code: CoapCode::Post,
            message_id: 0,
            token: vec![0u8; 9],
            uri_path: Vec::new(),
            payload: Vec::new(),
        };
        assert!(matches!(
            packet.encode(),
            Err(CoapError::InvalidTokenLength(9))
        ));
    }
}
