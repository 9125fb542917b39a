//! RCMP frame codec.
//!
//! RCMP is the radio's binary request/reply protocol on its TCP control
//! port. A frame is a 2-byte big-endian length header followed by that many
//! payload bytes:
//!
//! ```text
//! +--------+--------+-----------------------+
//! | len hi | len lo | payload (len bytes)   |
//! +--------+--------+-----------------------+
//! ```
//!
//! Commands are written as hex-digit strings (`"000502"`), so [`encode`]
//! takes hex text and [`decode`] returns raw payload bytes.
//!
//! # Example
//!
//! ```
//! use rigbench_transport::rcmp;
//!
//! let frame = rcmp::encode("000502").unwrap();
//! assert_eq!(frame, vec![0x00, 0x03, 0x00, 0x05, 0x02]);
//! assert_eq!(rcmp::decode(&frame).unwrap(), &[0x00, 0x05, 0x02]);
//! ```

use rigbench_core::error::{Error, Result};
use rigbench_core::helpers::decode_hex;

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = 2;

/// Largest chunk read for one reply.
pub const MAX_REPLY_LEN: usize = 4096;

/// Encode a hex-digit command string as an RCMP frame.
///
/// Invalid hex or a payload longer than `u16::MAX` bytes is a
/// [`Error::Protocol`] error.
pub fn encode(hex_payload: &str) -> Result<Vec<u8>> {
    let payload = decode_hex(hex_payload)?;
    let len = u16::try_from(payload.len()).map_err(|_| {
        Error::Protocol(format!(
            "RCMP payload too long: {} bytes",
            payload.len()
        ))
    })?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Strip the length header from the first chunk of a reply.
///
/// The header is not validated against the chunk length: the radio's reply
/// is read as a single chunk and everything after the header is payload.
/// A mismatch is logged at debug level.
pub fn decode(frame: &[u8]) -> Result<&[u8]> {
    if frame.len() < HEADER_LEN {
        return Err(Error::Protocol(format!(
            "short RCMP frame: {} bytes",
            frame.len()
        )));
    }

    let declared = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let payload = &frame[HEADER_LEN..];
    if declared != payload.len() {
        tracing::debug!(
            declared,
            received = payload.len(),
            "RCMP length header does not match received payload"
        );
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigbench_core::helpers::encode_hex;

    #[test]
    fn encode_prefixes_big_endian_length() {
        assert_eq!(encode("000c").unwrap(), vec![0x00, 0x02, 0x00, 0x0c]);
        assert_eq!(
            encode("000b00030d406400").unwrap(),
            vec![0x00, 0x08, 0x00, 0x0b, 0x00, 0x03, 0x0d, 0x40, 0x64, 0x00]
        );
    }

    #[test]
    fn encode_empty_payload() {
        assert_eq!(encode("").unwrap(), vec![0x00, 0x00]);
    }

    #[test]
    fn encode_long_payload_header() {
        let hex = "ab".repeat(300);
        let frame = encode(&hex).unwrap();
        assert_eq!(&frame[..2], &[0x01, 0x2c]);
        assert_eq!(frame.len(), 302);
    }

    #[test]
    fn encode_rejects_invalid_hex() {
        assert!(matches!(encode("00d"), Err(Error::Protocol(_))));
        assert!(matches!(encode("0g"), Err(Error::Protocol(_))));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let hex = "00".repeat(u16::MAX as usize + 1);
        assert!(matches!(encode(&hex), Err(Error::Protocol(_))));
    }

    #[test]
    fn decode_strips_exactly_two_bytes() {
        let reply = [0x00, 0x03, 0x04, 0x10, 0x80];
        assert_eq!(decode(&reply).unwrap(), &[0x04, 0x10, 0x80]);
    }

    #[test]
    fn decode_header_only() {
        assert!(decode(&[0x00, 0x00]).unwrap().is_empty());
    }

    #[test]
    fn decode_tolerates_length_mismatch() {
        assert_eq!(decode(&[0x00, 0x09, 0xaa]).unwrap(), &[0xaa]);
    }

    #[test]
    fn decode_rejects_short_frame() {
        assert!(matches!(decode(&[0x00]), Err(Error::Protocol(_))));
        assert!(matches!(decode(&[]), Err(Error::Protocol(_))));
    }

    #[test]
    fn round_trip_preserves_payload() {
        for hex in ["", "00", "000d", "041080", "0006ff1388", "deadbeef0102"] {
            let frame = encode(hex).unwrap();
            assert_eq!(encode_hex(decode(&frame).unwrap()), hex);
        }
    }
}
