//! Hex and text conversion helpers shared by the codecs and controllers.
//!
//! RCMP commands are written as hex-digit strings, the Telnet console
//! accepts raw hex payloads, and reply verification compares against the
//! hex rendering of a reply, so these conversions show up in every layer.

use crate::error::{Error, Result};

/// Format `value` as lowercase hex, zero-padded to `width` digits.
///
/// Values wider than `width` are not truncated.
///
/// # Example
///
/// ```
/// use rigbench_core::to_hex_str;
///
/// assert_eq!(to_hex_str(200_000, 8), "00030d40");
/// assert_eq!(to_hex_str(100, 2), "64");
/// ```
pub fn to_hex_str(value: u64, width: usize) -> String {
    format!("{value:0width$x}")
}

/// Decode a string of hex digit pairs into bytes.
///
/// Accepts upper- and lowercase digits. Odd-length input or any non-hex
/// character is a [`Error::Protocol`] error.
///
/// # Example
///
/// ```
/// use rigbench_core::decode_hex;
///
/// assert_eq!(decode_hex("000D").unwrap(), vec![0x00, 0x0d]);
/// assert!(decode_hex("abc").is_err());
/// ```
pub fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(Error::Protocol(format!(
            "odd number of hex digits in {hex:?}"
        )));
    }

    if let Some(bad) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(Error::Protocol(format!(
            "invalid hex digit {bad:?} in {hex:?}"
        )));
    }

    Ok(hex
        .as_bytes()
        .chunks(2)
        .map(|pair| (nibble(pair[0]) << 4) | nibble(pair[1]))
        .collect())
}

/// Value of one ASCII hex digit; callers have already validated it.
fn nibble(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// Render bytes as a lowercase hex string.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode bytes as ASCII, replacing every non-ASCII byte with U+FFFD.
pub fn ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                b as char
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect()
}
