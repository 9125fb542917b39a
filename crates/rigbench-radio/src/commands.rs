//! Radio command builders and reply decoders.
//!
//! RCMP commands are hex-digit strings handed to the RCMP codec; console
//! commands are plain text lines for the Telnet debug console. All functions
//! here are pure: they build strings or decode replies without any I/O.
//!
//! # RCMP opcodes
//!
//! | Command                 | Payload                                  |
//! |-------------------------|------------------------------------------|
//! | TX power high / low     | `000600` / `000603`                      |
//! | TX power (milli-dBm)    | `0006ff{4 hex}`                          |
//! | TX frequency            | `000b{8 hex freq/5}{2 hex bw}{2 hex dev}`|
//! | RX frequency            | `000a{8 hex freq/5}{2 hex bw}00`         |
//! | Transmit muted / normal | `000403` / `000402`                      |
//! | Receive                 | `000502`                                 |
//! | Enter test mode         | `000c`                                   |
//! | Reboot                  | `000d`                                   |
//! | Battery / auth status   | `041080`                                 |

use std::fmt;
use std::str::FromStr;

use rigbench_core::helpers::to_hex_str;
use rigbench_core::{Error, Result};

/// Frequencies are sent as a count of 5 Hz steps.
pub const FREQ_STEP_HZ: u64 = 5;

/// Bandwidth field used when the caller has no preference.
pub const DEFAULT_BANDWIDTH: u8 = 100;

/// Deviation field used when the caller has no preference.
pub const DEFAULT_DEVIATION: u8 = 0;

/// Battery byte meaning "not measured yet".
pub const BATTERY_SENTINEL: u8 = 255;

/// Offset of the battery percentage in the status reply.
const BATTERY_OFFSET: usize = 5;

/// Bit of the last status byte carrying battery authentication.
const AUTH_BIT: u8 = 4;

/// Reference oscillator register value meaning "not readable yet".
pub const DAC_SENTINEL: u16 = 0xFFFF;

/// Bits 0-10 of the reference oscillator register: the DAC value.
pub const DAC_VALUE_MASK: u16 = 0x07FF;

/// Bits 11-15 of the reference oscillator register, preserved on write.
pub const DAC_PREFIX_MASK: u16 = 0xF800;

/// Console command enabling the debugger commands.
pub const CMD_DEBUGGER: &str = "radiodebugger";

/// Console command reading the reference oscillator DAC register.
pub const CMD_READ_REF_OSC_DAC: &str = "SBLAST:SPI:RODINIA_CS:8C000000";

/// Marker preceding the register value in a console reply.
const DATA_MARKER: &str = "Data received:";

/// Transmit power setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerLevel {
    High,
    Low,
    /// Explicit output level in milli-dBm.
    MilliDbm(u16),
}

impl PowerLevel {
    /// A milli-dBm level, rejecting values outside 16 bits.
    pub fn milli_dbm(value: i64) -> Result<Self> {
        u16::try_from(value)
            .map(PowerLevel::MilliDbm)
            .map_err(|_| Error::InvalidParameter(format!("invalid power level: {value}")))
    }
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerLevel::High => write!(f, "high"),
            PowerLevel::Low => write!(f, "low"),
            PowerLevel::MilliDbm(v) => write!(f, "{v}"),
        }
    }
}

impl FromStr for PowerLevel {
    type Err = Error;

    /// Accepts `high`, `low` (any case) or an integer milli-dBm value.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("high") {
            return Ok(PowerLevel::High);
        }
        if s.eq_ignore_ascii_case("low") {
            return Ok(PowerLevel::Low);
        }
        s.parse::<i64>()
            .map_err(|_| Error::InvalidParameter(format!("invalid power level: {s}")))
            .and_then(PowerLevel::milli_dbm)
    }
}

// ---------------------------------------------------------------
// RCMP command builders
// ---------------------------------------------------------------

/// Build a "set transmit power" command.
pub fn cmd_set_power(level: PowerLevel) -> String {
    match level {
        PowerLevel::High => "000600".to_string(),
        PowerLevel::Low => "000603".to_string(),
        PowerLevel::MilliDbm(v) => format!("0006ff{}", to_hex_str(u64::from(v), 4)),
    }
}

/// Encode a frequency as an 8-hex-digit count of 5 Hz steps.
///
/// Remainders below 5 Hz are dropped.
fn freq_field(freq_hz: u64) -> Result<String> {
    let steps = freq_hz / FREQ_STEP_HZ;
    if steps > u64::from(u32::MAX) {
        return Err(Error::InvalidParameter(format!(
            "frequency out of range: {freq_hz} Hz"
        )));
    }
    Ok(to_hex_str(steps, 8))
}

/// Build a "set transmit frequency" command.
pub fn cmd_set_tx_freq(freq_hz: u64, bandwidth: u8, deviation: u8) -> Result<String> {
    Ok(format!(
        "000b{}{}{}",
        freq_field(freq_hz)?,
        to_hex_str(u64::from(bandwidth), 2),
        to_hex_str(u64::from(deviation), 2)
    ))
}

/// Build a "set receive frequency" command.
pub fn cmd_set_rx_freq(freq_hz: u64, bandwidth: u8) -> Result<String> {
    Ok(format!(
        "000a{}{}00",
        freq_field(freq_hz)?,
        to_hex_str(u64::from(bandwidth), 2)
    ))
}

pub fn cmd_transmit_muted() -> &'static str {
    "000403"
}

pub fn cmd_transmit() -> &'static str {
    "000402"
}

pub fn cmd_receive() -> &'static str {
    "000502"
}

pub fn cmd_enter_test_mode() -> &'static str {
    "000c"
}

pub fn cmd_reboot() -> &'static str {
    "000d"
}

/// Build the battery level / authentication status query.
pub fn cmd_battery_status() -> &'static str {
    "041080"
}

// ---------------------------------------------------------------
// Console command builders
// ---------------------------------------------------------------

/// Build the console command writing a full 16-bit register word.
pub fn cmd_write_ref_osc_dac(word: u16) -> String {
    format!("SBLAST:SPI:RODINIA_CS:0C00{}", to_hex_str(u64::from(word), 4))
}

// ---------------------------------------------------------------
// Reply decoders
// ---------------------------------------------------------------

/// Battery percentage from a status reply (payload byte 5).
pub fn parse_battery_level(reply: &[u8]) -> Result<u8> {
    reply.get(BATTERY_OFFSET).copied().ok_or_else(|| {
        Error::Protocol(format!(
            "battery status reply too short: {} bytes",
            reply.len()
        ))
    })
}

/// Battery authentication flag from a status reply (bit 4 of the last byte).
pub fn parse_auth_status(reply: &[u8]) -> Result<bool> {
    reply
        .last()
        .map(|b| (b >> AUTH_BIT) & 1 == 1)
        .ok_or_else(|| Error::Protocol("empty battery status reply".into()))
}

/// Extract the 16-bit register word from a console reply.
///
/// The value is the last four characters of the text following
/// `Data received:`, after trimming CR, LF and NUL.
pub fn parse_ref_osc_register(reply: &str) -> Result<u16> {
    let data = reply.split(DATA_MARKER).nth(1).ok_or_else(|| {
        Error::Protocol(format!("no '{DATA_MARKER}' in console reply: {reply:?}"))
    })?;
    let data = data.trim_matches(|c| matches!(c, '\r' | '\n' | '\0'));

    let chars: Vec<char> = data.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Protocol(format!(
            "invalid register value in console reply: {tail:?}"
        )));
    }

    u16::from_str_radix(&tail, 16)
        .map_err(|e| Error::Protocol(format!("invalid register value {tail:?}: {e}")))
}

/// Split a register word into `(value, prefix)`.
pub fn split_ref_osc_register(word: u16) -> (u16, u16) {
    (word & DAC_VALUE_MASK, word & DAC_PREFIX_MASK)
}
