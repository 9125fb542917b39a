//! Bench description file.
//!
//! An optional TOML file naming the radio, PDU and relay on one bench.
//! Command-line flags override the `[radio]` address and the log directory.
//!
//! ```toml
//! log_dir = "/var/log/bench"
//!
//! [radio]
//! ip = "192.168.128.1"
//! nickname = "left"
//!
//! [pdu]
//! port = "/dev/ttyUSB0"
//! password = "s3cret"
//! num_outlets = 8
//!
//! [relay]
//! port = "/dev/ttyACM0"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    pub log_dir: Option<PathBuf>,
    pub radio: Option<RadioSection>,
    pub pdu: Option<PduSection>,
    pub relay: Option<RelaySection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RadioSection {
    pub ip: Option<String>,
    pub nickname: Option<String>,
    pub rcmp_port: Option<u16>,
    pub max_attempts: Option<u32>,
    pub wait_before_retry_secs: Option<u64>,
    /// Cycle the radio's USB adapter before the last attempt.
    #[serde(default = "default_true")]
    pub recovery: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PduSection {
    pub port: String,
    pub username: Option<String>,
    pub password: String,
    pub num_outlets: u8,
    pub baud_rate: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelaySection {
    pub port: String,
    pub num_switches: Option<u8>,
    pub baud_rate: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Default for RadioSection {
    fn default() -> Self {
        RadioSection {
            ip: None,
            nickname: None,
            rcmp_port: None,
            max_attempts: None,
            wait_before_retry_secs: None,
            recovery: true,
        }
    }
}

impl BenchConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(BenchConfig::default());
        }
        toml::from_str(input).context("invalid bench config TOML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading bench config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config = BenchConfig::from_toml_str("  \n").unwrap();
        assert!(config.radio.is_none());
        assert!(config.pdu.is_none());
        assert!(config.relay.is_none());
    }

    #[test]
    fn full_bench() {
        let config = BenchConfig::from_toml_str(
            r#"
            log_dir = "/tmp/bench"

            [radio]
            ip = "10.0.0.7"
            nickname = "left"
            wait_before_retry_secs = 3
            recovery = false

            [pdu]
            port = "/dev/ttyUSB0"
            password = "s3cret"
            num_outlets = 8

            [relay]
            port = "/dev/ttyACM0"
            num_switches = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/bench")));
        let radio = config.radio.unwrap();
        assert_eq!(radio.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(radio.wait_before_retry_secs, Some(3));
        assert!(!radio.recovery);
        let pdu = config.pdu.unwrap();
        assert_eq!(pdu.num_outlets, 8);
        assert!(pdu.username.is_none());
        assert_eq!(config.relay.unwrap().num_switches, Some(2));
    }

    #[test]
    fn recovery_defaults_on() {
        let config = BenchConfig::from_toml_str("[radio]\nip = \"10.0.0.7\"\n").unwrap();
        assert!(config.radio.unwrap().recovery);
    }

    #[test]
    fn default_radio_section_keeps_recovery() {
        assert!(RadioSection::default().recovery);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(BenchConfig::from_toml_str("[radio]\nipaddr = \"10.0.0.7\"\n").is_err());
    }

    #[test]
    fn pdu_needs_password() {
        let result = BenchConfig::from_toml_str("[pdu]\nport = \"/dev/ttyUSB0\"\nnum_outlets = 4\n");
        assert!(result.is_err());
    }
}
