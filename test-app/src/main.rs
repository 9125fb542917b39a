// rigbench -- CLI for driving the hardware on a radio test bench.
//
// Usage:
//   rigbench --radio-ip 192.168.128.1 radio test-mode
//   rigbench --radio-ip 192.168.128.1 radio tx-freq 450000000 --bandwidth 100
//   rigbench --config bench.toml radio battery --auth
//   rigbench --config bench.toml radio dac set 0x100
//   rigbench --config bench.toml pdu on
//   rigbench --config bench.toml relay off
//
// Set RUST_LOG=debug to see every transport step.

mod config;

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rigbench::power::{Pdu, PduBuilder, Relay, RelayBuilder};
use rigbench::radio::builder::DEFAULT_RADIO_IP;
use rigbench::radio::commands::{DEFAULT_BANDWIDTH, DEFAULT_DEVIATION};
use rigbench::radio::{HostRecovery, Radio, RadioBuilder};
use rigbench::DeviceLog;

use config::{BenchConfig, RadioSection};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// rigbench -- drives the radio, PDU and relay on a test bench.
#[derive(Parser)]
#[command(name = "rigbench", version, about)]
struct Cli {
    /// TOML file describing the bench's radio, PDU and relay.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Radio IP address. Overrides `[radio] ip` from the config file.
    #[arg(long)]
    radio_ip: Option<String>,

    /// Directory for per-device log files. Overrides `log_dir`.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Radio operations.
    Radio {
        #[command(subcommand)]
        action: RadioAction,
    },

    /// Switch every PDU outlet (needs a `[pdu]` section).
    Pdu {
        #[command(subcommand)]
        action: SwitchAction,
    },

    /// Switch every relay (needs a `[relay]` section).
    Relay {
        #[command(subcommand)]
        action: SwitchAction,
    },
}

#[derive(Subcommand)]
enum RadioAction {
    /// Set the transmit power: high, low, or a milli-dBm value.
    Power { level: String },

    /// Set the transmit frequency (in Hz).
    TxFreq {
        freq_hz: u64,

        #[arg(long, default_value_t = DEFAULT_BANDWIDTH)]
        bandwidth: u8,

        #[arg(long, default_value_t = DEFAULT_DEVIATION)]
        deviation: u8,
    },

    /// Set the receive frequency (in Hz).
    RxFreq {
        freq_hz: u64,

        #[arg(long, default_value_t = DEFAULT_BANDWIDTH)]
        bandwidth: u8,
    },

    /// Key the transmitter (with safety confirmation).
    Transmit {
        /// Transmit a carrier with the audio path muted.
        #[arg(long)]
        muted: bool,
    },

    /// Return to receive.
    Receive,

    /// Put the radio in test mode.
    TestMode,

    /// Reboot the radio.
    Reboot,

    /// Read the battery level.
    Battery {
        /// Also read the battery authentication status.
        #[arg(long)]
        auth: bool,
    },

    /// Reference oscillator DAC operations.
    Dac {
        #[command(subcommand)]
        action: DacAction,
    },
}

#[derive(Subcommand)]
enum DacAction {
    /// Read the DAC value.
    Get,
    /// Write the DAC value (0 to 0x7FF, decimal or 0x-prefixed hex).
    Set {
        #[arg(value_parser = parse_u16)]
        value: u16,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchAction {
    On,
    Off,
}

/// Parse "0x100" as hex and anything else as decimal.
fn parse_u16(s: &str) -> std::result::Result<u16, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).map_err(|e| format!("invalid hex value: {e}")),
        None => s.parse().map_err(|e| format!("invalid value: {e}")),
    }
}

/// Prompt the user for y/N confirmation. Returns true only if "y" or "Y" entered.
fn confirm(prompt: &str) -> bool {
    print!("{prompt}");
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim(), "y" | "Y")
}

// ---------------------------------------------------------------------------
// Bench wiring
// ---------------------------------------------------------------------------

/// Config file merged with command-line overrides.
struct Bench {
    radio: RadioSection,
    radio_configured: bool,
    log_dir: Option<PathBuf>,
    config: BenchConfig,
}

impl Bench {
    fn new(cli: &Cli, mut config: BenchConfig) -> Self {
        let radio_configured = config.radio.is_some() || cli.radio_ip.is_some();
        let mut radio = config.radio.take().unwrap_or_default();
        if let Some(ip) = &cli.radio_ip {
            radio.ip = Some(ip.clone());
        }
        let log_dir = cli.log_dir.clone().or_else(|| config.log_dir.clone());

        Bench {
            radio,
            radio_configured,
            log_dir,
            config,
        }
    }

    fn radio_ip(&self) -> &str {
        self.radio.ip.as_deref().unwrap_or(DEFAULT_RADIO_IP)
    }

    fn radio(&self) -> Result<Radio> {
        let mut builder = RadioBuilder::new(self.radio_ip());
        if let Some(nickname) = &self.radio.nickname {
            builder = builder.nickname(nickname);
        }
        if let Some(dir) = &self.log_dir {
            builder = builder.log_dir(dir);
        }
        if let Some(port) = self.radio.rcmp_port {
            builder = builder.rcmp_port(port);
        }
        if let Some(n) = self.radio.max_attempts {
            builder = builder.max_attempts(n);
        }
        if let Some(secs) = self.radio.wait_before_retry_secs {
            builder = builder.wait_before_retry(Duration::from_secs(secs));
        }
        if !self.radio.recovery {
            builder = builder.recovery(HostRecovery::disabled());
        }
        builder.build().context("building radio controller")
    }

    /// The log of the bench radio, which the serial devices write into.
    fn radio_logs(&self) -> Vec<DeviceLog> {
        if !self.radio_configured {
            return Vec::new();
        }
        let name = self.radio.nickname.as_deref().unwrap_or(self.radio_ip());
        let mut log = DeviceLog::new("Radio", name);
        if let Some(dir) = &self.log_dir {
            log = log.with_log_dir(dir);
        }
        vec![log]
    }

    fn pdu(&self) -> Result<Pdu> {
        let section = self
            .config
            .pdu
            .as_ref()
            .context("no [pdu] section in the bench config")?;
        let mut builder = PduBuilder::new(&section.port, &section.password)
            .num_outlets(section.num_outlets)
            .radio_logs(self.radio_logs());
        if let Some(username) = &section.username {
            builder = builder.username(username);
        }
        if let Some(baud) = section.baud_rate {
            builder = builder.baud_rate(baud);
        }
        builder.build().context("building PDU controller")
    }

    fn relay(&self) -> Result<Relay> {
        let section = self
            .config
            .relay
            .as_ref()
            .context("no [relay] section in the bench config")?;
        let mut builder = RelayBuilder::new(&section.port).radio_logs(self.radio_logs());
        if let Some(n) = section.num_switches {
            builder = builder.num_switches(n);
        }
        if let Some(baud) = section.baud_rate {
            builder = builder.baud_rate(baud);
        }
        builder.build().context("building relay controller")
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn run_radio(radio: &mut Radio, action: &RadioAction) -> Result<()> {
    match action {
        RadioAction::Power { level } => {
            let level = radio.parse_power_level(level)?;
            radio.set_tx_power_level(level).await?;
            println!("{}: power set to {level}", radio.name());
        }
        RadioAction::TxFreq {
            freq_hz,
            bandwidth,
            deviation,
        } => {
            radio.set_tx_freq_hz(*freq_hz, *bandwidth, *deviation).await?;
            println!("{}: TX frequency set to {freq_hz} Hz", radio.name());
        }
        RadioAction::RxFreq { freq_hz, bandwidth } => {
            radio.set_rx_freq_hz(*freq_hz, *bandwidth).await?;
            println!("{}: RX frequency set to {freq_hz} Hz", radio.name());
        }
        RadioAction::Transmit { muted } => {
            println!("WARNING: This will key the transmitter.");
            println!("Ensure an antenna or dummy load is connected.");
            if !confirm("Continue? [y/N] ") {
                println!("Aborted.");
                return Ok(());
            }
            if *muted {
                radio.transmit_muted().await?;
            } else {
                radio.transmit().await?;
            }
            println!("{}: transmitting", radio.name());
        }
        RadioAction::Receive => {
            radio.receive().await?;
            println!("{}: receiving", radio.name());
        }
        RadioAction::TestMode => {
            radio.enter_test_mode().await?;
            println!("{}: test mode", radio.name());
        }
        RadioAction::Reboot => {
            radio.reboot().await?;
            println!("{}: rebooting", radio.name());
        }
        RadioAction::Battery { auth: false } => {
            let level = radio.get_battery_level().await?;
            println!("Battery: {level}%");
        }
        RadioAction::Battery { auth: true } => {
            let (level, authenticated) = radio.get_battery_level_and_auth_status().await?;
            println!("Battery: {level}%");
            println!("Authenticated: {}", if authenticated { "yes" } else { "no" });
        }
        RadioAction::Dac {
            action: DacAction::Get,
        } => {
            let value = radio.get_ref_osc_dac_value().await?;
            println!("Ref osc DAC: 0x{value:03X} ({value})");
        }
        RadioAction::Dac {
            action: DacAction::Set { value },
        } => {
            radio.write_ref_osc_dac_value(*value).await?;
            println!("Ref osc DAC set to 0x{value:03X}");
        }
    }
    Ok(())
}

async fn run_pdu(pdu: &mut Pdu, action: SwitchAction) -> Result<()> {
    match action {
        SwitchAction::On => pdu.turn_outlets_on().await?,
        SwitchAction::Off => pdu.turn_outlets_off().await?,
    }
    println!("PDU outlets {:?}: {action:?}", pdu.outlets());
    Ok(())
}

async fn run_relay(relay: &mut Relay, action: SwitchAction) -> Result<()> {
    match action {
        SwitchAction::On => relay.turn_all_switches_on().await?,
        SwitchAction::Off => relay.turn_all_switches_off().await?,
    }
    println!("Relays {:?}: {action:?}", relay.switches());
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    let bench = Bench::new(&cli, config);

    match &cli.command {
        Command::Radio { action } => {
            let mut radio = bench.radio()?;
            let result = run_radio(&mut radio, action).await;
            radio.close_connections().await;
            result
        }
        Command::Pdu { action } => {
            let mut pdu = bench.pdu()?;
            let result = run_pdu(&mut pdu, *action).await;
            pdu.close_connections().await;
            result
        }
        Command::Relay { action } => {
            let mut relay = bench.relay()?;
            let result = run_relay(&mut relay, *action).await;
            relay.close_connections().await;
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rigbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tx_freq_defaults() {
        let cli = parse(&["radio", "tx-freq", "450000000"]);
        match cli.command {
            Command::Radio {
                action:
                    RadioAction::TxFreq {
                        freq_hz,
                        bandwidth,
                        deviation,
                    },
            } => {
                assert_eq!(freq_hz, 450_000_000);
                assert_eq!(bandwidth, 100);
                assert_eq!(deviation, 0);
            }
            _ => panic!("expected radio tx-freq"),
        }
    }

    #[test]
    fn dac_set_accepts_hex_and_decimal() {
        assert_eq!(parse_u16("0x100"), Ok(256));
        assert_eq!(parse_u16("256"), Ok(256));
        assert!(parse_u16("0xZZ").is_err());
        assert!(parse_u16("70000").is_err());
    }

    #[test]
    fn command_line_ip_overrides_config() {
        let cli = parse(&["--radio-ip", "10.9.9.9", "radio", "receive"]);
        let config = BenchConfig::from_toml_str("[radio]\nip = \"10.0.0.7\"\nnickname = \"left\"\n")
            .unwrap();
        let bench = Bench::new(&cli, config);
        assert_eq!(bench.radio_ip(), "10.9.9.9");
        assert_eq!(bench.radio_logs()[0].identifier(), "left");
    }

    #[test]
    fn serial_devices_print_plain_without_radio() {
        let cli = parse(&["relay", "on"]);
        let bench = Bench::new(&cli, BenchConfig::default());
        assert!(bench.radio_logs().is_empty());
        assert_eq!(bench.radio_ip(), DEFAULT_RADIO_IP);
        assert!(bench.relay().is_err());
    }

    #[test]
    fn log_dir_flag_wins() {
        let cli = parse(&["--log-dir", "/tmp/a", "pdu", "off"]);
        let config = BenchConfig::from_toml_str("log_dir = \"/tmp/b\"\n").unwrap();
        let bench = Bench::new(&cli, config);
        assert_eq!(bench.log_dir, Some(PathBuf::from("/tmp/a")));
    }
}
