//! Builders for [`Pdu`] and [`Relay`].
//!
//! Both builders pick the line settings of their device family from
//! [`SerialProfile`] and let the caller override the port name, baud rate,
//! retry behaviour and the radio logs the device should write into.
//!
//! # Example
//!
//! ```no_run
//! use rigbench_core::DeviceLog;
//! use rigbench_power::builder::{PduBuilder, RelayBuilder};
//!
//! # async fn example() -> rigbench_core::Result<()> {
//! let radio_log = DeviceLog::new("Radio", "bench-left");
//!
//! let mut pdu = PduBuilder::new("/dev/ttyUSB0", "s3cret")
//!     .num_outlets(8)
//!     .attach_log(radio_log.clone())
//!     .build()?;
//! pdu.turn_outlets_on().await?;
//!
//! let mut relay = RelayBuilder::new("/dev/ttyACM0").build()?;
//! relay.turn_all_switches_off().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rigbench_core::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_WAIT_BEFORE_RETRY};
use rigbench_core::transport::Transport;
use rigbench_core::{DeviceLog, Error, Result};
use rigbench_transport::{SerialChannel, SerialProfile, SerialTransport};

use crate::device::{SerialDevice, DEFAULT_SETTLE_DELAY};
use crate::pdu::Pdu;
use crate::relay::Relay;

/// Name the PDU uses in log lines.
pub const PDU_NAME: &str = "iBootPDU";

/// Name the relay board uses in log lines.
pub const RELAY_NAME: &str = "USBRelay";

pub const DEFAULT_PDU_USERNAME: &str = "admin";

pub const DEFAULT_NUM_SWITCHES: u8 = 4;

/// Settings shared by every serial device builder.
#[derive(Debug, Clone)]
struct SerialSettings {
    port: String,
    profile: SerialProfile,
    baud_rate: Option<u32>,
    logs: Vec<DeviceLog>,
    max_attempts: u32,
    wait_before_retry: Duration,
    settle_delay: Duration,
}

impl SerialSettings {
    fn new(port: &str, profile: SerialProfile) -> Self {
        SerialSettings {
            port: port.to_string(),
            profile,
            baud_rate: None,
            logs: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_before_retry: DEFAULT_WAIT_BEFORE_RETRY,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidParameter(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn transport(&self) -> Result<Box<dyn Transport>> {
        if self.port.trim().is_empty() {
            return Err(Error::InvalidParameter("serial port name is required".into()));
        }
        let mut config = self.profile.config();
        if let Some(baud) = self.baud_rate {
            config.baud_rate = baud;
        }
        Ok(Box::new(SerialTransport::new(&self.port, config)))
    }

    fn device(self, name: &str, transport: Box<dyn Transport>) -> SerialDevice {
        tracing::debug!(
            device = name,
            port = %self.port,
            max_attempts = self.max_attempts,
            "Building serial device"
        );
        let channel = SerialChannel::new(transport, self.profile.line_terminator())
            .with_write_timeout(self.profile.timeout());
        SerialDevice::new(name, channel, self.logs)
            .with_retry(self.max_attempts, self.wait_before_retry)
            .with_settle_delay(self.settle_delay)
    }
}

macro_rules! serial_setters {
    () => {
        /// Override the profile's baud rate.
        pub fn baud_rate(mut self, baud: u32) -> Self {
            self.serial.baud_rate = Some(baud);
            self
        }

        /// Also write log lines to `log`, typically a radio's log.
        pub fn attach_log(mut self, log: DeviceLog) -> Self {
            self.serial.logs.push(log);
            self
        }

        /// Write log lines to `logs` instead of printing them.
        pub fn radio_logs(mut self, logs: Vec<DeviceLog>) -> Self {
            self.serial.logs = logs;
            self
        }

        /// Set the number of attempts per command (default: 5).
        pub fn max_attempts(mut self, n: u32) -> Self {
            self.serial.max_attempts = n;
            self
        }

        /// Set the wait between attempts (default: 15 s).
        pub fn wait_before_retry(mut self, wait: Duration) -> Self {
            self.serial.wait_before_retry = wait;
            self
        }

        /// Set the pause after the port opens (default: 100 ms).
        pub fn settle_delay(mut self, delay: Duration) -> Self {
            self.serial.settle_delay = delay;
            self
        }
    };
}

/// Fluent builder for [`Pdu`].
#[derive(Debug, Clone)]
pub struct PduBuilder {
    serial: SerialSettings,
    username: String,
    password: String,
    num_outlets: Option<u8>,
}

impl PduBuilder {
    /// Create a builder for the PDU console on `port`.
    pub fn new(port: &str, password: &str) -> Self {
        PduBuilder {
            serial: SerialSettings::new(port, SerialProfile::Pdu),
            username: DEFAULT_PDU_USERNAME.to_string(),
            password: password.to_string(),
            num_outlets: None,
        }
    }

    /// Console username (default: `admin`).
    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    /// Number of outlets, numbered from 1. Required.
    pub fn num_outlets(mut self, n: u8) -> Self {
        self.num_outlets = Some(n);
        self
    }

    serial_setters!();

    /// Build a [`Pdu`] over a caller-provided transport.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Pdu> {
        self.serial.validate()?;
        let num_outlets = self
            .num_outlets
            .ok_or_else(|| Error::InvalidParameter("num_outlets is required".into()))?;
        let device = self.serial.device(PDU_NAME, transport);
        Ok(Pdu::new(device, self.username, self.password, num_outlets))
    }

    /// Build a [`Pdu`] on the configured serial port.
    pub fn build(self) -> Result<Pdu> {
        let transport = self.serial.transport()?;
        self.build_with_transport(transport)
    }
}

/// Fluent builder for [`Relay`].
#[derive(Debug, Clone)]
pub struct RelayBuilder {
    serial: SerialSettings,
    num_switches: u8,
}

impl RelayBuilder {
    /// Create a builder for the relay board on `port`.
    pub fn new(port: &str) -> Self {
        RelayBuilder {
            serial: SerialSettings::new(port, SerialProfile::Relay),
            num_switches: DEFAULT_NUM_SWITCHES,
        }
    }

    /// Highest switch number (default: 4).
    pub fn num_switches(mut self, n: u8) -> Self {
        self.num_switches = n;
        self
    }

    serial_setters!();

    /// Build a [`Relay`] over a caller-provided transport.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Relay> {
        self.serial.validate()?;
        let device = self.serial.device(RELAY_NAME, transport);
        Ok(Relay::new(device, self.num_switches))
    }

    /// Build a [`Relay`] on the configured serial port.
    pub fn build(self) -> Result<Relay> {
        let transport = self.serial.transport()?;
        self.build_with_transport(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigbench_test_harness::MockTransport;

    #[test]
    fn pdu_defaults() {
        let builder = PduBuilder::new("/dev/ttyUSB0", "pw");
        assert_eq!(builder.username, "admin");
        assert_eq!(builder.serial.profile, SerialProfile::Pdu);
        assert_eq!(builder.serial.max_attempts, 5);
        assert_eq!(builder.serial.wait_before_retry, Duration::from_secs(15));
        assert!(builder.serial.logs.is_empty());
    }

    #[test]
    fn pdu_requires_outlet_count() {
        let result = PduBuilder::new("/dev/ttyUSB0", "pw")
            .build_with_transport(Box::new(MockTransport::disconnected()));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let result = RelayBuilder::new("/dev/ttyACM0")
            .max_attempts(0)
            .build_with_transport(Box::new(MockTransport::disconnected()));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn empty_port_is_rejected() {
        let result = RelayBuilder::new("").build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn baud_rate_overrides_profile() {
        let builder = PduBuilder::new("/dev/ttyUSB0", "pw").baud_rate(9600);
        assert_eq!(builder.serial.baud_rate, Some(9600));
        assert!(builder.serial.transport().is_ok());
    }

    #[test]
    fn attached_logs_replace_plain_output() {
        let pdu = PduBuilder::new("/dev/ttyUSB0", "pw")
            .num_outlets(2)
            .attach_log(DeviceLog::new("Radio", "left"))
            .attach_log(DeviceLog::new("Radio", "right"))
            .build_with_transport(Box::new(MockTransport::disconnected()))
            .unwrap();
        let ids: Vec<&str> = pdu.device().logs().iter().map(|l| l.identifier()).collect();
        assert_eq!(ids, vec!["left", "right"]);
        assert_eq!(pdu.device().name(), "iBootPDU");
    }

    #[test]
    fn relay_without_logs_prints_plain() {
        let relay = RelayBuilder::new("/dev/ttyACM0")
            .build_with_transport(Box::new(MockTransport::disconnected()))
            .unwrap();
        assert_eq!(relay.device().logs()[0].identifier(), "USBRelay");
    }

    #[test]
    fn profile_timeout_reaches_the_channel() {
        let relay = RelayBuilder::new("/dev/ttyACM0")
            .build_with_transport(Box::new(MockTransport::disconnected()))
            .unwrap();
        assert_eq!(relay.device().channel().write_timeout(), Duration::from_secs(10));

        let pdu = PduBuilder::new("/dev/ttyUSB0", "pw")
            .num_outlets(1)
            .build_with_transport(Box::new(MockTransport::disconnected()))
            .unwrap();
        assert_eq!(pdu.device().channel().write_timeout(), Duration::from_secs(1));
    }
}
