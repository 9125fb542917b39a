//! RadioBuilder -- fluent builder for constructing [`Radio`] instances.
//!
//! Separates configuration from construction so that callers can set the
//! radio's address, log location, retry behaviour and recovery command
//! before any link is opened. Building never touches the network: links
//! open on the first command.
//!
//! # Example
//!
//! ```no_run
//! use rigbench_radio::builder::RadioBuilder;
//! use rigbench_radio::PowerLevel;
//! use std::time::Duration;
//!
//! # async fn example() -> rigbench_core::Result<()> {
//! let mut radio = RadioBuilder::new("192.168.128.1")
//!     .nickname("bench-left")
//!     .log_dir("/var/log/bench")
//!     .wait_before_retry(Duration::from_secs(5))
//!     .build()?;
//!
//! radio.enter_test_mode().await?;
//! radio.set_tx_power_level(PowerLevel::Low).await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use rigbench_core::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_WAIT_BEFORE_RETRY};
use rigbench_core::transport::Transport;
use rigbench_core::{DeviceLog, Error, Result};
use rigbench_transport::{
    FrameMode, SocketChannel, TcpTransport, TelnetChannel, TELNET_PORT, TELNET_TIMEOUT,
};

use crate::radio::{Radio, SentinelPolicy};
use crate::recovery::HostRecovery;

/// The radio's RCMP control port.
pub const DEFAULT_RCMP_PORT: u16 = 8002;

/// Connect timeout for the RCMP link.
pub const DEFAULT_RCMP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Address the radio takes on its USB network interface.
pub const DEFAULT_RADIO_IP: &str = "192.168.128.1";

/// Pause after a link opens before the first command.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Fluent builder for [`Radio`].
#[derive(Debug, Clone)]
pub struct RadioBuilder {
    ip: String,
    nickname: Option<String>,
    log_dir: Option<PathBuf>,
    rcmp_port: u16,
    rcmp_connect_timeout: Duration,
    telnet_timeout: Duration,
    settle_delay: Duration,
    max_attempts: u32,
    wait_before_retry: Duration,
    sentinel: SentinelPolicy,
    recovery: HostRecovery,
}

impl RadioBuilder {
    /// Create a builder for the radio at `ip`.
    pub fn new(ip: &str) -> Self {
        RadioBuilder {
            ip: ip.to_string(),
            nickname: None,
            log_dir: None,
            rcmp_port: DEFAULT_RCMP_PORT,
            rcmp_connect_timeout: DEFAULT_RCMP_CONNECT_TIMEOUT,
            telnet_timeout: TELNET_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_before_retry: DEFAULT_WAIT_BEFORE_RETRY,
            sentinel: SentinelPolicy::default(),
            recovery: HostRecovery::default(),
        }
    }

    /// Name used in log lines and as the log file stem instead of the IP.
    pub fn nickname(mut self, nickname: &str) -> Self {
        self.nickname = Some(nickname.to_string());
        self
    }

    /// Append log lines to `<dir>/<name>.txt`.
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Override the RCMP port (default: 8002).
    pub fn rcmp_port(mut self, port: u16) -> Self {
        self.rcmp_port = port;
        self
    }

    /// Set the RCMP connect timeout (default: 10 s).
    pub fn rcmp_connect_timeout(mut self, timeout: Duration) -> Self {
        self.rcmp_connect_timeout = timeout;
        self
    }

    /// Set the console connect and read timeout (default: 1 s).
    pub fn telnet_timeout(mut self, timeout: Duration) -> Self {
        self.telnet_timeout = timeout;
        self
    }

    /// Set the pause after a link opens (default: 100 ms).
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the number of attempts per command (default: 5).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the wait between attempts (default: 15 s).
    pub fn wait_before_retry(mut self, wait: Duration) -> Self {
        self.wait_before_retry = wait;
        self
    }

    /// Set how sentinel readings are repeated (default: 5 more, 10 s apart).
    pub fn sentinel_policy(mut self, policy: SentinelPolicy) -> Self {
        self.sentinel = policy;
        self
    }

    /// Set the last-resort recovery (default: cycle the `*Motorola*` PnP
    /// device through PowerShell).
    pub fn recovery(mut self, recovery: HostRecovery) -> Self {
        self.recovery = recovery;
        self
    }

    /// Build a [`Radio`] with caller-provided transports.
    ///
    /// This is the entry point for testing (pass `MockTransport`s from
    /// `rigbench-test-harness`). `telnet` carries console text and `rcmp`
    /// carries RCMP frames.
    pub fn build_with_transports(
        self,
        telnet: Box<dyn Transport>,
        rcmp: Box<dyn Transport>,
    ) -> Result<Radio> {
        if self.ip.trim().is_empty() {
            return Err(Error::InvalidParameter("radio IP address is required".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidParameter(
                "max_attempts must be at least 1".into(),
            ));
        }

        let name = self.nickname.as_deref().unwrap_or(&self.ip);
        let mut log = DeviceLog::new("Radio", name);
        if let Some(dir) = &self.log_dir {
            log = log.with_log_dir(dir);
        }

        tracing::debug!(
            ip = %self.ip,
            name,
            rcmp_port = self.rcmp_port,
            max_attempts = self.max_attempts,
            "Building radio controller"
        );

        Ok(Radio::new(
            self.ip.clone(),
            self.nickname.clone(),
            log,
            TelnetChannel::new(telnet, self.telnet_timeout),
            SocketChannel::new(rcmp, FrameMode::Rcmp),
            self.recovery,
            self.settle_delay,
            self.max_attempts,
            self.wait_before_retry,
            self.sentinel,
        ))
    }

    /// Build a [`Radio`] that reaches the radio over TCP.
    pub fn build(self) -> Result<Radio> {
        let telnet = TcpTransport::new(&format!("{}:{TELNET_PORT}", self.ip), self.telnet_timeout);
        let rcmp = TcpTransport::new(
            &format!("{}:{}", self.ip, self.rcmp_port),
            self.rcmp_connect_timeout,
        );
        self.build_with_transports(Box::new(telnet), Box::new(rcmp))
    }
}

impl Default for RadioBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_RADIO_IP)
    }
}
