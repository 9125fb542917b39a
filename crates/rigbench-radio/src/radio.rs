//! Radio -- domain controller for a bench transceiver.
//!
//! A [`Radio`] talks to the transceiver over two links:
//!
//! - the RCMP control port (TCP 8002), used for power, frequency,
//!   transmit/receive, test mode, reboot and battery status;
//! - the Telnet debug console (TCP 23), used to read and write the
//!   reference oscillator DAC register.
//!
//! Both links open lazily on first use. Every command runs under a
//! [`RetryExecutor`]: a failed attempt reconnects the link it used, and the
//! final attempt is preceded by a host-level device re-enumeration
//! ([`HostRecovery`]).
//!
//! In-band "not ready" values (battery 255, register `FFFF`) are handled
//! separately by a [`SentinelPolicy`]: the reading is repeated after a pause
//! a bounded number of times.

use std::time::Duration;

use rigbench_core::retry::{BoxFuture, Invocation, RetryExecutor, RetryPolicy};
use rigbench_core::{DeviceLog, Error, Result};
use rigbench_transport::{rcmp, SocketChannel, TelnetChannel};

use crate::commands::{self, PowerLevel, BATTERY_SENTINEL, DAC_SENTINEL, DAC_VALUE_MASK};
use crate::recovery::HostRecovery;

/// Reply timeout for ordinary RCMP commands.
pub const DEFAULT_RCMP_TIMEOUT: Duration = Duration::from_secs(2);

/// Reply timeout for entering test mode, which re-initializes the radio.
pub const TEST_MODE_TIMEOUT: Duration = Duration::from_secs(20);

/// Bounded wait-and-retry for in-band sentinel readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelPolicy {
    /// Extra readings after the first one returned the sentinel.
    pub max_retries: u32,
    /// Pause before each extra reading.
    pub wait: Duration,
}

impl Default for SentinelPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            wait: Duration::from_secs(10),
        }
    }
}

/// The radio's links plus everything the retry hooks need.
///
/// Kept apart from [`Radio`] so the executor can borrow it mutably while
/// the radio's own settings stay readable.
struct Links {
    telnet: TelnetChannel,
    rcmp: SocketChannel,
    recovery: HostRecovery,
    log: DeviceLog,
    /// Pause after a link opens before the first command.
    settle: Duration,
}

impl Links {
    async fn connect_telnet(&mut self) -> Result<()> {
        if let Err(e) = self.telnet.connect().await {
            self.log.log(&format!("Error connecting via telnet: {e}"));
            return Err(e);
        }
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn connect_rcmp(&mut self) -> Result<()> {
        if let Err(e) = self.rcmp.connect().await {
            self.log.log(&format!("Error connecting via rcmp: {e}"));
            return Err(e);
        }
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn reconnect_telnet(&mut self) {
        if let Err(e) = self.telnet.disconnect().await {
            tracing::debug!(error = %e, "Ignoring error closing console link");
        }
        // A failure here surfaces on the next attempt.
        let _ = self.connect_telnet().await;
    }

    async fn reconnect_rcmp(&mut self) {
        if let Err(e) = self.rcmp.disconnect().await {
            tracing::debug!(error = %e, "Ignoring error closing RCMP link");
        }
        let _ = self.connect_rcmp().await;
    }

    async fn reconfigure(&mut self) {
        let errors = self.recovery.run(&self.log).await;
        if !errors.is_empty() {
            tracing::warn!(errors = %errors.trim_end(), "Host recovery reported errors");
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.telnet.disconnect().await {
            tracing::debug!(error = %e, "Ignoring error closing console link");
        }
        if let Err(e) = self.rcmp.disconnect().await {
            tracing::debug!(error = %e, "Ignoring error closing RCMP link");
        }
    }

    async fn send_telnet(&mut self, command: &str) -> Result<String> {
        if !self.telnet.is_connected() {
            self.connect_telnet().await?;
        }
        self.telnet.send_text(command).await
    }

    async fn send_rcmp(&mut self, command: &str, timeout: Duration) -> Result<Vec<u8>> {
        if !self.rcmp.is_connected() {
            self.connect_rcmp().await?;
        }
        let reply = self.rcmp.request_reply(command, None, timeout).await?;
        if reply.payload.is_empty() {
            return Err(Error::Protocol(format!(
                "no response when sending rcmp command '{command}'"
            )));
        }
        Ok(reply.payload)
    }
}

fn reconnect_telnet_fix(links: &mut Links) -> BoxFuture<'_, ()> {
    Box::pin(links.reconnect_telnet())
}

fn reconnect_rcmp_fix(links: &mut Links) -> BoxFuture<'_, ()> {
    Box::pin(links.reconnect_rcmp())
}

fn reconfigure_fix(links: &mut Links) -> BoxFuture<'_, ()> {
    Box::pin(links.reconfigure())
}

/// A bench radio controlled over RCMP and its debug console.
///
/// Constructed via [`RadioBuilder`](crate::builder::RadioBuilder).
pub struct Radio {
    ip: String,
    nickname: Option<String>,
    links: Links,
    executor: RetryExecutor,
    max_attempts: u32,
    wait_before_retry: Duration,
    sentinel: SentinelPolicy,
    /// Bits 11-15 of the reference oscillator register, from the last read.
    ref_osc_dac_prefix: Option<u16>,
}

impl Radio {
    /// Assemble a radio from its parts.
    ///
    /// Called by [`RadioBuilder`](crate::builder::RadioBuilder).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ip: String,
        nickname: Option<String>,
        log: DeviceLog,
        telnet: TelnetChannel,
        rcmp: SocketChannel,
        recovery: HostRecovery,
        settle: Duration,
        max_attempts: u32,
        wait_before_retry: Duration,
        sentinel: SentinelPolicy,
    ) -> Self {
        Radio {
            ip,
            nickname,
            executor: RetryExecutor::new(log.clone()),
            links: Links {
                telnet,
                rcmp,
                recovery,
                log,
                settle,
            },
            max_attempts,
            wait_before_retry,
            sentinel,
            ref_osc_dac_prefix: None,
        }
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Nickname if one was given, else the IP address.
    pub fn name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.ip)
    }

    /// This radio's log. Serial devices attached to the radio clone it to
    /// write into the same file.
    pub fn logger(&self) -> &DeviceLog {
        &self.links.log
    }

    /// Log a line to this radio's log.
    pub fn log(&self, text: &str) {
        self.links.log.log(text);
    }

    pub fn sentinel_policy(&self) -> SentinelPolicy {
        self.sentinel
    }

    /// The cached register prefix, if the DAC register has been read.
    pub fn ref_osc_dac_prefix(&self) -> Option<u16> {
        self.ref_osc_dac_prefix
    }

    pub fn is_telnet_connected(&self) -> bool {
        self.links.telnet.is_connected()
    }

    pub fn is_rcmp_connected(&self) -> bool {
        self.links.rcmp.is_connected()
    }

    fn policy(&self, potential_fix: rigbench_core::retry::Fix<Links>) -> RetryPolicy<Links> {
        RetryPolicy::new(self.max_attempts, self.wait_before_retry)
            .with_potential_fix(potential_fix)
            .with_last_resort_fix(reconfigure_fix)
    }

    // ---------------------------------------------------------------
    // Links
    // ---------------------------------------------------------------

    /// Close and reopen the console link. Errors are logged, not returned.
    pub async fn reconnect_telnet(&mut self) {
        self.links.reconnect_telnet().await;
    }

    /// Close and reopen the RCMP link. Errors are logged, not returned.
    pub async fn reconnect_rcmp(&mut self) {
        self.links.reconnect_rcmp().await;
    }

    /// Close both links. Safe to call repeatedly.
    pub async fn close_connections(&mut self) {
        self.links.close().await;
    }

    /// Send a console command with retry and return the console's reply.
    ///
    /// The command is sent CRLF-terminated. Non-ASCII commands are rejected
    /// before anything is sent.
    pub async fn send_telnet_command(&mut self, command: &str) -> Result<String> {
        if !command.is_ascii() {
            self.log(&format!("Invalid telnet command: {command:?}"));
            return Err(Error::InvalidParameter(format!(
                "console command is not ASCII: {command:?}"
            )));
        }
        let policy = self.policy(reconnect_telnet_fix);
        let call = Invocation::new("send_telnet_command", format!("({command:?},)"));
        let command = command.to_string();

        self.executor
            .execute(&policy, &call, &mut self.links, |links| {
                let command = command.clone();
                Box::pin(async move { links.send_telnet(&command).await })
            })
            .await
    }

    /// Send an RCMP command with retry and return the reply payload.
    ///
    /// An empty reply counts as a failed attempt. A command that is not
    /// valid hex is rejected before anything is sent.
    pub async fn send_rcmp_command(&mut self, command: &str, timeout: Duration) -> Result<Vec<u8>> {
        if let Err(e) = rcmp::encode(command) {
            self.log(&format!("Invalid rcmp command '{command}': {e}"));
            return Err(Error::InvalidParameter(format!(
                "rcmp command {command:?} is not a hex payload"
            )));
        }
        let policy = self.policy(reconnect_rcmp_fix);
        let call = Invocation::new("send_rcmp_command", format!("({command:?}, {timeout:?})"));
        let command = command.to_string();

        self.executor
            .execute(&policy, &call, &mut self.links, |links| {
                let command = command.clone();
                Box::pin(async move { links.send_rcmp(&command, timeout).await })
            })
            .await
    }

    async fn rcmp(&mut self, command: &str) -> Result<()> {
        self.send_rcmp_command(command, DEFAULT_RCMP_TIMEOUT)
            .await
            .map(|_| ())
    }

    // ---------------------------------------------------------------
    // Radio state
    // ---------------------------------------------------------------

    pub async fn enter_test_mode(&mut self) -> Result<()> {
        self.send_rcmp_command(commands::cmd_enter_test_mode(), TEST_MODE_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn set_tx_power_level(&mut self, level: PowerLevel) -> Result<()> {
        self.rcmp(&commands::cmd_set_power(level)).await
    }

    /// Parse a power level typed by a user, logging rejected input.
    pub fn parse_power_level(&self, text: &str) -> Result<PowerLevel> {
        text.parse().inspect_err(|_| {
            self.log(&format!("Invalid power level: {text}"));
        })
    }

    /// Set the transmit frequency.
    ///
    /// The frequency is sent in 5 Hz steps; anything below that is dropped.
    /// [`DEFAULT_BANDWIDTH`](commands::DEFAULT_BANDWIDTH) and
    /// [`DEFAULT_DEVIATION`](commands::DEFAULT_DEVIATION) are the usual
    /// values for the other fields.
    pub async fn set_tx_freq_hz(&mut self, freq_hz: u64, bandwidth: u8, deviation: u8) -> Result<()> {
        let cmd = commands::cmd_set_tx_freq(freq_hz, bandwidth, deviation)
            .inspect_err(|e| self.log(&e.to_string()))?;
        self.rcmp(&cmd).await
    }

    /// Set the receive frequency, in 5 Hz steps.
    pub async fn set_rx_freq_hz(&mut self, freq_hz: u64, bandwidth: u8) -> Result<()> {
        let cmd = commands::cmd_set_rx_freq(freq_hz, bandwidth)
            .inspect_err(|e| self.log(&e.to_string()))?;
        self.rcmp(&cmd).await
    }

    pub async fn transmit_muted(&mut self) -> Result<()> {
        self.rcmp(commands::cmd_transmit_muted()).await
    }

    pub async fn transmit(&mut self) -> Result<()> {
        self.rcmp(commands::cmd_transmit()).await
    }

    pub async fn receive(&mut self) -> Result<()> {
        self.rcmp(commands::cmd_receive()).await
    }

    /// Reboot the radio and drop both links.
    pub async fn reboot(&mut self) -> Result<()> {
        let result = self.rcmp(commands::cmd_reboot()).await;
        self.close_connections().await;
        result
    }

    // ---------------------------------------------------------------
    // Battery
    // ---------------------------------------------------------------

    async fn battery_status(&mut self) -> Result<Vec<u8>> {
        self.send_rcmp_command(commands::cmd_battery_status(), DEFAULT_RCMP_TIMEOUT)
            .await
    }

    /// Battery charge in percent.
    ///
    /// Returns 255 if the radio still reports "not measured" after every
    /// reading the [`SentinelPolicy`] allows.
    pub async fn get_battery_level(&mut self) -> Result<u8> {
        for attempt in 0..=self.sentinel.max_retries {
            let reply = self.battery_status().await?;
            let level = commands::parse_battery_level(&reply)?;
            if level != BATTERY_SENTINEL {
                return Ok(level);
            }
            if attempt < self.sentinel.max_retries {
                self.log("Reattempting get battery level");
                tokio::time::sleep(self.sentinel.wait).await;
            }
        }

        self.log(&format!(
            "Could not get battery level after {} attempts",
            self.sentinel.max_retries.saturating_add(1)
        ));
        Ok(BATTERY_SENTINEL)
    }

    /// Battery charge in percent and whether the battery authenticated.
    ///
    /// Returns `(255, false)` when the level never becomes valid.
    pub async fn get_battery_level_and_auth_status(&mut self) -> Result<(u8, bool)> {
        for attempt in 0..=self.sentinel.max_retries {
            let reply = self.battery_status().await?;
            let level = commands::parse_battery_level(&reply)?;
            if level != BATTERY_SENTINEL {
                return Ok((level, commands::parse_auth_status(&reply)?));
            }
            if attempt < self.sentinel.max_retries {
                self.log("Reattempting get battery level and authentication status");
                tokio::time::sleep(self.sentinel.wait).await;
            }
        }

        self.log(&format!(
            "Could not get battery level and authentication status after {} attempts",
            self.sentinel.max_retries.saturating_add(1)
        ));
        Ok((BATTERY_SENTINEL, false))
    }

    // ---------------------------------------------------------------
    // Reference oscillator DAC
    // ---------------------------------------------------------------

    async fn read_ref_osc_register(&mut self) -> Result<u16> {
        self.send_telnet_command(commands::CMD_DEBUGGER).await?;
        let reply = self
            .send_telnet_command(commands::CMD_READ_REF_OSC_DAC)
            .await?;
        commands::parse_ref_osc_register(&reply)
    }

    /// Read the reference oscillator DAC value (register bits 0-10).
    ///
    /// Bits 11-15 are cached for [`write_ref_osc_dac_value`]. A register
    /// that keeps reading `FFFF` yields [`Error::Sentinel`] and leaves the
    /// cache untouched.
    ///
    /// [`write_ref_osc_dac_value`]: Radio::write_ref_osc_dac_value
    pub async fn get_ref_osc_dac_value(&mut self) -> Result<u16> {
        for attempt in 0..=self.sentinel.max_retries {
            let word = self.read_ref_osc_register().await?;
            if word != DAC_SENTINEL {
                let (value, prefix) = commands::split_ref_osc_register(word);
                self.ref_osc_dac_prefix = Some(prefix);
                tracing::debug!(
                    radio = %self.name(),
                    value = format_args!("{value:#05x}"),
                    prefix = format_args!("{prefix:#06x}"),
                    "Reference oscillator DAC read"
                );
                return Ok(value);
            }
            if attempt < self.sentinel.max_retries {
                self.log("Retrying get reference oscillator DAC value");
                tokio::time::sleep(self.sentinel.wait).await;
            }
        }

        self.log("Failed getting reference oscillator DAC value");
        Err(Error::Sentinel(format!(
            "reference oscillator register read FFFF after {} attempts",
            self.sentinel.max_retries.saturating_add(1)
        )))
    }

    /// Write a new reference oscillator DAC value, preserving bits 11-15.
    ///
    /// Values above `0x7FF` are rejected before anything is sent. If the
    /// register has not been read yet, it is read first to learn the prefix.
    pub async fn write_ref_osc_dac_value(&mut self, value: u16) -> Result<()> {
        if value > DAC_VALUE_MASK {
            self.log("Error when writing to reference oscillator DAC value: value too large");
            return Err(Error::InvalidParameter(format!(
                "reference oscillator DAC value {value:#x} exceeds {DAC_VALUE_MASK:#x}"
            )));
        }

        let prefix = match self.ref_osc_dac_prefix {
            Some(prefix) => prefix,
            None => {
                self.get_ref_osc_dac_value().await?;
                self.ref_osc_dac_prefix.ok_or_else(|| {
                    Error::Protocol("reference oscillator prefix unavailable".into())
                })?
            }
        };

        let word = prefix | value;
        self.send_telnet_command(&commands::cmd_write_ref_osc_dac(word))
            .await
            .map(|_| ())
    }
}

impl std::fmt::Debug for Radio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Radio")
            .field("ip", &self.ip)
            .field("nickname", &self.nickname)
            .field("telnet", &self.links.telnet)
            .field("rcmp", &self.links.rcmp)
            .field("ref_osc_dac_prefix", &self.ref_osc_dac_prefix)
            .finish()
    }
}
