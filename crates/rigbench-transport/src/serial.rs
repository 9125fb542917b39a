//! Serial port transport for bench power hardware.
//!
//! This module provides [`SerialTransport`], which implements the
//! [`Transport`] trait for USB virtual COM ports and physical RS-232
//! connections. Two device families share it with different line settings,
//! captured as [`SerialProfile`]s:
//! - [`SerialProfile::Pdu`]: network power distribution unit console, 115200 8N1
//! - [`SerialProfile::Relay`]: USB relay board, 9600 8N1
//!
//! # Example
//!
//! ```no_run
//! use rigbench_transport::{SerialProfile, SerialTransport};
//! use rigbench_core::transport::Transport;
//!
//! # async fn example() -> rigbench_core::Result<()> {
//! let mut transport = SerialTransport::new("/dev/ttyUSB0", SerialProfile::Relay.config());
//! transport.connect().await?;
//! transport.send(b"relay on 1\n\r").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use rigbench_core::error::{Error, Result};
use rigbench_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
pub use tokio_serial::{DataBits, FlowControl, Parity, StopBits};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

/// Line settings for a serial port.
///
/// The field types are `tokio-serial`'s own, so a config maps onto the port
/// builder one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl SerialConfig {
    /// 8 data bits, no parity, 1 stop bit, no flow control.
    pub fn eight_n_one(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::eight_n_one(9600)
    }
}

/// Line settings and framing defaults for one family of serial devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialProfile {
    /// Power distribution unit with a login console.
    Pdu,
    /// USB relay board.
    Relay,
}

impl SerialProfile {
    /// Default port settings for this device family.
    pub fn config(self) -> SerialConfig {
        match self {
            SerialProfile::Pdu => SerialConfig::eight_n_one(115_200),
            SerialProfile::Relay => SerialConfig::eight_n_one(9600),
        }
    }

    /// Terminator appended to every command line.
    pub fn line_terminator(self) -> &'static str {
        match self {
            SerialProfile::Pdu => "\n",
            SerialProfile::Relay => "\n\r",
        }
    }

    /// How long one write to the port may block.
    pub fn timeout(self) -> Duration {
        match self {
            SerialProfile::Pdu => Duration::from_secs(1),
            SerialProfile::Relay => Duration::from_secs(10),
        }
    }
}

/// Serial port transport.
///
/// Created closed; [`Transport::connect`] opens the port with the stored
/// configuration.
pub struct SerialTransport {
    /// The underlying serial port stream, `None` while closed.
    port: Option<SerialStream>,
    /// Port name for opening and logging
    port_name: String,
    config: SerialConfig,
}

impl SerialTransport {
    /// Create a closed transport for `port` with the given settings.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
    /// * `config` - Line settings, typically from [`SerialProfile::config`]
    pub fn new(port: &str, config: SerialConfig) -> Self {
        Self {
            port: None,
            port_name: port.to_string(),
            config,
        }
    }

    /// Get the name of the serial port.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let name = self.port_name.as_str();
        let config = self.config;
        tracing::debug!(port = name, ?config, "Opening serial port");

        let opened = tokio_serial::new(name, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(config.flow_control)
            .open_native_async();
        let mut serial_stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(port = name, error = %e, "Serial port failed to open");
                return Err(Error::Transport(format!(
                    "failed to connect to serial port {name}: {e}"
                )));
            }
        };

        // Relay boards and PDUs ignore the modem lines; keep them idle so a
        // USB adapter does not toggle attached hardware on open.
        if let Err(e) = serial_stream.write_data_terminal_ready(false) {
            tracing::warn!(port = name, error = %e, "Could not drop DTR");
        }
        if let Err(e) = serial_stream.write_request_to_send(false) {
            tracing::warn!(port = name, error = %e, "Could not drop RTS");
        }

        tracing::info!(port = name, baud_rate = config.baud_rate, "Serial port open");
        self.port = Some(serial_stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, line = %String::from_utf8_lossy(data).escape_debug(), "Serial write");

        let written = async {
            port.write_all(data).await?;
            port.flush().await
        };
        written.await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Serial write failed");
            map_io_error(e)
        })
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        let Ok(read) = tokio::time::timeout(timeout, port.read(buf)).await else {
            return Err(Error::Timeout);
        };
        let n = read.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Serial read failed");
            map_io_error(e)
        })?;
        tracing::trace!(port = %self.port_name, bytes = n, "Serial read");
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut port) = self.port.take() else {
            return Ok(());
        };
        if let Err(e) = port.flush().await {
            tracing::debug!(port = %self.port_name, error = %e, "Ignoring flush error on close");
        }
        tracing::info!(port = %self.port_name, "Serial port closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn label(&self) -> &str {
        &self.port_name
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => {
            Error::ConnectionLost
        }
        _ => Error::Io(e),
    }
}
