//! Telnet debug console channel.
//!
//! The radio exposes a plain-TCP debug console on port 23. No Telnet option
//! negotiation happens; commands are written as raw text (or raw bytes
//! decoded from hex) and the reply is whatever the console prints before it
//! goes quiet.
//!
//! # Example
//!
//! ```no_run
//! use rigbench_transport::TelnetChannel;
//!
//! # async fn example() -> rigbench_core::Result<()> {
//! let mut console = TelnetChannel::to_host("192.168.128.1");
//! console.connect().await?;
//! let banner = console.send_text("radiodebugger").await?;
//! println!("{banner}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rigbench_core::error::{Error, Result};
use rigbench_core::helpers::{ascii_lossy, decode_hex};
use rigbench_core::transport::Transport;

use crate::tcp::TcpTransport;

/// The console's TCP port.
pub const TELNET_PORT: u16 = 23;

/// Connect and read timeout for the console.
pub const TELNET_TIMEOUT: Duration = Duration::from_secs(1);

/// Size of one read from the console.
const CHUNK_LEN: usize = 1024;

/// Upper bound on an accumulated ASCII reply.
const MAX_REPLY_LEN: usize = 64 * 1024;

/// How a console command is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEncoding {
    /// The command is a hex-digit string; its decoded bytes are sent and one
    /// raw chunk is read back.
    Hex,
    /// The command is ASCII text sent as-is; the reply is read until the
    /// console goes quiet.
    Ascii,
}

/// A console reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetReply {
    /// One raw chunk, from a [`CommandEncoding::Hex`] command.
    Raw(Vec<u8>),
    /// Accumulated text, from a [`CommandEncoding::Ascii`] command.
    Text(String),
}

impl TelnetReply {
    /// The reply as text; raw chunks are decoded like ASCII replies.
    pub fn into_text(self) -> String {
        match self {
            TelnetReply::Raw(bytes) => ascii_lossy(&bytes),
            TelnetReply::Text(text) => text,
        }
    }
}

/// A channel to the radio's debug console.
pub struct TelnetChannel {
    transport: Box<dyn Transport>,
    read_timeout: Duration,
}

impl TelnetChannel {
    pub fn new(transport: Box<dyn Transport>, read_timeout: Duration) -> Self {
        Self {
            transport,
            read_timeout,
        }
    }

    /// A console channel to `ip` on port 23, not yet connected.
    pub fn to_host(ip: &str) -> Self {
        let transport = TcpTransport::new(&format!("{ip}:{TELNET_PORT}"), TELNET_TIMEOUT);
        Self::new(Box::new(transport), TELNET_TIMEOUT)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.transport.connect().await
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Send one command and collect its reply.
    pub async fn send_command(
        &mut self,
        command: &str,
        encoding: CommandEncoding,
    ) -> Result<TelnetReply> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }

        match encoding {
            CommandEncoding::Hex => {
                let bytes = decode_hex(command)?;
                self.transport.send(&bytes).await?;

                let mut buf = [0u8; CHUNK_LEN];
                let n = self.transport.receive(&mut buf, self.read_timeout).await?;
                Ok(TelnetReply::Raw(buf[..n].to_vec()))
            }
            CommandEncoding::Ascii => {
                if !command.is_ascii() {
                    return Err(Error::InvalidParameter(format!(
                        "console command is not ASCII: {command:?}"
                    )));
                }
                self.transport.send(command.as_bytes()).await?;
                let reply = self.read_until_quiet().await?;
                Ok(TelnetReply::Text(ascii_lossy(&reply)))
            }
        }
    }

    /// Send one line of text terminated with CRLF and return the reply text.
    pub async fn send_text(&mut self, line: &str) -> Result<String> {
        let reply = self
            .send_command(&format!("{line}\r\n"), CommandEncoding::Ascii)
            .await?;
        Ok(reply.into_text())
    }

    /// Read chunks until a read times out or the peer closes.
    async fn read_until_quiet(&mut self) -> Result<Vec<u8>> {
        let mut reply = Vec::new();
        let mut buf = [0u8; CHUNK_LEN];

        loop {
            match self.transport.receive(&mut buf, self.read_timeout).await {
                Ok(n) => {
                    reply.extend_from_slice(&buf[..n]);
                    if reply.len() >= MAX_REPLY_LEN {
                        tracing::warn!(
                            addr = %self.transport.label(),
                            bytes = reply.len(),
                            "Console reply hit size limit, truncating"
                        );
                        break;
                    }
                }
                Err(Error::Timeout) => break,
                Err(Error::ConnectionLost) => {
                    tracing::debug!(
                        addr = %self.transport.label(),
                        "Console closed connection while replying"
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::trace!(
            addr = %self.transport.label(),
            bytes = reply.len(),
            "Console reply collected"
        );
        Ok(reply)
    }
}

impl std::fmt::Debug for TelnetChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnetChannel")
            .field("peer", &self.transport.label())
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}
