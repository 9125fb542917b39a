//! Request/reply channel over a stream socket.
//!
//! [`SocketChannel`] owns one [`Transport`] and adds framing: in
//! [`FrameMode::Rcmp`] commands are hex strings sent as RCMP frames and
//! replies have their length header stripped; in [`FrameMode::Text`]
//! commands are sent as CRLF-terminated text and replies are returned as
//! received.
//!
//! # Example
//!
//! ```no_run
//! use rigbench_transport::SocketChannel;
//! use std::time::Duration;
//!
//! # async fn example() -> rigbench_core::Result<()> {
//! let mut channel = SocketChannel::rcmp_to_host("192.168.128.1", 8002, Duration::from_secs(10));
//! channel.connect().await?;
//! let reply = channel
//!     .request_reply("041080", Some("0410"), Duration::from_secs(2))
//!     .await?;
//! println!("verified={} payload={:02x?}", reply.verified, reply.payload);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rigbench_core::error::{Error, Result};
use rigbench_core::helpers::encode_hex;
use rigbench_core::transport::Transport;

use crate::rcmp;
use crate::tcp::TcpTransport;

/// Read timeout used until a request sets its own.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// How commands are framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Hex command strings sent as length-prefixed RCMP frames.
    Rcmp,
    /// Text commands terminated with CRLF.
    Text,
}

/// The answer to one [`SocketChannel::request_reply`] exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply payload (RCMP header already stripped).
    pub payload: Vec<u8>,
    /// Whether the reply matched the expected pattern. Always `true` when no
    /// pattern was given.
    pub verified: bool,
}

/// A framed request/reply channel that exclusively owns its transport.
pub struct SocketChannel {
    transport: Box<dyn Transport>,
    mode: FrameMode,
    read_timeout: Duration,
}

impl SocketChannel {
    pub fn new(transport: Box<dyn Transport>, mode: FrameMode) -> Self {
        Self {
            transport,
            mode,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// An RCMP channel to `host:port` over TCP, not yet connected.
    pub fn rcmp_to_host(host: &str, port: u16, connect_timeout: Duration) -> Self {
        let transport = TcpTransport::new(&format!("{host}:{port}"), connect_timeout);
        Self::new(Box::new(transport), FrameMode::Rcmp)
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open the link; a no-op when already connected.
    pub async fn connect(&mut self) -> Result<()> {
        self.transport.connect().await
    }

    /// Close the link; safe to call when already disconnected.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Frame and send one command.
    pub async fn write(&mut self, data: &str) -> Result<()> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }

        let bytes = match self.mode {
            FrameMode::Rcmp => rcmp::encode(data)?,
            FrameMode::Text => format!("{data}\r\n").into_bytes(),
        };
        self.transport.send(&bytes).await
    }

    /// Read one reply chunk of up to 4096 bytes.
    ///
    /// In RCMP mode the 2-byte length header is stripped.
    pub async fn read(&mut self) -> Result<Vec<u8>> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }

        let mut buf = vec![0u8; rcmp::MAX_REPLY_LEN];
        let n = self.transport.receive(&mut buf, self.read_timeout).await?;
        let chunk = &buf[..n];

        match self.mode {
            FrameMode::Rcmp => Ok(rcmp::decode(chunk)?.to_vec()),
            FrameMode::Text => Ok(chunk.to_vec()),
        }
    }

    /// Send `command` and read its reply, waiting up to `timeout`.
    ///
    /// When `expected_response` is given, the reply is verified by checking
    /// that its lowercase hex rendering contains the pattern. A failed
    /// verification is reported through [`Reply::verified`], not as an
    /// error.
    pub async fn request_reply(
        &mut self,
        command: &str,
        expected_response: Option<&str>,
        timeout: Duration,
    ) -> Result<Reply> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }

        self.read_timeout = timeout;
        self.write(command).await?;
        let payload = self.read().await?;

        let verified = match expected_response {
            Some(pattern) => {
                let verified = encode_hex(&payload).contains(&pattern.to_ascii_lowercase());
                if !verified {
                    tracing::debug!(
                        addr = %self.transport.label(),
                        command,
                        pattern,
                        reply = %encode_hex(&payload),
                        "Reply did not match expected pattern"
                    );
                }
                verified
            }
            None => true,
        };

        Ok(Reply { payload, verified })
    }
}

impl std::fmt::Debug for SocketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketChannel")
            .field("peer", &self.transport.label())
            .field("mode", &self.mode)
            .field("connected", &self.transport.is_connected())
            .finish()
    }
}
