//! TCP transport for device communication.
//!
//! This module provides [`TcpTransport`], which implements the [`Transport`]
//! trait for network-connected devices. On the bench this carries two
//! links to the radio:
//! - the RCMP control port (binary, length-prefixed frames, port 8002)
//! - the Telnet debug console (ASCII commands, port 23)
//!
//! A `TcpTransport` is created disconnected and opened lazily by the
//! channel that owns it, so a controller can be constructed while the
//! device is still powered off.
//!
//! # Example
//!
//! ```no_run
//! use rigbench_transport::TcpTransport;
//! use rigbench_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> rigbench_core::Result<()> {
//! let mut transport = TcpTransport::new("192.168.128.1:8002", Duration::from_secs(10));
//! transport.connect().await?;
//!
//! transport.send(&[0x00, 0x02, 0x00, 0x0c]).await?;
//!
//! let mut buf = [0u8; 4096];
//! let n = transport.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use rigbench_core::error::{Error, Result};
use rigbench_core::transport::Transport;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP link to one radio port.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    /// `host:port`, also the label used in log events.
    addr: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a closed transport for `addr` (`host:port`).
    ///
    /// No network activity happens until [`Transport::connect`] is called.
    pub fn new(addr: &str, connect_timeout: Duration) -> Self {
        Self {
            stream: None,
            addr: addr.to_string(),
            connect_timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addr = self.addr.as_str();
        tracing::debug!(addr, timeout_ms = self.connect_timeout.as_millis(), "Opening TCP link");

        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::error!(addr, error = %e, "TCP link failed to open");
                return Err(map_connect_error(e, addr));
            }
            Err(_) => {
                tracing::error!(addr, "TCP link timed out while opening");
                return Err(Error::Transport(format!("unable to connect to {addr}: timed out")));
            }
        };

        // Commands are a few bytes each; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(addr, error = %e, "Could not set TCP_NODELAY");
        }

        tracing::info!(addr, "TCP link open");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(addr = %self.addr, bytes = data.len(), data = ?data, "TCP send");

        let written = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        written.await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "TCP send failed");
            map_io_error(e)
        })
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let Ok(read) = tokio::time::timeout(timeout, stream.read(buf)).await else {
            tracing::trace!(addr = %self.addr, timeout_ms = timeout.as_millis(), "TCP read timed out");
            return Err(Error::Timeout);
        };

        match read {
            // A zero-length read is the peer hanging up.
            Ok(0) => {
                tracing::warn!(addr = %self.addr, "Radio closed the TCP link");
                Err(Error::ConnectionLost)
            }
            Ok(n) => {
                tracing::trace!(addr = %self.addr, bytes = n, data = ?&buf[..n], "TCP recv");
                Ok(n)
            }
            Err(e) => {
                tracing::error!(addr = %self.addr, error = %e, "TCP read failed");
                Err(map_io_error(e))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(addr = %self.addr, error = %e, "Ignoring TCP shutdown error");
        }
        tracing::info!(addr = %self.addr, "TCP link closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn label(&self) -> &str {
        &self.addr
    }
}

fn map_connect_error(e: io::Error, addr: &str) -> Error {
    if e.kind() == io::ErrorKind::ConnectionRefused {
        Error::Transport(format!("connection refused: {addr}"))
    } else {
        Error::Transport(format!("unable to connect to {addr}: {e}"))
    }
}

/// Errors that mean the link is gone become `ConnectionLost`; the rest stay `Io`.
fn map_io_error(e: io::Error) -> Error {
    use io::ErrorKind::*;
    match e.kind() {
        ConnectionReset | BrokenPipe | NotConnected | ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn radio_port() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    async fn opened(addr: &str) -> TcpTransport {
        let mut transport = TcpTransport::new(addr, Duration::from_secs(2));
        transport.connect().await.unwrap();
        transport
    }

    #[test]
    fn starts_closed() {
        let transport = TcpTransport::new("192.168.128.1:8002", Duration::from_secs(10));
        assert!(!transport.is_connected());
        assert_eq!(transport.label(), "192.168.128.1:8002");
        assert_eq!(transport.connect_timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn rcmp_frame_round_trip() {
        let (listener, addr) = radio_port().await;

        let radio = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frame = [0u8; 4];
            stream.read_exact(&mut frame).await.unwrap();
            assert_eq!(frame, [0x00, 0x02, 0x00, 0x0c]);
            stream.write_all(&[0x00, 0x02, 0x80, 0x0c]).await.unwrap();
        });

        let mut transport = opened(&addr).await;
        transport.send(&[0x00, 0x02, 0x00, 0x0c]).await.unwrap();
        let mut buf = [0u8; 64];
        let n = transport.receive(&mut buf, Duration::from_secs(2)).await.unwrap();
        assert_eq!(&buf[..n], &[0x00, 0x02, 0x80, 0x0c]);

        transport.close().await.unwrap();
        radio.await.unwrap();
    }

    #[tokio::test]
    async fn second_connect_reuses_the_link() {
        let (listener, addr) = radio_port().await;
        let radio = tokio::spawn(async move {
            let _held = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = opened(&addr).await;
        transport.connect().await.unwrap();
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        radio.abort();
    }

    #[tokio::test]
    async fn refused_connect_is_a_transport_error() {
        let (listener, addr) = radio_port().await;
        drop(listener);

        let mut transport = TcpTransport::new(&addr, Duration::from_secs(2));
        match transport.connect().await {
            Err(Error::Transport(msg)) => assert!(msg.contains("connection refused"), "{msg}"),
            other => panic!("expected Transport error, got: {other:?}"),
        }
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn silent_radio_times_out_but_stays_connected() {
        let (listener, addr) = radio_port().await;
        let radio = tokio::spawn(async move {
            let _held = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = opened(&addr).await;
        let mut buf = [0u8; 16];
        let result = transport.receive(&mut buf, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(transport.is_connected());

        transport.close().await.unwrap();
        radio.abort();
    }

    #[tokio::test]
    async fn hangup_is_connection_lost() {
        let (listener, addr) = radio_port().await;
        let radio = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = opened(&addr).await;
        radio.await.unwrap();

        let mut buf = [0u8; 16];
        let result = transport.receive(&mut buf, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::ConnectionLost)), "{result:?}");
    }

    #[tokio::test]
    async fn closed_link_refuses_io() {
        let mut transport = TcpTransport::new("127.0.0.1:1", Duration::from_millis(100));
        assert!(matches!(transport.send(b"000c").await, Err(Error::NotConnected)));

        let mut buf = [0u8; 8];
        let result = transport.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_reopen_works() {
        let (listener, addr) = radio_port().await;
        let radio = tokio::spawn(async move {
            for reply in [b"first" as &[u8], b"second"] {
                let (mut stream, _) = listener.accept().await.unwrap();
                stream.write_all(reply).await.unwrap();
                let mut sink = [0u8; 1];
                let _ = stream.read(&mut sink).await;
            }
        });

        let mut transport = TcpTransport::new(&addr, Duration::from_secs(2));
        for expected in [b"first" as &[u8], b"second"] {
            transport.connect().await.unwrap();
            let mut buf = [0u8; 16];
            let n = transport.receive(&mut buf, Duration::from_secs(2)).await.unwrap();
            assert_eq!(&buf[..n], expected);
            transport.close().await.unwrap();
            transport.close().await.unwrap();
            assert!(!transport.is_connected());
        }

        radio.await.unwrap();
    }
}
