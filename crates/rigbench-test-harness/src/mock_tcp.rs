//! Mock TCP server for end-to-end channel testing.
//!
//! [`MockTcpServer`] is a localhost listener pre-loaded with scripted
//! replies. It stands in for the radio's RCMP control port or its Telnet
//! console so the real `TcpTransport` can be tested without a radio on
//! the bench.
//!
//! # Example
//!
//! ```
//! use rigbench_test_harness::MockTcpServer;
//!
//! # async fn example() -> rigbench_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//!
//! // When the client sends the RCMP "enter test mode" frame, acknowledge it.
//! server.expect(&[0x00, 0x02, 0x00, 0x0c], &[0x00, 0x03, 0x80, 0x0c, 0x00]);
//!
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to `addr` and exercise it ...
//! server.wait().await.map_err(rigbench_core::Error::Transport)?;
//! # Ok(())
//! # }
//! ```

use rigbench_core::error::{Error, Result};
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A pre-loaded request/response pair for the mock TCP server.
#[derive(Debug, Clone)]
struct TcpExpectation {
    /// The exact bytes we expect the client to send.
    request: Vec<u8>,
    /// The bytes to send back; empty means stay silent.
    response: Vec<u8>,
}

/// A scripted TCP peer.
///
/// The server binds a random localhost port on creation. Once
/// [`start`](MockTcpServer::start) is called, it accepts a single
/// connection and processes expectations in order: for each expected
/// request it reads exactly that many bytes, checks them, and writes back
/// the corresponding response. After the last expectation it holds the
/// connection open until the client closes it.
pub struct MockTcpServer {
    addr: String,
    listener: Option<TcpListener>,
    expectations: VecDeque<TcpExpectation>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a new mock server on a random localhost port.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock TCP server: {e}")))?;
        let addr = listener.local_addr().map_err(Error::Io)?.to_string();

        Ok(Self {
            addr,
            listener: Some(listener),
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(TcpExpectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// The `host:port` the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start serving one client in a background task.
    ///
    /// Call [`wait`](MockTcpServer::wait) afterwards to check that every
    /// expectation was met. Calling `start` twice has no effect.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, peer) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;
            tracing::debug!(%peer, "Mock TCP server accepted connection");

            for (i, expectation) in expectations.iter().enumerate() {
                serve_one(&mut stream, i, expectation).await?;
            }

            // Hold the connection until the client hangs up.
            let mut sink = [0u8; 64];
            while let Ok(n) = stream.read(&mut sink).await {
                if n == 0 {
                    break;
                }
            }
            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the server task to finish and return any mismatch.
    ///
    /// The task finishes once the client closes its end.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {e}"))?,
            None => Ok(()),
        }
    }
}

/// Read one scripted request off the stream and answer it.
async fn serve_one(
    stream: &mut TcpStream,
    i: usize,
    expectation: &TcpExpectation,
) -> std::result::Result<(), String> {
    let mut got = vec![0u8; expectation.request.len()];
    stream.read_exact(&mut got).await.map_err(|e| {
        format!(
            "expectation {i}: wanted {} bytes {:02X?}: {e}",
            expectation.request.len(),
            expectation.request
        )
    })?;

    if got != expectation.request {
        return Err(format!(
            "expectation {i}: expected {:02X?}, got {got:02X?}",
            expectation.request
        ));
    }
    if expectation.response.is_empty() {
        return Ok(());
    }

    let reply = async {
        stream.write_all(&expectation.response).await?;
        stream.flush().await
    };
    reply
        .await
        .map_err(|e| format!("expectation {i}: reply failed: {e}"))
}
