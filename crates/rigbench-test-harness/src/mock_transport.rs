//! Mock transport for deterministic testing of channels and controllers.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. This lets you test RCMP framing, Telnet command
//! encoding, serial login sequences and retry/recovery paths without bench
//! hardware.
//!
//! Controllers take ownership of their transports, so the mock hands out
//! shared handles ([`SentLog`], [`ConnectCounter`]) that stay readable
//! after the mock has been boxed and moved.
//!
//! # Example
//!
//! ```
//! use rigbench_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // Pre-load: when the channel sends this RCMP frame, return this reply.
//! mock.expect(&[0x00, 0x03, 0x04, 0x10, 0x80], &[0x00, 0x02, 0x57, 0x10]);
//! let sent = mock.sent_log();
//! assert!(sent.snapshot().is_empty());
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rigbench_core::error::{Error, Result};
use rigbench_core::transport::Transport;

/// What the mock does after a matching request.
#[derive(Debug, Clone)]
enum Response {
    /// Return these bytes; an empty reply reads as a timeout.
    Bytes(Vec<u8>),
    /// The peer drops the link: the next `receive()` fails with
    /// [`Error::ConnectionLost`].
    Hangup,
}

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    response: Response,
}

/// Shared, cloneable view of everything sent through a [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl SentLog {
    fn push(&self, data: &[u8]) {
        if let Ok(mut log) = self.0.lock() {
            log.push(data.to_vec());
        }
    }

    /// Copy of every `send()` payload, in order.
    pub fn snapshot(&self) -> Vec<Vec<u8>> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Every payload decoded as lossy UTF-8, for text protocols.
    pub fn as_text(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared counter of successful `connect()` calls that opened the link.
#[derive(Debug, Clone, Default)]
pub struct ConnectCounter(Arc<AtomicUsize>);

impl ConnectCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A mock [`Transport`] for testing without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation. The
/// corresponding response is then returned by subsequent `receive()` calls;
/// once it is drained, `receive()` reports [`Error::Timeout`].
///
/// If no expectation matches or the queue is exhausted, `send()` returns
/// [`Error::Protocol`].
#[derive(Debug)]
pub struct MockTransport {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// The response pending for the next `receive()` call.
    pending_response: Option<Response>,
    /// Cursor into the pending response (how many bytes have been read so far).
    response_cursor: usize,
    connected: bool,
    /// Number of upcoming `connect()` calls that should fail.
    failing_connects: usize,
    sent_log: SentLog,
    connects: ConnectCounter,
    label: String,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending_response: None,
            response_cursor: 0,
            connected: true,
            failing_connects: 0,
            sent_log: SentLog::default(),
            connects: ConnectCounter::default(),
            label: "mock".to_string(),
        }
    }

    /// Create a mock that must be opened with `connect()` first, like the
    /// real TCP and serial transports.
    pub fn disconnected() -> Self {
        let mut mock = Self::new();
        mock.connected = false;
        mock
    }

    /// Set the label reported through [`Transport::label`].
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, subsequent
    /// `receive()` calls return `response`. An empty `response` makes the
    /// next `receive()` time out, which also models a write-only device.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: Response::Bytes(response.to_vec()),
        });
    }

    /// Expect `request`, then drop the link before replying.
    pub fn expect_hangup(&mut self, request: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: Response::Hangup,
        });
    }

    /// Make the next `n` calls to `connect()` fail with a transport error.
    pub fn fail_next_connects(&mut self, n: usize) {
        self.failing_connects = n;
    }

    /// A handle to the log of all bytes sent through this transport.
    ///
    /// Each element is the byte slice from one `send()` call.
    pub fn sent_log(&self) -> SentLog {
        self.sent_log.clone()
    }

    /// A handle counting how often the link was opened.
    pub fn connect_counter(&self) -> ConnectCounter {
        self.connects.clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    fn clear_pending(&mut self) {
        self.pending_response = None;
        self.response_cursor = 0;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        if self.failing_connects > 0 {
            self.failing_connects -= 1;
            return Err(Error::Transport(format!(
                "unable to connect to {}: refused by mock",
                self.label
            )));
        }
        self.connected = true;
        self.connects.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent_log.push(data);

        match self.expectations.pop_front() {
            Some(expectation) => {
                if data != expectation.request.as_slice() {
                    return Err(Error::Protocol(format!(
                        "unexpected send data: expected {:02X?}, got {:02X?}",
                        expectation.request, data
                    )));
                }
                self.pending_response = Some(expectation.response);
                self.response_cursor = 0;
                Ok(())
            }
            None => Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        match self.pending_response.take() {
            Some(Response::Hangup) => {
                self.clear_pending();
                Err(Error::ConnectionLost)
            }
            Some(Response::Bytes(response)) => {
                let remaining = &response[self.response_cursor..];
                if remaining.is_empty() {
                    self.clear_pending();
                    return Err(Error::Timeout);
                }
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                self.response_cursor += n;
                if self.response_cursor >= response.len() {
                    // All response bytes consumed; clear for next exchange.
                    self.clear_pending();
                } else {
                    self.pending_response = Some(Response::Bytes(response));
                }
                Ok(n)
            }
            None => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.clear_pending();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn label(&self) -> &str {
        &self.label
    }
}
