//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a bench
//! device. Implementations exist for TCP sockets (the radio's RCMP control
//! port and its Telnet debug console), serial ports (PDU and relay boards),
//! and mock transports for testing.
//!
//! Framing lives above this trait: the RCMP codec, the Telnet
//! accumulate-until-quiet reader and the serial line discipline all operate
//! on a `Box<dyn Transport>`, so each can be driven by `MockTransport` from
//! the `rigbench-test-harness` crate in unit tests.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a device.
///
/// A transport starts disconnected unless its constructor says otherwise.
/// Connections are opened lazily by the channel that owns the transport,
/// and only an explicit [`close`](Transport::close) returns it to the
/// disconnected state; a failed send or receive leaves it connected.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the underlying link.
    ///
    /// Calling `connect()` on an already-connected transport is a no-op.
    async fn connect(&mut self) -> Result<()>;

    /// Send raw bytes to the device.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport (serial TX buffer, TCP socket, etc.).
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// Closing is idempotent: closing an already-closed transport succeeds.
    /// After `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// A short label for log lines (address or port name).
    fn label(&self) -> &str {
        "transport"
    }
}
