//! Line-oriented channel for PDU and relay serial consoles.

use std::time::Duration;

use rigbench_core::error::{Error, Result};
use rigbench_core::helpers::ascii_lossy;
use rigbench_core::transport::Transport;

use crate::serial::{SerialProfile, SerialTransport};

/// Poll timeout while draining already-buffered bytes.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Delay between writing a command and draining its answer.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Write timeout of a channel built without a profile.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// A serial console that speaks newline-terminated text commands.
pub struct SerialChannel {
    transport: Box<dyn Transport>,
    terminator: &'static str,
    write_timeout: Duration,
}

impl SerialChannel {
    pub fn new(transport: Box<dyn Transport>, terminator: &'static str) -> Self {
        Self {
            transport,
            terminator,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// A closed channel on `port` with the profile's line settings.
    pub fn for_port(port: &str, profile: SerialProfile) -> Self {
        let transport = SerialTransport::new(port, profile.config());
        Self::new(Box::new(transport), profile.line_terminator())
            .with_write_timeout(profile.timeout())
    }

    /// Bound each write; a stalled port yields [`Error::Timeout`].
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn label(&self) -> &str {
        self.transport.label()
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn open(&mut self) -> Result<()> {
        self.transport.connect().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Write `command` followed by the line terminator.
    pub async fn write(&mut self, command: &str) -> Result<()> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }
        let line = format!("{command}{}", self.terminator);
        tokio::time::timeout(self.write_timeout, self.transport.send(line.as_bytes()))
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Drain whatever the device has already sent and return it trimmed.
    ///
    /// Each chunk is polled briefly; the first empty poll ends the read, so
    /// a silent device yields an empty string rather than an error.
    pub async fn read(&mut self) -> Result<String> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }

        let mut collected = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match self.transport.receive(&mut buf, DRAIN_POLL).await {
                Ok(0) => break,
                Ok(n) => collected.extend_from_slice(&buf[..n]),
                Err(Error::Timeout) => break,
                Err(e) => return Err(e),
            }
        }

        Ok(ascii_lossy(&collected).trim().to_string())
    }

    /// Write `command`, let the device settle, then drain its answer.
    pub async fn exchange(&mut self, command: &str) -> Result<String> {
        self.write(command).await?;
        tokio::time::sleep(SETTLE_DELAY).await;
        self.read().await
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("port", &self.transport.label())
            .field("terminator", &self.terminator)
            .field("write_timeout", &self.write_timeout)
            .field("open", &self.transport.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigbench_test_harness::MockTransport;

    #[tokio::test]
    async fn write_appends_profile_terminator() {
        let mut mock = MockTransport::new();
        mock.expect(b"relay on 0\n\r", b"");
        let sent = mock.sent_log();

        let mut channel = SerialChannel::new(
            Box::new(mock),
            SerialProfile::Relay.line_terminator(),
        );
        channel.write("relay on 0").await.unwrap();
        assert_eq!(sent.as_text(), vec!["relay on 0\n\r"]);
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_drains_trimmed_reply() {
        let mut mock = MockTransport::new();
        mock.expect(b"set outlet 1 on\n", b"\r\nOk\r\npdu> ");

        let mut channel =
            SerialChannel::new(Box::new(mock), SerialProfile::Pdu.line_terminator());
        let reply = channel.exchange("set outlet 1 on").await.unwrap();
        assert_eq!(reply, "Ok\r\npdu>");
    }

    #[tokio::test]
    async fn silent_device_reads_empty() {
        let mut mock = MockTransport::new();
        mock.expect(b"abc\n", b"");

        let mut channel = SerialChannel::new(Box::new(mock), "\n");
        channel.write("abc").await.unwrap();
        assert_eq!(channel.read().await.unwrap(), "");
    }

    #[tokio::test]
    async fn closed_channel_returns_not_connected() {
        let mut channel = SerialChannel::new(Box::new(MockTransport::disconnected()), "\n");
        assert!(!channel.is_open());
        assert!(matches!(channel.write("x").await, Err(Error::NotConnected)));
        assert!(matches!(channel.read().await, Err(Error::NotConnected)));

        channel.open().await.unwrap();
        assert!(channel.is_open());
        channel.close().await.unwrap();
        channel.close().await.unwrap();
        assert!(!channel.is_open());
    }

    #[test]
    fn for_port_uses_profile() {
        let channel = SerialChannel::for_port("/dev/ttyUSB3", SerialProfile::Pdu);
        assert_eq!(channel.label(), "/dev/ttyUSB3");
        assert_eq!(channel.write_timeout(), Duration::from_secs(1));
        assert!(!channel.is_open());

        let relay = SerialChannel::for_port("/dev/ttyACM0", SerialProfile::Relay);
        assert_eq!(relay.write_timeout(), Duration::from_secs(10));
    }

    /// A port that accepts the connection but never finishes a write.
    struct StalledPort;

    #[async_trait::async_trait]
    impl Transport for StalledPort {
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn send(&mut self, _data: &[u8]) -> Result<()> {
            std::future::pending().await
        }

        async fn receive(&mut self, _buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            Err(Error::Timeout)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out_after_profile_timeout() {
        let mut channel = SerialChannel::new(Box::new(StalledPort), "\n\r")
            .with_write_timeout(SerialProfile::Relay.timeout());
        let start = tokio::time::Instant::now();
        assert!(matches!(channel.write("relay on 1").await, Err(Error::Timeout)));
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
