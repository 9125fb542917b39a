//! SerialDevice -- shared plumbing for serial-controlled bench hardware.
//!
//! A [`SerialDevice`] owns one [`SerialChannel`], opens it lazily, and runs
//! commands through a [`RetryExecutor`] whose only recovery hook is
//! reopening the port. Devices wired to a radio log into that radio's log
//! (one or more [`DeviceLog`] sinks); otherwise they print plain lines.

use std::time::Duration;

use rigbench_core::retry::{
    BoxFuture, Invocation, RetryExecutor, RetryIf, RetryPolicy, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_WAIT_BEFORE_RETRY,
};
use rigbench_core::{DeviceLog, Error, Result};
use rigbench_transport::SerialChannel;

/// Pause after the port opens before the first command.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// The serial link of a device, as seen by a retried operation.
pub struct SerialPort {
    name: String,
    channel: SerialChannel,
    logs: Vec<DeviceLog>,
    settle: Duration,
}

impl SerialPort {
    fn log(&self, text: &str) {
        for log in &self.logs {
            log.log(text);
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Open the port if it is closed.
    pub async fn ensure_open(&mut self) -> Result<()> {
        if self.channel.is_open() {
            return Ok(());
        }
        if let Err(e) = self.channel.open().await {
            self.log(&format!("Error connecting to {}: {e}", self.name));
            return Err(e);
        }
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    /// Write one command line, opening the port first if needed.
    pub async fn write(&mut self, command: &str) -> Result<()> {
        self.ensure_open().await?;
        self.channel.write(command).await.inspect_err(|e| {
            self.log(&format!("Error sending command to {}: {e}", self.name));
        })
    }

    /// Write one command line and return what the device answered.
    pub async fn exchange(&mut self, command: &str) -> Result<String> {
        self.ensure_open().await?;
        self.channel.exchange(command).await.inspect_err(|e| {
            self.log(&format!("Error sending command to {}: {e}", self.name));
        })
    }

    async fn reopen(&mut self) {
        if let Err(e) = self.channel.close().await {
            tracing::debug!(port = %self.channel.label(), error = %e, "Ignoring error closing port");
        }
        // A failure here surfaces on the next attempt.
        let _ = self.ensure_open().await;
    }

    async fn close(&mut self) {
        if let Err(e) = self.channel.close().await {
            tracing::debug!(port = %self.channel.label(), error = %e, "Ignoring error closing port");
        }
    }
}

fn reopen_fix(port: &mut SerialPort) -> BoxFuture<'_, ()> {
    Box::pin(port.reopen())
}

/// A serial-controlled bench device.
pub struct SerialDevice {
    port: SerialPort,
    executor: RetryExecutor,
    max_attempts: u32,
    wait_before_retry: Duration,
}

impl SerialDevice {
    /// Wrap `channel` as the device called `name`.
    ///
    /// `radio_logs` are the logs of radios this device is wired to; with
    /// none, log lines are printed as-is.
    pub fn new(name: &str, channel: SerialChannel, radio_logs: Vec<DeviceLog>) -> Self {
        let logs = if radio_logs.is_empty() {
            vec![DeviceLog::plain(name)]
        } else {
            radio_logs
        };

        SerialDevice {
            executor: RetryExecutor::fan_out(logs.clone()),
            port: SerialPort {
                name: name.to_string(),
                channel,
                logs,
                settle: DEFAULT_SETTLE_DELAY,
            },
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_before_retry: DEFAULT_WAIT_BEFORE_RETRY,
        }
    }

    /// Override the retry settings (defaults: 5 attempts, 15 s apart).
    pub fn with_retry(mut self, max_attempts: u32, wait_before_retry: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.wait_before_retry = wait_before_retry;
        self
    }

    /// Override the pause after the port opens (default: 100 ms).
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.port.settle = settle;
        self
    }

    pub fn name(&self) -> &str {
        &self.port.name
    }

    /// The logs this device writes to.
    pub fn logs(&self) -> &[DeviceLog] {
        &self.port.logs
    }

    pub fn log(&self, text: &str) {
        self.port.log(text);
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_open()
    }

    pub fn channel(&self) -> &SerialChannel {
        &self.port.channel
    }

    /// Direct access to the port for single-attempt exchanges.
    pub fn port_mut(&mut self) -> &mut SerialPort {
        &mut self.port
    }

    pub async fn connect(&mut self) -> Result<()> {
        self.port.ensure_open().await
    }

    /// Close and reopen the port. Errors are logged, not returned.
    pub async fn reconnect(&mut self) {
        self.port.reopen().await;
    }

    /// Close the port. Safe to call repeatedly.
    pub async fn close_connections(&mut self) {
        self.port.close().await;
    }

    /// Write one command, once. The device's answer, if any, is not read.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        self.port.write(command).await
    }

    /// Write one command under the retry policy.
    pub async fn send_command_with_retry(&mut self, command: &str) -> Result<()> {
        let call = Invocation::new("send_command", format!("({command:?},)"));
        let command = command.to_string();
        self.retry(&call, |port| {
            let command = command.clone();
            Box::pin(async move { port.write(&command).await })
        })
        .await
    }

    /// Run `op` against the port under the retry policy, reopening the port
    /// between attempts. Only transport errors are retried.
    pub async fn retry<R, Op>(&mut self, call: &Invocation, op: Op) -> Result<R>
    where
        R: Send,
        Op: for<'a> FnMut(&'a mut SerialPort) -> BoxFuture<'a, Result<R>> + Send,
    {
        self.retry_when(call, Error::is_transport, op).await
    }

    /// Like [`retry`](Self::retry), retrying every error `retry_if` accepts.
    pub async fn retry_when<R, Op>(
        &mut self,
        call: &Invocation,
        retry_if: RetryIf,
        op: Op,
    ) -> Result<R>
    where
        R: Send,
        Op: for<'a> FnMut(&'a mut SerialPort) -> BoxFuture<'a, Result<R>> + Send,
    {
        let policy = RetryPolicy::new(self.max_attempts, self.wait_before_retry)
            .with_potential_fix(reopen_fix)
            .with_retry_if(retry_if);
        self.executor
            .execute(&policy, call, &mut self.port, op)
            .await
    }
}

impl std::fmt::Debug for SerialDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialDevice")
            .field("name", &self.port.name)
            .field("channel", &self.port.channel)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigbench_core::Error;
    use rigbench_test_harness::MockTransport;

    fn device(mock: MockTransport, logs: Vec<DeviceLog>) -> SerialDevice {
        let channel = SerialChannel::new(Box::new(mock), "\n\r");
        SerialDevice::new("USBRelay", channel, logs).with_retry(3, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn send_command_opens_lazily() {
        let mut mock = MockTransport::disconnected();
        mock.expect(b"relay on 1\n\r", b"");
        let connects = mock.connect_counter();

        let mut dev = device(mock, Vec::new());
        assert!(!dev.is_connected());
        dev.send_command("relay on 1").await.unwrap();
        assert!(dev.is_connected());
        assert_eq!(connects.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_reopens_port_between_attempts() {
        let mut mock = MockTransport::disconnected();
        mock.fail_next_connects(1);
        mock.expect(b"relay off 2\n\r", b"");
        let connects = mock.connect_counter();
        let sent = mock.sent_log();

        let mut dev = device(mock, Vec::new());
        dev.send_command_with_retry("relay off 2").await.unwrap();
        // Attempt 1 failed to open; the reopen fix succeeded.
        assert_eq!(connects.get(), 1);
        assert_eq!(sent.as_text(), vec!["relay off 2\n\r"]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_exhaustion_reports_operation() {
        let mut mock = MockTransport::disconnected();
        mock.fail_next_connects(10);

        let mut dev = device(mock, Vec::new());
        match dev.send_command_with_retry("relay on 0").await {
            Err(Error::RetriesExhausted {
                operation,
                attempts,
                ..
            }) => {
                assert_eq!(operation, "send_command");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[test]
    fn logs_default_to_plain_sink() {
        let dev = device(MockTransport::disconnected(), Vec::new());
        assert_eq!(dev.logs().len(), 1);
        assert_eq!(dev.logs()[0].identifier(), "USBRelay");
    }

    #[test]
    fn radio_logs_replace_plain_sink() {
        let radio_logs = vec![
            DeviceLog::new("Radio", "left"),
            DeviceLog::new("Radio", "right"),
        ];
        let dev = device(MockTransport::disconnected(), radio_logs);
        let ids: Vec<&str> = dev.logs().iter().map(|l| l.identifier()).collect();
        assert_eq!(ids, vec!["left", "right"]);
    }

    #[test]
    fn each_device_gets_its_own_sinks() {
        let a = device(
            MockTransport::disconnected(),
            vec![DeviceLog::new("Radio", "left")],
        );
        let b = device(MockTransport::disconnected(), Vec::new());
        assert_eq!(a.logs()[0].identifier(), "left");
        assert_eq!(b.logs()[0].identifier(), "USBRelay");
    }

    #[tokio::test]
    async fn close_twice_is_harmless() {
        let mut dev = device(MockTransport::new(), Vec::new());
        dev.close_connections().await;
        dev.close_connections().await;
        assert!(!dev.is_connected());
    }
}
