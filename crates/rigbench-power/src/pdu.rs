//! Pdu -- serial console driver for a switched power distribution unit.
//!
//! The PDU's console drops the first bytes it receives after sitting idle,
//! so every command is preceded by a full login: a throwaway username, the
//! real username, the password, then the command itself. Each line is
//! exchanged (write, settle, drain) and the command counts as accepted only
//! if the final answer contains `Ok`.

use std::ops::RangeInclusive;

use rigbench_core::retry::Invocation;
use rigbench_core::{Error, Result};

use crate::device::{SerialDevice, SerialPort};

/// Sent first to absorb the bytes the console drops after idling.
const THROWAWAY_USERNAME: &str = "abc";

/// Marker of an accepted command in the console's answer.
const ACCEPTED: &str = "Ok";

/// A PDU with outlets numbered from 1.
///
/// Constructed via [`PduBuilder`](crate::builder::PduBuilder).
#[derive(Debug)]
pub struct Pdu {
    device: SerialDevice,
    username: String,
    password: String,
    num_outlets: u8,
}

/// A rejected command is worth another login, as is any transport error.
fn retry_rejected(error: &Error) -> bool {
    error.is_transport() || matches!(error, Error::CommandRejected { .. })
}

/// Log in and run one command, returning the console's final answer.
async fn logged_in_exchange(
    port: &mut SerialPort,
    device: &str,
    username: &str,
    password: &str,
    command: &str,
) -> Result<String> {
    port.exchange(THROWAWAY_USERNAME).await?;
    port.exchange(username).await?;
    port.exchange(password).await?;
    let response = port.exchange(command).await?;

    if !response.contains(ACCEPTED) {
        return Err(Error::CommandRejected {
            device: device.to_string(),
            response,
        });
    }
    Ok(response)
}

impl Pdu {
    pub(crate) fn new(
        device: SerialDevice,
        username: String,
        password: String,
        num_outlets: u8,
    ) -> Self {
        Pdu {
            device,
            username,
            password,
            num_outlets,
        }
    }

    pub fn device(&self) -> &SerialDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut SerialDevice {
        &mut self.device
    }

    /// The outlet numbers this PDU switches.
    pub fn outlets(&self) -> RangeInclusive<u8> {
        1..=self.num_outlets
    }

    /// Log in and send one command, once.
    pub async fn send_command(&mut self, command: &str) -> Result<String> {
        let name = self.device.name().to_string();
        logged_in_exchange(
            self.device.port_mut(),
            &name,
            &self.username,
            &self.password,
            command,
        )
        .await
    }

    /// Log in and send one command under the retry policy.
    ///
    /// A rejected command is retried like a transport failure.
    pub async fn send_command_with_retry(&mut self, command: &str) -> Result<String> {
        let name = self.device.name().to_string();
        let (username, password) = (self.username.clone(), self.password.clone());
        let call = Invocation::new("send_command", format!("({command:?},)"));
        let command = command.to_string();

        self.device
            .retry_when(&call, retry_rejected, |port| {
                let (name, username, password) = (name.clone(), username.clone(), password.clone());
                let command = command.clone();
                Box::pin(async move {
                    logged_in_exchange(port, &name, &username, &password, &command).await
                })
            })
            .await
    }

    pub async fn turn_outlets_on(&mut self) -> Result<()> {
        for outlet in self.outlets() {
            self.send_command_with_retry(&format!("set outlet {outlet} on"))
                .await?;
        }
        Ok(())
    }

    pub async fn turn_outlets_off(&mut self) -> Result<()> {
        for outlet in self.outlets() {
            self.send_command_with_retry(&format!("set outlet {outlet} off"))
                .await?;
        }
        Ok(())
    }

    pub async fn close_connections(&mut self) {
        self.device.close_connections().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PduBuilder;
    use rigbench_test_harness::{MockTransport, SentLog};
    use std::time::Duration;

    fn expect_login(mock: &mut MockTransport, command: &str, answer: &[u8]) {
        mock.expect(b"abc\n", b"Username: ");
        mock.expect(b"admin\n", b"Password: ");
        mock.expect(b"s3cret\n", b"\r\niBoot> ");
        mock.expect(format!("{command}\n").as_bytes(), answer);
    }

    fn pdu(mock: MockTransport, outlets: u8) -> (Pdu, SentLog) {
        let sent = mock.sent_log();
        let pdu = PduBuilder::new("/dev/ttyUSB0", "s3cret")
            .num_outlets(outlets)
            .max_attempts(2)
            .wait_before_retry(Duration::from_secs(1))
            .build_with_transport(Box::new(mock))
            .unwrap();
        (pdu, sent)
    }

    #[tokio::test(start_paused = true)]
    async fn login_sequence_precedes_command() {
        let mut mock = MockTransport::disconnected();
        expect_login(&mut mock, "set outlet 1 on", b"Ok\r\niBoot> ");

        let (mut pdu, sent) = pdu(mock, 1);
        let response = pdu.send_command("set outlet 1 on").await.unwrap();
        assert_eq!(response, "Ok\r\niBoot>");
        assert_eq!(
            sent.as_text(),
            vec!["abc\n", "admin\n", "s3cret\n", "set outlet 1 on\n"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ok_is_command_rejected() {
        let mut mock = MockTransport::disconnected();
        expect_login(&mut mock, "set outlet 9 on", b"Invalid outlet\r\n");

        let (mut pdu, _) = pdu(mock, 1);
        match pdu.send_command("set outlet 9 on").await {
            Err(Error::CommandRejected { device, response }) => {
                assert_eq!(device, "iBootPDU");
                assert_eq!(response, "Invalid outlet");
            }
            other => panic!("expected CommandRejected, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_command_is_retried_with_fresh_login() {
        let mut mock = MockTransport::disconnected();
        expect_login(&mut mock, "set outlet 1 off", b"");
        expect_login(&mut mock, "set outlet 1 off", b"Ok\r\n");

        let (mut pdu, sent) = pdu(mock, 1);
        assert_eq!(
            pdu.send_command_with_retry("set outlet 1 off").await.unwrap(),
            "Ok"
        );
        assert_eq!(sent.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_rejection_exhausts_retries() {
        let mut mock = MockTransport::disconnected();
        expect_login(&mut mock, "set outlet 7 on", b"Invalid outlet\r\n");
        expect_login(&mut mock, "set outlet 7 on", b"Invalid outlet\r\n");

        let (mut pdu, sent) = pdu(mock, 1);
        match pdu.send_command_with_retry("set outlet 7 on").await {
            Err(Error::RetriesExhausted { attempts, source, .. }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, Error::CommandRejected { .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(sent.len(), 8);
    }

    #[test]
    fn only_transport_errors_and_rejections_are_retried() {
        assert!(retry_rejected(&Error::Timeout));
        assert!(retry_rejected(&Error::CommandRejected {
            device: "iBootPDU".into(),
            response: String::new(),
        }));
        assert!(!retry_rejected(&Error::InvalidParameter("outlet".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn outlets_switch_in_order() {
        let mut mock = MockTransport::disconnected();
        for n in 1..=3 {
            expect_login(&mut mock, &format!("set outlet {n} on"), b"Ok\r\n");
        }
        for n in 1..=3 {
            expect_login(&mut mock, &format!("set outlet {n} off"), b"Ok\r\n");
        }

        let (mut pdu, sent) = pdu(mock, 3);
        pdu.turn_outlets_on().await.unwrap();
        pdu.turn_outlets_off().await.unwrap();

        let commands: Vec<String> = sent
            .as_text()
            .into_iter()
            .filter(|line| line.starts_with("set outlet"))
            .collect();
        assert_eq!(
            commands,
            vec![
                "set outlet 1 on\n",
                "set outlet 2 on\n",
                "set outlet 3 on\n",
                "set outlet 1 off\n",
                "set outlet 2 off\n",
                "set outlet 3 off\n",
            ]
        );
    }

    #[test]
    fn outlets_are_one_based() {
        let (pdu, _) = pdu(MockTransport::disconnected(), 8);
        assert_eq!(pdu.outlets(), 1..=8);
    }
}
