//! Relay -- driver for a USB relay board.
//!
//! The board takes `relay on <n>` / `relay off <n>` lines and answers
//! nothing useful, so commands are write-only.

use std::ops::RangeInclusive;

use rigbench_core::Result;

use crate::device::SerialDevice;

/// A USB relay board.
///
/// Constructed via [`RelayBuilder`](crate::builder::RelayBuilder).
#[derive(Debug)]
pub struct Relay {
    device: SerialDevice,
    num_switches: u8,
}

impl Relay {
    pub(crate) fn new(device: SerialDevice, num_switches: u8) -> Self {
        Relay {
            device,
            num_switches,
        }
    }

    pub fn device(&self) -> &SerialDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut SerialDevice {
        &mut self.device
    }

    /// The switch numbers addressed by the all-on/all-off sweeps.
    ///
    /// Switch 0 is included; the board ignores numbers it lacks.
    pub fn switches(&self) -> RangeInclusive<u8> {
        0..=self.num_switches
    }

    pub async fn turn_switch_on(&mut self, switch: u8) -> Result<()> {
        self.device
            .send_command_with_retry(&format!("relay on {switch}"))
            .await
    }

    pub async fn turn_switch_off(&mut self, switch: u8) -> Result<()> {
        self.device
            .send_command_with_retry(&format!("relay off {switch}"))
            .await
    }

    pub async fn turn_all_switches_on(&mut self) -> Result<()> {
        for switch in self.switches() {
            self.turn_switch_on(switch).await?;
        }
        Ok(())
    }

    pub async fn turn_all_switches_off(&mut self) -> Result<()> {
        for switch in self.switches() {
            self.turn_switch_off(switch).await?;
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
    use crate::builder::RelayBuilder;
    use rigbench_core::Error;
    use rigbench_test_harness::{MockTransport, SentLog};
    use std::time::Duration;

    fn relay(mock: MockTransport, switches: u8) -> (Relay, SentLog) {
        let sent = mock.sent_log();
        let relay = RelayBuilder::new("/dev/ttyACM0")
            .num_switches(switches)
            .max_attempts(2)
            .wait_before_retry(Duration::from_secs(1))
            .build_with_transport(Box::new(mock))
            .unwrap();
        (relay, sent)
    }

    #[tokio::test(start_paused = true)]
    async fn all_on_sweeps_from_zero() {
        let mut mock = MockTransport::disconnected();
        for n in 0..=2 {
            mock.expect(format!("relay on {n}\n\r").as_bytes(), b"");
        }

        let (mut relay, sent) = relay(mock, 2);
        relay.turn_all_switches_on().await.unwrap();
        assert_eq!(
            sent.as_text(),
            vec!["relay on 0\n\r", "relay on 1\n\r", "relay on 2\n\r"]
        );
        assert!(relay.device().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn all_off_sweeps_from_zero() {
        let mut mock = MockTransport::disconnected();
        for n in 0..=4 {
            mock.expect(format!("relay off {n}\n\r").as_bytes(), b"");
        }

        let (mut relay, sent) = relay(mock, 4);
        relay.turn_all_switches_off().await.unwrap();
        assert_eq!(sent.len(), 5);
        assert_eq!(sent.as_text()[4], "relay off 4\n\r");
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_board_stops_the_sweep() {
        let mut mock = MockTransport::disconnected();
        mock.fail_next_connects(10);

        let (mut relay, sent) = relay(mock, 4);
        let result = relay.turn_all_switches_on().await;
        assert!(matches!(result, Err(Error::RetriesExhausted { .. })));
        assert!(sent.is_empty());
    }

    #[test]
    fn default_board_has_four_switches() {
        let relay = RelayBuilder::new("/dev/ttyACM0")
            .build_with_transport(Box::new(MockTransport::disconnected()))
            .unwrap();
        assert_eq!(relay.switches(), 0..=4);
        assert_eq!(relay.device().name(), "USBRelay");
    }
}
