//! # rigbench -- bench control for radio test stations
//!
//! `rigbench` drives the hardware on a radio test bench from async Rust:
//! the radio under test over its RCMP and debug-console links, and the
//! serial power gear around it (a switched PDU and a USB relay board).
//!
//! ## Quick Start
//!
//! ```no_run
//! use rigbench::radio::{PowerLevel, RadioBuilder};
//!
//! #[tokio::main]
//! async fn main() -> rigbench::Result<()> {
//!     let mut radio = RadioBuilder::new("192.168.128.1").build()?;
//!     radio.enter_test_mode().await?;
//!     radio.set_tx_power_level(PowerLevel::High).await?;
//!     radio.set_tx_freq_hz(450_000_000, 100, 0).await?;
//!     println!("battery: {}%", radio.get_battery_level().await?);
//!     radio.close_connections().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                | Purpose                                            |
//! |----------------------|----------------------------------------------------|
//! | `rigbench-core`      | Errors, [`Transport`] trait, retry executor, logs  |
//! | `rigbench-transport` | TCP, telnet, RCMP socket and serial channels       |
//! | `rigbench-radio`     | Radio controller and host-level recovery           |
//! | `rigbench-power`     | PDU and USB relay controllers                      |
//! | **`rigbench`**       | This facade crate -- re-exports everything         |
//!
//! Every device command runs through a [`RetryExecutor`]: a bounded number
//! of attempts with a fixed wait, a reconnect between attempts, and (for
//! radios) a last-resort USB device cycle before the final attempt.
//!
//! ## Feature Flags
//!
//! | Feature | Enables                       | Default |
//! |---------|-------------------------------|---------|
//! | `radio` | [`radio`] module              | yes     |
//! | `power` | [`power`] module (PDU, relay) | yes     |

pub use rigbench_core::*;

/// Transport implementations and framed channels.
pub mod transport {
    pub use rigbench_transport::*;
}

/// Radio controller.
///
/// Provides [`Radio`](radio::Radio) and
/// [`RadioBuilder`](radio::RadioBuilder) for driving a radio over its RCMP
/// control port and its telnet debug console.
#[cfg(feature = "radio")]
pub mod radio {
    pub use rigbench_radio::*;
}

/// Serial power control.
///
/// Provides [`Pdu`](power::Pdu) and [`Relay`](power::Relay) with their
/// builders.
#[cfg(feature = "power")]
pub mod power {
    pub use rigbench_power::*;
}
