//! Bench radio controller for rigbench.
//!
//! This crate drives a radio transceiver on a test bench over its two
//! network links. It provides:
//!
//! - **Command builders** ([`commands`]) -- RCMP opcodes for power,
//!   frequency, transmit/receive, test mode, reboot and battery status, the
//!   debug-console register commands, and the matching reply decoders.
//! - **Radio controller** ([`radio`]) -- [`Radio`], which routes every
//!   command through a retry executor with reconnect and host-recovery
//!   hooks, and handles in-band sentinel readings.
//! - **Host recovery** ([`recovery`]) -- the last-resort USB device cycle.
//! - **Builder** ([`builder`]) -- fluent [`RadioBuilder`] with bench
//!   defaults.
//!
//! # Example
//!
//! ```
//! use rigbench_radio::commands::{cmd_set_tx_freq, parse_ref_osc_register, split_ref_osc_register};
//!
//! // 1 MHz in 5 Hz steps, 100 bandwidth, no deviation.
//! assert_eq!(cmd_set_tx_freq(1_000_000, 100, 0).unwrap(), "000b00030d406400");
//!
//! let word = parse_ref_osc_register("Data received:000A34\r\n").unwrap();
//! assert_eq!(split_ref_osc_register(word), (0x0234, 0x0800));
//! ```

pub mod builder;
pub mod commands;
pub mod radio;
pub mod recovery;

pub use builder::RadioBuilder;
pub use commands::PowerLevel;
pub use radio::{Radio, SentinelPolicy};
pub use recovery::HostRecovery;
