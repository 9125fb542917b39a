//! Serial bench power control for rigbench.
//!
//! Two device families hang off the bench's serial ports:
//!
//! - **PDU** ([`pdu`]) -- a switched power distribution unit whose console
//!   needs a full login before every command.
//! - **USB relay** ([`relay`]) -- a write-only relay board.
//!
//! Both are built on [`SerialDevice`](device::SerialDevice), which opens
//! the port lazily, retries commands with a port reopen between attempts,
//! and writes its log lines into the logs of the radios it is wired to.
//! Construct them with [`PduBuilder`] and [`RelayBuilder`].

pub mod builder;
pub mod device;
pub mod pdu;
pub mod relay;

pub use builder::{PduBuilder, RelayBuilder};
pub use device::{SerialDevice, SerialPort};
pub use pdu::Pdu;
pub use relay::Relay;
