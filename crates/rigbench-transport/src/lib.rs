//! Transport implementations and framed channels for rigbench.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](rigbench_core::Transport) trait from `rigbench-core` and
//! the channels that frame commands on top of them:
//!
//! - [`TcpTransport`]: TCP links to the radio (RCMP port and debug console)
//! - [`SerialTransport`]: USB/RS-232 ports for PDUs and relay boards
//! - [`rcmp`]: the length-prefixed RCMP frame codec
//! - [`SocketChannel`]: RCMP (or CRLF text) request/reply over a transport
//! - [`TelnetChannel`]: the radio's debug console
//! - [`SerialChannel`]: newline-terminated serial consoles
//!
//! # Example
//!
//! ```no_run
//! use rigbench_transport::{SerialChannel, SerialProfile};
//!
//! # async fn example() -> rigbench_core::Result<()> {
//! let mut pdu = SerialChannel::for_port("/dev/ttyUSB0", SerialProfile::Pdu);
//! pdu.open().await?;
//! let reply = pdu.exchange("abc").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod rcmp;
pub mod serial;
pub mod serial_channel;
pub mod socket;
pub mod tcp;
pub mod telnet;

pub use serial::{
    DataBits, FlowControl, Parity, SerialConfig, SerialProfile, SerialTransport, StopBits,
};
pub use serial_channel::SerialChannel;
pub use socket::{FrameMode, Reply, SocketChannel};
pub use tcp::TcpTransport;
pub use telnet::{CommandEncoding, TelnetChannel, TelnetReply, TELNET_PORT, TELNET_TIMEOUT};
