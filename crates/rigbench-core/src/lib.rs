//! rigbench-core: Core traits, types, and error definitions for rigbench.
//!
//! This crate defines the device-agnostic pieces every rigbench controller
//! is built from. Radio and power-switching drivers depend on these types
//! without depending on each other.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`RetryExecutor`] / [`RetryPolicy`] -- bounded retry with recovery hooks
//! - [`DeviceLog`] -- per-device append-only text log
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod helpers;
pub mod log;
pub mod retry;
pub mod transport;

// Re-export key types at crate root for ergonomic `use rigbench_core::*`.
pub use error::{Error, Result};
pub use helpers::{ascii_lossy, decode_hex, encode_hex, to_hex_str};
pub use log::DeviceLog;
pub use retry::{BoxFuture, Invocation, RetryExecutor, RetryIf, RetryPolicy};
pub use transport::Transport;
