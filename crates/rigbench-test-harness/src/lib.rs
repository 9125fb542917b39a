//! rigbench-test-harness: Test utilities and mock transports for rigbench.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! channels and device controllers without bench hardware, and
//! [`MockTcpServer`] for exercising the real TCP transport against a
//! scripted peer.

pub mod mock_tcp;
pub mod mock_transport;

pub use mock_tcp::MockTcpServer;
pub use mock_transport::{ConnectCounter, MockTransport, SentLog};
