//! Error types for rigbench.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Errors fall into two tiers:
//!
//! - **Transport errors** ([`Transport`](Error::Transport),
//!   [`Timeout`](Error::Timeout), [`NotConnected`](Error::NotConnected),
//!   [`ConnectionLost`](Error::ConnectionLost), [`Io`](Error::Io),
//!   [`Protocol`](Error::Protocol)) are produced by channels and handled by
//!   the [`RetryExecutor`](crate::retry::RetryExecutor).
//! - **Domain errors** ([`InvalidParameter`](Error::InvalidParameter),
//!   [`Sentinel`](Error::Sentinel), [`CommandRejected`](Error::CommandRejected))
//!   are produced by device controllers after a successful exchange. The
//!   executor returns them without retrying unless a call site opts in.
//!
//! [`RetriesExhausted`](Error::RetriesExhausted) is the terminal error the
//! executor returns once every attempt has failed.

/// The error type for all rigbench operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, TCP socket, Telnet console).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed RCMP frame, unparseable reply).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a response from the device.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a device command.
    ///
    /// These are rejected before any transport call and are never retried.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The device kept answering with an in-band "not yet valid" value.
    #[error("sentinel value persisted: {0}")]
    Sentinel(String),

    /// The device answered, but the answer does not acknowledge the command.
    ///
    /// The raw response is kept for diagnostics.
    #[error("{device} rejected command: {response:?}")]
    CommandRejected { device: String, response: String },

    /// Every attempt allowed by the retry policy failed.
    #[error("failed to execute '{operation}' with params {args} after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        args: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error was raised by a channel rather than by domain
    /// validation.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Protocol(_)
                | Error::Timeout
                | Error::NotConnected
                | Error::ConnectionLost
                | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
