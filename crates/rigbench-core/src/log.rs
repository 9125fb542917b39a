//! Per-device text log sink.
//!
//! [`DeviceLog`] implements the bench logging contract shared by every
//! device controller: each call produces one line which is echoed to the
//! console (unless `write_only`) and appended to `<log_dir>/<identifier>.txt`
//! when a log directory is configured.
//!
//! Every line is also emitted as a `tracing` event, so applications that
//! install a subscriber get the same messages with structured fields.
//!
//! # Example
//!
//! ```no_run
//! use rigbench_core::DeviceLog;
//!
//! let log = DeviceLog::new("Radio", "bench-left").with_log_dir("/tmp/bench-logs");
//! log.log("entering test mode");
//! log.log_with("battery 87%", ">> ", true);
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Timestamp format used in metadata-prefixed lines.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only, line-oriented log for one device.
///
/// Cloning a `DeviceLog` yields a handle writing to the same file, which is
/// how serial devices mirror their messages into an associated radio's log.
#[derive(Debug, Clone)]
pub struct DeviceLog {
    /// Device family shown in the metadata column (e.g. `Radio`).
    kind: String,
    /// Nickname or address; also the log file stem.
    identifier: String,
    log_dir: Option<PathBuf>,
    /// Whether lines carry the `time | kind 'id' |` metadata prefix.
    metadata: bool,
}

impl DeviceLog {
    /// Create a console-only log with timestamped metadata lines.
    pub fn new(kind: &str, identifier: &str) -> Self {
        Self {
            kind: kind.to_string(),
            identifier: identifier.to_string(),
            log_dir: None,
            metadata: true,
        }
    }

    /// Create a console-only log that prints messages verbatim.
    ///
    /// This is the generic sink used by serial devices that have no
    /// associated radio.
    pub fn plain(identifier: &str) -> Self {
        Self {
            kind: String::new(),
            identifier: identifier.to_string(),
            log_dir: None,
            metadata: false,
        }
    }

    /// Append every line to `<dir>/<identifier>.txt` as well.
    pub fn with_log_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.log_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// The identifier shown in log lines.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Path of the backing log file, if a log directory is configured.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.txt", self.identifier)))
    }

    /// Log a message to the console and the log file.
    pub fn log(&self, text: &str) {
        self.log_with(text, "", false);
    }

    /// Log a message with a line prefix, optionally skipping the console.
    ///
    /// Empty messages are ignored.
    pub fn log_with(&self, text: &str, prefix: &str, write_only: bool) {
        if text.is_empty() {
            return;
        }

        let line = self.format_line(text, prefix);
        tracing::debug!(device = %self.identifier, message = %text, "device log");

        if !write_only {
            println!("{line}");
        }

        if let Some(path) = self.log_file() {
            if let Err(e) = append_line(&path, &line) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to append to device log file"
                );
            }
        }
    }

    /// Render the line that [`log_with`](Self::log_with) would write.
    pub fn format_line(&self, text: &str, prefix: &str) -> String {
        if self.metadata {
            let now = chrono::Local::now().format(TIMESTAMP_FORMAT);
            format!(
                "{prefix}{now} | {} '{}' | {text}",
                self.kind, self.identifier
            )
        } else {
            format!("{prefix}{text}")
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}
