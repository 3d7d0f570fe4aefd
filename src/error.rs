//! Error taxonomy shared by the pipeline and both delivery strategies.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Error type for exporter failures.
///
/// `InventoryUnavailable` and `MalformedRow` are per-request / per-cycle failures.
/// `SinkUnavailable`, `Bind` and `Server` are fatal to the process.
/// `ShutdownTimeout` is reported but never blocks exit.
#[derive(Debug)]
pub enum ExporterError {
    /// The inventory command could not be spawned, or it exited unsuccessfully.
    InventoryUnavailable { command: String, reason: String },
    /// The inventory output could not be tokenized or did not match the metric schema.
    MalformedRow { line: usize, reason: String },
    /// The push output file cannot be opened or replaced.
    SinkUnavailable { path: PathBuf, source: io::Error },
    /// Graceful drain did not finish within the deadline.
    ShutdownTimeout(Duration),
    /// The listen address cannot be bound.
    Bind { addr: SocketAddr, source: io::Error },
    /// The HTTP accept loop failed.
    Server(io::Error),
}

impl ExporterError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        ExporterError::MalformedRow {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn sink(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ExporterError::SinkUnavailable {
            path: path.into(),
            source,
        }
    }
}

impl std::fmt::Display for ExporterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExporterError::InventoryUnavailable { command, reason } => {
                write!(f, "inventory command '{}' unavailable: {}", command, reason)
            }
            ExporterError::MalformedRow { line, reason } => {
                write!(f, "malformed inventory row at line {}: {}", line, reason)
            }
            ExporterError::SinkUnavailable { path, source } => {
                write!(f, "cannot write to {}: {}", path.display(), source)
            }
            ExporterError::ShutdownTimeout(deadline) => {
                write!(f, "shutdown did not complete within {:?}", deadline)
            }
            ExporterError::Bind { addr, source } => {
                write!(f, "failed to bind {}: {}", addr, source)
            }
            ExporterError::Server(e) => write!(f, "server error: {}", e),
        }
    }
}

impl std::error::Error for ExporterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExporterError::SinkUnavailable { source, .. } => Some(source),
            ExporterError::Bind { source, .. } => Some(source),
            ExporterError::Server(e) => Some(e),
            _ => None,
        }
    }
}
