//! nvsmi-exporter - GPU telemetry exporter library.
//!
//! Samples `nvidia-smi` and republishes temperature, utilization and memory
//! per device in the text exposition format, either:
//! - on demand over HTTP (pull mode, `server`), or
//! - on a fixed interval to a file or stdout (push mode, `writer`).
//!
//! Modules:
//! - `collector` - inventory query, row parsing, pipeline driver
//! - `exposition` - metric set and exposition line formatting
//! - `server` - pull mode HTTP endpoint
//! - `writer` - push mode periodic writer
//! - `error` - error taxonomy
//! - `config` - startup configuration and flag value parsers
//! - `shutdown` - process-wide cancellation token
//! - `lifecycle` - selects and drives the delivery strategy

pub mod collector;
pub mod config;
pub mod error;
pub mod exposition;
pub mod lifecycle;
pub mod server;
pub mod shutdown;
pub mod writer;

pub use error::ExporterError;

/// Crate version, for startup logging.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
