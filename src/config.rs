//! Startup configuration.
//!
//! Built once by the binary from command-line flags and handed to the lifecycle
//! controller by reference.

use std::net::{Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::collector::SmiCommand;

/// Where the push writer sends samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Standard output, kept open across cycles.
    Stdout,
    /// A file, fully replaced every cycle.
    File(PathBuf),
}

impl OutputTarget {
    /// Interprets the text output flag: `""` means no output (pull mode), `-` is stdout.
    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "" => None,
            "-" => Some(OutputTarget::Stdout),
            path => Some(OutputTarget::File(PathBuf::from(path))),
        }
    }
}

impl std::fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputTarget::Stdout => write!(f, "stdout"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The delivery strategy selected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Serve samples over HTTP on request.
    Pull,
    /// Write samples on a fixed interval.
    Push(OutputTarget),
}

/// Exporter configuration.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// HTTP listen address (pull mode).
    pub listen: SocketAddr,
    /// Push output; `None` selects pull mode.
    pub output: Option<OutputTarget>,
    /// Time between push cycles.
    pub interval: Duration,
    /// Upper bound on graceful drain after the shutdown signal.
    pub shutdown_timeout: Duration,
    /// HTTP path serving the exposition text.
    pub metrics_path: String,
    /// Inventory binary to spawn.
    pub smi_path: PathBuf,
}

impl ExporterConfig {
    pub const DEFAULT_LISTEN: &'static str = ":9100";
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_METRICS_PATH: &'static str = "/metrics";

    pub fn mode(&self) -> DeliveryMode {
        match &self.output {
            None => DeliveryMode::Pull,
            Some(target) => DeliveryMode::Push(target.clone()),
        }
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv6Addr::UNSPECIFIED, 9100)),
            output: None,
            interval: Self::DEFAULT_INTERVAL,
            shutdown_timeout: Self::DEFAULT_SHUTDOWN_TIMEOUT,
            metrics_path: Self::DEFAULT_METRICS_PATH.to_string(),
            smi_path: PathBuf::from(SmiCommand::DEFAULT_PROGRAM),
        }
    }
}

/// Parses a listen address.
///
/// A bare `:port` means every interface and maps to `[::]:port`, which the
/// server binds dual-stack (or IPv4 only on hosts without IPv6).
pub fn parse_listen_addr(s: &str) -> Result<SocketAddr, String> {
    let s = s.trim();
    let full = if s.starts_with(':') {
        format!("[::]{}", s)
    } else {
        s.to_string()
    };

    full.parse()
        .map_err(|e| format!("invalid listen address '{}': {}", s, e))
}

/// Parses a duration string in Go notation: a sequence of decimal numbers, each
/// with an optional fraction and a unit (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`),
/// such as "5s", "1.5s" or "1m30s".
///
/// A bare integer is taken as milliseconds. Zero is rejected.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let duration = match s.parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => parse_go_duration(s)?,
    };

    if duration.is_zero() {
        return Err(format!("duration '{}' must be positive", s));
    }
    Ok(duration)
}

fn parse_go_duration(s: &str) -> Result<Duration, String> {
    let is_number = |c: char| c.is_ascii_digit() || c == '.';

    let mut nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let (number, tail) = rest.split_at(rest.find(|c| !is_number(c)).unwrap_or(rest.len()));
        let (unit, tail) = tail.split_at(tail.find(is_number).unwrap_or(tail.len()));

        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{}'", s))?;
        let unit_nanos = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration '{}'", s)),
            other => return Err(format!("unknown unit '{}' in duration '{}'", other, s)),
        };

        nanos += value * unit_nanos;
        rest = tail;
    }

    if nanos > u64::MAX as f64 {
        return Err(format!("duration '{}' is too large", s));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

/// Validates the HTTP metrics path.
pub fn parse_metrics_path(s: &str) -> Result<String, String> {
    let trimmed = s.trim().trim_end_matches('/');
    if !s.trim().starts_with('/') {
        return Err(format!("metrics path '{}' must start with '/'", s));
    }
    if trimmed.is_empty() {
        return Err("metrics path must not be the root".to_string());
    }
    Ok(trimmed.to_string())
}
