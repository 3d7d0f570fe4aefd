//! Abstraction over the device inventory command to enable testing and mocking.
//!
//! The `InventorySource` trait lets the collector run against the real
//! `nvidia-smi` binary in production and against scripted output in tests.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::trace;

use crate::error::ExporterError;
use crate::exposition::MetricSpec;

/// Source of raw inventory output.
///
/// Implementations are shared across concurrent requests, so `query` takes `&self`
/// and must not rely on state carried between calls.
pub trait InventorySource: Send + Sync + 'static {
    /// Runs one inventory query and returns its raw comma-separated output.
    ///
    /// # Returns
    /// The output bytes, or `ExporterError::InventoryUnavailable` if the query failed.
    fn query(&self) -> Result<Vec<u8>, ExporterError>;
}

/// Real inventory source that spawns `nvidia-smi`.
///
/// One process is spawned per `query` call and reaped before returning.
#[derive(Debug, Clone)]
pub struct SmiCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl SmiCommand {
    /// Default program name, resolved through `PATH`.
    pub const DEFAULT_PROGRAM: &'static str = "nvidia-smi";

    /// Creates a command querying exactly the fields of the metric set, header-free and unit-free.
    ///
    /// # Arguments
    /// * `program` - Path or name of the inventory binary
    /// * `spec` - Metric set whose fields are requested, after `name,index`
    pub fn new(program: impl Into<PathBuf>, spec: &MetricSpec) -> Self {
        Self {
            program: program.into(),
            args: vec![
                format!("--query-gpu={}", spec.query_fields()),
                "--format=csv,noheader,nounits".to_string(),
            ],
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn unavailable(&self, reason: impl Into<String>) -> ExporterError {
        ExporterError::InventoryUnavailable {
            command: self.program.display().to_string(),
            reason: reason.into(),
        }
    }
}

impl Default for SmiCommand {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM, &MetricSpec::gpu())
    }
}

impl InventorySource for SmiCommand {
    fn query(&self) -> Result<Vec<u8>, ExporterError> {
        trace!(program = %self.program.display(), args = ?self.args, "spawning inventory command");

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(if stderr.is_empty() {
                self.unavailable(output.status.to_string())
            } else {
                self.unavailable(format!("{}: {}", output.status, stderr))
            });
        }

        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smi_command_args() {
        let cmd = SmiCommand::default();
        assert_eq!(cmd.program(), Path::new("nvidia-smi"));
        assert_eq!(
            cmd.args(),
            &[
                "--query-gpu=name,index,temperature.gpu,utilization.gpu,utilization.memory,memory.total,memory.free,memory.used",
                "--format=csv,noheader,nounits",
            ]
        );
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let cmd = SmiCommand::new("/nonexistent/path/nvidia-smi-12345", &MetricSpec::gpu());
        let err = cmd.query().unwrap_err();
        match err {
            ExporterError::InventoryUnavailable { command, .. } => {
                assert_eq!(command, "/nonexistent/path/nvidia-smi-12345");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_passes_query_to_program() {
        // `echo` prints its arguments, which shows exactly what the inventory binary receives.
        let cmd = SmiCommand::new("echo", &MetricSpec::gpu());
        let out = String::from_utf8(cmd.query().unwrap()).unwrap();
        assert!(out.starts_with("--query-gpu=name,index,temperature.gpu,"));
        assert!(out.trim_end().ends_with("--format=csv,noheader,nounits"));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_unavailable() {
        let cmd = SmiCommand::new("false", &MetricSpec::gpu());
        let err = cmd.query().unwrap_err();
        assert!(matches!(err, ExporterError::InventoryUnavailable { .. }));
        assert!(err.to_string().contains("exit status"));
    }
}
