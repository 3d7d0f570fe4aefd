//! Push delivery: write a fresh sample to a file or stdout on a fixed interval.
//!
//! File output is replaced atomically when the target's directory is writable:
//! the sample is written to a temporary file next to the real target (symlinks
//! resolved) and renamed over it, so readers see either the previous cycle's
//! content or the new one. When only the file itself is writable, it is truncated
//! and rewritten in place instead. Either way a failed pipeline run leaves the
//! previous content untouched.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::collector::{Collector, InventorySource};
use crate::config::OutputTarget;
use crate::error::ExporterError;
use crate::exposition::Sample;
use crate::shutdown::ShutdownToken;

/// Mode given to an output file the writer creates.
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o660;

/// How a file target is rewritten each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStrategy {
    /// Temporary file in the same directory, renamed over the target.
    Replace,
    /// Truncate and write the target itself. Used when its directory is read-only.
    InPlace,
}

/// A file output target, checked at startup.
#[derive(Debug)]
pub struct FileSink {
    /// Path as configured, for display.
    path: PathBuf,
    /// Where bytes actually land (symlinks resolved).
    target: PathBuf,
    strategy: FileStrategy,
}

impl FileSink {
    /// Opens (creating if needed) the target and picks the write strategy.
    ///
    /// Fails with `SinkUnavailable` if the file itself cannot be opened for writing.
    /// An existing file keeps its content and permissions.
    pub fn open(path: &Path) -> Result<Self, ExporterError> {
        let existed = fs::metadata(path).is_ok();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ExporterError::sink(path, e))?;

        if !existed {
            set_new_file_mode(&file).map_err(|e| ExporterError::sink(path, e))?;
        }
        drop(file);

        let target = fs::canonicalize(path).map_err(|e| ExporterError::sink(path, e))?;
        let strategy = match tempfile::Builder::new()
            .prefix(".nvsmi-exporter")
            .suffix(".tmp")
            .tempfile_in(parent_dir(&target))
        {
            Ok(_scratch) => FileStrategy::Replace,
            Err(e) => {
                warn!(
                    path = %target.display(),
                    error = %e,
                    "directory not writable, rewriting output file in place"
                );
                FileStrategy::InPlace
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            target,
            strategy,
        })
    }

    pub fn strategy(&self) -> FileStrategy {
        self.strategy
    }

    /// Resolved location written to.
    pub fn target(&self) -> &Path {
        &self.target
    }

    fn write_contents(&self, contents: &[u8]) -> io::Result<()> {
        match self.strategy {
            FileStrategy::Replace => replace_file(&self.target, contents),
            FileStrategy::InPlace => rewrite_file(&self.target, contents),
        }
    }
}

/// Destination of push output.
pub enum Sink {
    /// Held open for the writer's whole lifetime.
    Stdout(io::Stdout),
    /// Rewritten on every write.
    File(FileSink),
}

impl Sink {
    /// Opens the sink, checking up front that a file target is writable.
    ///
    /// An existing file is left untouched until the first successful cycle.
    pub fn open(target: &OutputTarget) -> Result<Self, ExporterError> {
        match target {
            OutputTarget::Stdout => Ok(Sink::Stdout(io::stdout())),
            OutputTarget::File(path) => Ok(Sink::File(FileSink::open(path)?)),
        }
    }

    /// Writes one sample, replacing whatever the previous cycle wrote to a file.
    pub fn write_sample(&mut self, sample: &Sample) -> Result<(), ExporterError> {
        match self {
            Sink::Stdout(stdout) => {
                let mut out = stdout.lock();
                out.write_all(sample.render().as_bytes())
                    .and_then(|_| out.flush())
                    .map_err(|e| ExporterError::sink("-", e))
            }
            Sink::File(file) => file
                .write_contents(sample.render().as_bytes())
                .map_err(|e| ExporterError::sink(&file.path, e)),
        }
    }
}

impl std::fmt::Display for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::Stdout(_) => write!(f, "stdout"),
            Sink::File(file) => write!(f, "{}", file.path.display()),
        }
    }
}

#[cfg(unix)]
fn set_new_file_mode(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(NEW_FILE_MODE))
}

#[cfg(not(unix))]
fn set_new_file_mode(_file: &File) -> io::Result<()> {
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

/// Atomically replaces `path` with `contents` via a temporary file in the same directory.
///
/// The replacement carries the permissions of the file it replaces.
fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".nvsmi-exporter")
        .suffix(".tmp")
        .tempfile_in(parent_dir(path))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    match fs::metadata(path) {
        Ok(meta) => tmp.as_file().set_permissions(meta.permissions())?,
        Err(_) => set_new_file_mode(tmp.as_file())?,
    }

    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Truncates `path` and writes `contents` into the existing file.
fn rewrite_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Periodic sample writer.
pub struct PushWriter<S: InventorySource> {
    collector: Arc<Collector<S>>,
    sink: Sink,
    interval: Duration,
}

impl<S: InventorySource> PushWriter<S> {
    /// Creates a writer, opening the output target.
    ///
    /// Fails with `SinkUnavailable` if a file target cannot be opened.
    pub fn new(
        collector: Arc<Collector<S>>,
        target: &OutputTarget,
        interval: Duration,
    ) -> Result<Self, ExporterError> {
        Ok(Self {
            collector,
            sink: Sink::open(target)?,
            interval,
        })
    }

    /// Runs cycles until `shutdown` fires.
    ///
    /// Shutdown is checked before each cycle and raced against the interval wait;
    /// no final write happens after it fires. Pipeline failures are logged and the
    /// loop continues; sink failures end the loop with an error.
    pub async fn run(mut self, shutdown: ShutdownToken) -> Result<(), ExporterError> {
        info!(
            output = %self.sink,
            interval_ms = self.interval.as_millis() as u64,
            "writing samples"
        );

        let mut cycles: u64 = 0;
        loop {
            if shutdown.is_triggered() {
                break;
            }

            if self.cycle().await? {
                cycles += 1;
            }

            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(cycles, "push writer stopped");
        Ok(())
    }

    /// Runs one pipeline pass and writes the result.
    ///
    /// Returns whether a sample was written.
    pub async fn cycle(&mut self) -> Result<bool, ExporterError> {
        let collector = self.collector.clone();
        let result = tokio::task::spawn_blocking(move || collector.collect_sample()).await;

        match result {
            Ok(Ok(sample)) => {
                self.sink.write_sample(&sample)?;
                debug!(
                    output = %self.sink,
                    devices = sample.devices(),
                    lines = sample.lines().len(),
                    "sample written"
                );
                Ok(true)
            }
            Ok(Err(e)) => {
                error!(error = %e, "failed to collect metrics");
                Ok(false)
            }
            Err(e) => {
                error!(error = %e, "metrics collection panicked in spawn_blocking");
                Ok(false)
            }
        }
    }
}
