//! Pipeline driver: inventory query, row parsing and exposition formatting.
//!
//! The `Collector` struct turns one inventory query into one `Sample`.
//! It holds no state between runs and is shared by reference across requests.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::collector::parser::parse_records;
use crate::collector::traits::InventorySource;
use crate::error::ExporterError;
use crate::exposition::{MetricSpec, Sample, format_sample};

/// Timing of each pipeline phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectorTiming {
    /// Whole pipeline run.
    pub total: Duration,
    /// Time spent in the inventory command.
    pub query: Duration,
    /// Time to tokenize the output.
    pub parse: Duration,
    /// Time to build exposition lines.
    pub format: Duration,
}

/// Runs the telemetry pipeline against an inventory source.
pub struct Collector<S: InventorySource> {
    source: S,
    spec: MetricSpec,
}

impl<S: InventorySource> Collector<S> {
    /// Creates a collector exporting the standard GPU metrics.
    pub fn new(source: S) -> Self {
        Self::with_spec(source, MetricSpec::gpu())
    }

    /// Creates a collector with a custom metric spec.
    ///
    /// The source must query fields in the same order as the `MetricSpec`.
    pub fn with_spec(source: S, spec: MetricSpec) -> Self {
        Self { source, spec }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn spec(&self) -> &MetricSpec {
        &self.spec
    }

    /// Runs one full pipeline pass.
    ///
    /// Blocks while the inventory command runs.
    pub fn collect_sample(&self) -> Result<Sample, ExporterError> {
        self.collect_timed().map(|(sample, _)| sample)
    }

    /// Like `collect_sample`, also reporting where time was spent.
    pub fn collect_timed(&self) -> Result<(Sample, CollectorTiming), ExporterError> {
        let start = Instant::now();
        let mut timing = CollectorTiming::default();

        let raw = self.source.query()?;
        timing.query = start.elapsed();

        let t = Instant::now();
        let records = parse_records(&raw)?;
        timing.parse = t.elapsed();

        let t = Instant::now();
        let sample = format_sample(&records, &self.spec)?;
        timing.format = t.elapsed();
        timing.total = start.elapsed();

        debug!(
            devices = sample.devices(),
            lines = sample.lines().len(),
            query_us = timing.query.as_micros() as u64,
            total_us = timing.total.as_micros() as u64,
            "sample collected"
        );

        Ok((sample, timing))
    }
}
