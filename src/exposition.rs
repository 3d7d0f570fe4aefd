//! Exposition text formatting.
//!
//! Turns parsed inventory records into `name{gpu="<name>[<index>]"} value` lines.
//! Formatting is pure and does no I/O, so a `Sample` can be inspected line by line.

use crate::error::ExporterError;

/// Inventory fields that label a device. Always queried first, in this order.
pub const LABEL_FIELDS: [&str; 2] = ["name", "index"];

/// Inventory fields exported as metrics, in query order.
pub const GPU_METRIC_FIELDS: [&str; 6] = [
    "temperature.gpu",
    "utilization.gpu",
    "utilization.memory",
    "memory.total",
    "memory.free",
    "memory.used",
];

/// One parsed inventory row.
///
/// Field 0 is the device name, field 1 the device index, the rest are metric values
/// in `MetricSpec` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// 1-based line of the row in the inventory output.
    pub line: usize,
    pub fields: Vec<String>,
}

impl DeviceRecord {
    pub fn new(line: usize, fields: Vec<String>) -> Self {
        Self { line, fields }
    }
}

/// Fixed, ordered binding of record positions `2..` to metric identifiers.
#[derive(Debug, Clone)]
pub struct MetricSpec {
    query_fields: Vec<&'static str>,
    identifiers: Vec<String>,
}

impl MetricSpec {
    /// Builds a metric set from inventory field names. Identifiers are derived once here.
    pub fn new(query_fields: &[&'static str]) -> Self {
        let identifiers = query_fields
            .iter()
            .map(|field| field.replace('.', "_"))
            .collect();
        Self {
            query_fields: query_fields.to_vec(),
            identifiers,
        }
    }

    /// The standard GPU telemetry spec.
    pub fn gpu() -> Self {
        Self::new(&GPU_METRIC_FIELDS)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Number of fields a record must carry.
    pub fn record_width(&self) -> usize {
        LABEL_FIELDS.len() + self.len()
    }

    /// Comma-joined field list for the inventory query, labels first.
    pub fn query_fields(&self) -> String {
        LABEL_FIELDS
            .iter()
            .chain(self.query_fields.iter())
            .copied()
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for MetricSpec {
    fn default() -> Self {
        Self::gpu()
    }
}

/// The exposition lines produced by one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sample {
    lines: Vec<String>,
    devices: usize,
}

impl Sample {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn devices(&self) -> usize {
        self.devices
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Joins all lines, each terminated by `\n`.
    pub fn render(&self) -> String {
        let capacity = self.lines.iter().map(|l| l.len() + 1).sum();
        let mut out = String::with_capacity(capacity);
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Formats records into a `Sample`.
///
/// Fails fast: one short record aborts the whole run, no partial sample is returned.
/// Trailing fields beyond the metric set are ignored.
pub fn format_sample(
    records: &[DeviceRecord],
    spec: &MetricSpec,
) -> Result<Sample, ExporterError> {
    let width = spec.record_width();
    let mut lines = Vec::with_capacity(records.len() * spec.len());

    for record in records {
        if record.fields.len() < width {
            return Err(ExporterError::malformed(
                record.line,
                format!("expected {} fields, got {}", width, record.fields.len()),
            ));
        }

        let device = format!("{}[{}]", record.fields[0], record.fields[1]);
        let values = &record.fields[LABEL_FIELDS.len()..width];
        for (metric, value) in spec.identifiers().iter().zip(values) {
            lines.push(format!("{}{{gpu=\"{}\"}} {}", metric, device, value));
        }
    }

    Ok(Sample {
        lines,
        devices: records.len(),
    })
}
