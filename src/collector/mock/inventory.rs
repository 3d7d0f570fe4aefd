//! In-memory inventory source with scripted responses.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::collector::traits::InventorySource;
use crate::error::ExporterError;

/// One scripted answer to a query.
#[derive(Debug, Clone)]
enum Response {
    Output(Vec<u8>),
    Failure(String),
}

/// Inventory source for testing.
///
/// Answers queries from a script of responses, in order. Once the script runs out,
/// the last response repeats. Counts queries so tests can assert how many
/// pipeline runs happened.
#[derive(Debug, Default)]
pub struct MockInventory {
    script: Mutex<Vec<Response>>,
    cursor: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
}

impl MockInventory {
    /// Creates a mock with an empty script. Queries return empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that always returns `output`.
    pub fn with_output(output: impl Into<Vec<u8>>) -> Self {
        let mock = Self::new();
        mock.push_output(output);
        mock
    }

    /// Creates a mock whose queries always fail with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.push_failure(reason);
        mock
    }

    /// Makes every query sleep before answering, to simulate a slow inventory tool.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Appends a successful response to the script.
    pub fn push_output(&self, output: impl Into<Vec<u8>>) {
        self.script
            .lock()
            .unwrap()
            .push(Response::Output(output.into()));
    }

    /// Appends a failing response to the script.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push(Response::Failure(reason.into()));
    }

    /// Number of queries made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InventorySource for MockInventory {
    fn query(&self) -> Result<Vec<u8>, ExporterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let script = self.script.lock().unwrap();
        let Some(last) = script.len().checked_sub(1) else {
            return Ok(Vec::new());
        };
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst).min(last);

        match &script[idx] {
            Response::Output(out) => Ok(out.clone()),
            Response::Failure(reason) => Err(ExporterError::InventoryUnavailable {
                command: "mock".to_string(),
                reason: reason.clone(),
            }),
        }
    }
}
