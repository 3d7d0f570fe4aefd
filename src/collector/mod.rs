//! Device inventory collection.
//!
//! This module runs the external inventory command and turns its output
//! into exposition samples, with a mock source for testing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Collector                  │
//! │   query ──► parse_records ──► format_sample  │
//! │     │                                        │
//! │ ┌───▼─────────────┐                          │
//! │ │ InventorySource │ (trait)                  │
//! │ └───┬─────────────┘                          │
//! └─────┼────────────────────────────────────────┘
//!       │
//!   ┌───┴──────────────┐
//!   │                  │
//! ┌─▼────────────┐ ┌───▼───────────┐
//! │ SmiCommand   │ │ MockInventory │
//! │ (nvidia-smi) │ │ (Testing)     │
//! └──────────────┘ └───────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use nvsmi_exporter::collector::{Collector, MockInventory};
//!
//! let collector = Collector::new(MockInventory::single_gpu());
//! let sample = collector.collect_sample().unwrap();
//! assert_eq!(sample.lines().len(), 6);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod parser;
pub mod traits;

pub use collector::{Collector, CollectorTiming};
pub use mock::MockInventory;
pub use parser::parse_records;
pub use traits::{InventorySource, SmiCommand};
