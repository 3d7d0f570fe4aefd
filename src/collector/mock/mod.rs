//! Mock inventory sources for testing.
//!
//! This module provides `MockInventory` and pre-built scenarios for testing
//! the pipeline and both delivery strategies without `nvidia-smi` installed.

mod inventory;
mod scenarios;

pub use inventory::MockInventory;
