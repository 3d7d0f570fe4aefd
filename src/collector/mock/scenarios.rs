//! Pre-built inventory outputs for testing.
//!
//! Shaped like `nvidia-smi --format=csv,noheader,nounits` output.

use super::inventory::MockInventory;

/// Single RTX 3090 at idle.
pub const SINGLE_GPU: &str = "GeForce RTX 3090, 0, 65, 10, 5, 24576, 20000, 4576\n";

/// Two A100s, one of them busy.
pub const DUAL_GPU: &str = "\
NVIDIA A100-SXM4-80GB, 0, 34, 0, 0, 81920, 81251, 0
NVIDIA A100-SXM4-80GB, 1, 71, 100, 87, 81920, 2415, 78836
";

/// A truncated row, as produced by a driver that drops trailing fields.
pub const TRUNCATED_ROW: &str = "GeForce RTX 3090, 0, 65, 10\n";

impl MockInventory {
    /// A host with one idle GPU.
    pub fn single_gpu() -> Self {
        Self::with_output(SINGLE_GPU)
    }

    /// A host with two GPUs.
    pub fn dual_gpu() -> Self {
        Self::with_output(DUAL_GPU)
    }

    /// A host with no GPUs: the tool succeeds and prints nothing.
    pub fn no_gpus() -> Self {
        Self::with_output("")
    }

    /// A host whose driver returns rows missing fields.
    pub fn truncated_row() -> Self {
        Self::with_output(TRUNCATED_ROW)
    }
}
