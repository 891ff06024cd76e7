//! Partitioning operations (parted).

use crate::HalResult;
use std::path::Path;

/// A single partition table operation executed via `parted -s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartedOp {
    MkLabel {
        label: String,
    },
    MkPart {
        part_type: String,
        fs_type: String,
        start: String,
        end: String,
    },
    SetFlag {
        part_num: u32,
        flag: String,
        state: String,
    },
}

pub trait PartitionOps {
    /// Execute a single `parted` operation on the given disk.
    fn parted(&self, disk: &Path, op: PartedOp) -> HalResult<String>;
}
