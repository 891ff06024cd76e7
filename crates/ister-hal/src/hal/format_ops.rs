//! Filesystem creation operations trait.

use crate::HalResult;
use std::path::Path;

/// Trait for laying down filesystems on block devices.
pub trait FormatOps {
    /// Run a filesystem creation tool against a device.
    ///
    /// # Arguments
    /// * `program` - Creation tool (e.g., `mkfs.ext4`, `mkswap`)
    /// * `device` - Block device path (e.g., `/dev/sda1`)
    /// * `opts` - Extra arguments placed before the device
    fn make_filesystem(&self, program: &str, device: &Path, opts: &FormatOptions) -> HalResult<()>;
}

/// Options for formatting operations.
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    /// Additional arguments to pass to the format command
    pub extra_args: Vec<String>,
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}
