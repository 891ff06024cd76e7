//! Mount operations trait.

use crate::HalResult;
use std::path::Path;

/// Mounting, recursive unmounting and mount point queries.
pub trait MountOps {
    /// Mount a device to a target path.
    ///
    /// # Arguments
    /// * `device` - Device path (e.g., `/dev/sda1`)
    /// * `target` - Mount point path
    /// * `fstype` - Filesystem type; `None` lets the system probe it
    /// * `options` - Mount options
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: MountOptions,
    ) -> HalResult<()>;

    /// Unmount a filesystem and everything mounted below it (deepest first).
    fn unmount_recursive(&self, target: &Path) -> HalResult<()>;

    /// Check if a path is currently a mount point.
    fn is_mounted(&self, path: &Path) -> HalResult<bool>;
}

/// Mount flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountOptions {
    pub read_only: bool,
}

impl MountOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_only() -> Self {
        Self { read_only: true }
    }
}
