//! Host information (read-only).
//!
//! This is "world-touching" (reads `/dev`, `/proc`) and belongs in the HAL.

use crate::HalResult;
use std::path::Path;

pub trait HostOps {
    /// Whether a device node (e.g. `/dev/sda2`) exists.
    fn device_exists(&self, device: &Path) -> bool;

    fn proc_mountinfo(&self) -> HalResult<String>;
}
