//! Network block device operations (modprobe/qemu-nbd).

use crate::HalResult;
use std::path::Path;

pub trait NbdOps {
    /// Load the `nbd` kernel module with partition scanning for up to `max_part` partitions.
    fn nbd_load_module(&self, max_part: u32) -> HalResult<()>;

    /// Attach an image file to the given NBD device (e.g. `/dev/nbd0`).
    fn nbd_attach(&self, image: &Path, device: &str) -> HalResult<()>;

    /// Detach an NBD device.
    fn nbd_detach(&self, device: &str) -> HalResult<()>;
}
