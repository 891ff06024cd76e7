//! Device probing operations (blkid).

use crate::HalResult;

/// Probing operations trait.
pub trait ProbeOps {
    /// Full `blkid` listing: one `<device>: KEY="value" ...` line per block device.
    fn blkid_listing(&self) -> HalResult<String>;
}
