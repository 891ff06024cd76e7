//! Image staging operations.

use crate::HalResult;
use std::path::Path;

pub trait ImageOps {
    /// Decompress an `.xz` image into `dest`, returning the number of bytes written.
    fn decompress_xz(&self, compressed: &Path, dest: &Path) -> HalResult<u64>;
}
