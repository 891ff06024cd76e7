use crate::errors::Result;
use anyhow::Context;
use ister_hal::{CopyOps, CopyOptions};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Files, ownership, ACLs, xattrs and hard links.
    Full,
    /// Directory structure only.
    Skeleton,
}

/// Replicate `source` into `target`, leaving out `lost+found`.
pub fn copy_tree<H: CopyOps + ?Sized>(
    hal: &H,
    source: &Path,
    target: &Path,
    mode: CopyMode,
) -> Result<()> {
    let opts = match mode {
        CopyMode::Full => CopyOptions::archive(),
        CopyMode::Skeleton => CopyOptions::skeleton(),
    };
    log::info!(
        "copying {} -> {} ({:?})",
        source.display(),
        target.display(),
        mode
    );
    hal.copy_tree(source, target, &opts).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })
}
