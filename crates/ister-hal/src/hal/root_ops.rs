//! Process root switching (chroot in / chroot out).

use crate::HalResult;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Handle to a root switch in progress. Dropping it without passing it back to
/// [`RootOps::restore_root`] leaves the process inside the new root; use
/// [`crate::RootGuard`] instead of holding one directly.
#[derive(Debug)]
pub struct RootHandle {
    visible_root: PathBuf,
    real_root: Option<File>,
}

impl RootHandle {
    pub fn new(visible_root: impl Into<PathBuf>, real_root: Option<File>) -> Self {
        Self {
            visible_root: visible_root.into(),
            real_root,
        }
    }

    /// Where the new root's `/` is visible from the current process.
    pub fn visible_root(&self) -> &Path {
        &self.visible_root
    }

    /// Map an absolute path inside the new root to a path usable right now.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let rel = path.as_ref().strip_prefix("/").unwrap_or(path.as_ref());
        self.visible_root.join(rel)
    }

    pub fn into_real_root(self) -> Option<File> {
        self.real_root
    }
}

pub trait RootOps {
    /// Switch the process root to `new_root`, keeping a handle on the real root.
    fn enter_root(&self, new_root: &Path) -> HalResult<RootHandle>;

    /// Return to the real root recorded in `handle`.
    fn restore_root(&self, handle: RootHandle) -> HalResult<()>;
}
