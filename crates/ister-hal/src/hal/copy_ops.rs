//! Tree copy operations (rsync).

use crate::HalResult;
use std::path::Path;

/// Options controlling how trees are copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    /// Replicate directories only, no file contents.
    pub skeleton: bool,
    /// Entry names left out of the copy.
    pub excludes: Vec<String>,
}

impl CopyOptions {
    /// Archive-style copy preserving ACLs, xattrs and hard links (like `rsync -aAHX`).
    pub fn archive() -> Self {
        Self {
            skeleton: false,
            excludes: vec!["lost+found".to_string()],
        }
    }

    /// Directory structure only.
    pub fn skeleton() -> Self {
        Self {
            skeleton: true,
            ..Self::archive()
        }
    }
}

/// Copy operations abstraction.
pub trait CopyOps {
    /// Recursively copy the contents of `src` into `dst`.
    fn copy_tree(&self, src: &Path, dst: &Path, opts: &CopyOptions) -> HalResult<()>;
}
