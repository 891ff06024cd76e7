use crate::{HalResult, RootHandle, RootOps};
use std::path::{Path, PathBuf};

/// RAII guard that owns a root switch and restores the real root when dropped.
///
/// Call [`RootGuard::restore`] on the success path to surface restore failures; the drop path
/// only logs them so the error that caused the early exit is not replaced.
#[derive(Debug)]
pub struct RootGuard<'a, H: RootOps + ?Sized> {
    hal: &'a H,
    handle: Option<RootHandle>,
}

impl<'a, H: RootOps + ?Sized> RootGuard<'a, H> {
    pub fn enter(hal: &'a H, new_root: &Path) -> HalResult<Self> {
        let handle = hal.enter_root(new_root)?;
        log::debug!("entered root {}", new_root.display());
        Ok(Self {
            hal,
            handle: Some(handle),
        })
    }

    /// Map an absolute path inside the new root to a path usable while the guard is held.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        match &self.handle {
            Some(handle) => handle.resolve(path),
            None => path.as_ref().to_path_buf(),
        }
    }

    /// Restore the real root, reporting failure.
    pub fn restore(mut self) -> HalResult<()> {
        match self.handle.take() {
            Some(handle) => self.hal.restore_root(handle),
            None => Ok(()),
        }
    }
}

impl<'a, H: RootOps + ?Sized> Drop for RootGuard<'a, H> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(err) = self.hal.restore_root(handle) {
            log::warn!("root guard failed to restore the real root: {}", err);
        }
    }
}
