//! Teardown of an install's mount session.
//!
//! Order: target tree, source tree, NBD attachment, staged image, temporary directories.
//! A temporary directory that still has anything mounted on or below it is never removed.

use crate::errors::Result;
use crate::mounts::MountSession;
use anyhow::Context;
use ister_hal::procfs::mountinfo;
use ister_hal::{HostOps, MountOps, NbdOps};
use std::fs;
use std::io;
use std::path::Path;

/// Take everything down, stopping at the first failure.
pub fn cleanup<H>(hal: &H, session: &mut MountSession) -> Result<()>
where
    H: MountOps + NbdOps + HostOps + ?Sized,
{
    run_steps(hal, session, |step, result| {
        result.with_context(|| format!("Cleanup failed to {}", step))
    })
}

/// Take down as much as possible. Failures are logged and otherwise ignored.
pub fn cleanup_best_effort<H>(hal: &H, session: &mut MountSession)
where
    H: MountOps + NbdOps + HostOps + ?Sized,
{
    let _ = run_steps(hal, session, |step, result| {
        if let Err(err) = result {
            log::warn!("cleanup: failed to {}: {:#}", step, err);
        }
        Ok(())
    });
}

fn run_steps<H, F>(hal: &H, session: &mut MountSession, mut check: F) -> Result<()>
where
    H: MountOps + NbdOps + HostOps + ?Sized,
    F: FnMut(&str, Result<()>) -> Result<()>,
{
    if let Some(target) = session.target_dir.clone() {
        let result = hal.unmount_recursive(&target).map_err(Into::into);
        check(&format!("unmount {}", target.display()), result)?;
    }
    if let Some(source) = session.source_dir.clone() {
        let result = hal.unmount_recursive(&source).map_err(Into::into);
        check(&format!("unmount {}", source.display()), result)?;
    }
    if let Some(device) = session.nbd_device.take() {
        let result = hal.nbd_detach(&device).map_err(Into::into);
        check(&format!("detach {}", device), result)?;
    }
    if let Some(image) = session.staged_image.take() {
        let result = remove_file_if_present(&image);
        check(&format!("remove {}", image.display()), result)?;
    }
    if let Some(target) = session.target_dir.take() {
        let result = remove_temp_dir(hal, &target);
        check(&format!("remove {}", target.display()), result)?;
    }
    if let Some(source) = session.source_dir.take() {
        let result = remove_temp_dir(hal, &source);
        check(&format!("remove {}", source.display()), result)?;
    }
    Ok(())
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn still_mounted<H: MountOps + HostOps + ?Sized>(hal: &H, dir: &Path) -> Result<bool> {
    if hal.is_mounted(dir)? {
        return Ok(true);
    }
    let entries = mountinfo::parse_mountinfo(&hal.proc_mountinfo()?);
    Ok(!mountinfo::mounts_under(dir, &entries).is_empty())
}

fn remove_temp_dir<H: MountOps + HostOps + ?Sized>(hal: &H, dir: &Path) -> Result<()> {
    if still_mounted(hal, dir)? {
        log::warn!("{} is still mounted; leaving it in place", dir.display());
        return Ok(());
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
