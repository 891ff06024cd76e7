//! Target disk detection.
//!
//! The installer boots from one of two candidate disks and installs onto the other. The
//! installer media is found by elimination: a disk without a second partition cannot be it,
//! then the media's filesystem UUID, then whatever `/` is mounted from.

use crate::errors::{DiskError, Result};
use crate::settings::Settings;
use crate::uuids::parse_blkid;
use anyhow::Context;
use ister_hal::path::{device_path, partition_path};
use ister_hal::procfs::mountinfo;
use ister_hal::{HostOps, ProbeOps};

pub fn find_target_disk<H>(hal: &H, settings: &Settings) -> Result<String>
where
    H: HostOps + ProbeOps + ?Sized,
{
    let first = settings.first_disk();
    let second = settings.second_disk();

    if !hal.device_exists(&device_path(&partition_path(first, 2))) {
        log::info!("{} has no second partition; installing to it", first);
        return Ok(first.to_string());
    }
    if !hal.device_exists(&device_path(second)) {
        return Err(DiskError::NoTargetDisk.into());
    }
    if !hal.device_exists(&device_path(&partition_path(second, 2))) {
        log::info!("{} has no second partition; installing to it", second);
        return Ok(second.to_string());
    }

    let listing = hal.blkid_listing().context("Call to blkid failed")?;
    if let Some(entry) = parse_blkid(&listing)
        .into_iter()
        .find(|e| e.uuid() == Some(settings.installer_uuid.as_str()))
    {
        log::info!("installer media found on {}", entry.device);
        return Ok(select_disk(&entry.device, settings));
    }

    let entries = mountinfo::parse_mountinfo(&hal.proc_mountinfo().context("Call to mount failed")?);
    if let Some(source) = mountinfo::root_mount_source(&entries) {
        if source.starts_with("/dev/sd") {
            log::info!("installer root is mounted from {}", source);
            return Ok(select_disk(source, settings));
        }
    }

    Err(DiskError::NotDistinguished.into())
}

/// The candidate disk that is not `install_device` (given with or without `/dev/`).
pub fn select_disk(install_device: &str, settings: &Settings) -> String {
    let name = install_device
        .strip_prefix("/dev/")
        .unwrap_or(install_device);
    if name.starts_with(settings.first_disk()) {
        settings.second_disk().to_string()
    } else {
        settings.first_disk().to_string()
    }
}
