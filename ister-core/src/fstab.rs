use crate::errors::Result;
use crate::uuids::ResolvedPartition;
use anyhow::Context;
use std::fs;
use std::path::Path;

pub const DEFAULT_MOUNT_OPTIONS: &str = "rw,relatime";

pub fn fstab_line(part: &ResolvedPartition) -> String {
    format!(
        "UUID={} {} {} {} 0 0",
        part.uuid,
        part.mount,
        part.fs_type,
        part.options.as_deref().unwrap_or(DEFAULT_MOUNT_OPTIONS)
    )
}

pub fn render_fstab(resolved: &[ResolvedPartition]) -> String {
    resolved
        .iter()
        .map(|p| fstab_line(p) + "\n")
        .collect()
}

/// Replace `<target>/etc/fstab` with one entry per resolved partition.
pub fn write_fstab(resolved: &[ResolvedPartition], target: &Path) -> Result<()> {
    let path = target.join("etc/fstab");
    fs::write(&path, render_fstab(resolved))
        .with_context(|| format!("Failed to update {}", path.display()))?;
    log::info!("wrote {} entries to {}", resolved.len(), path.display());
    Ok(())
}
