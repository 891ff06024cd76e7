//! Template validation.
//!
//! Everything here runs before the first destructive call, so every failure names the list
//! and the `(disk, partition)` key or user entry it came from.

use crate::errors::{Result, TemplateError};
use crate::template::{
    FilesystemSpec, FsKind, ImageSourceKind, InstallTemplate, MountSpec, PartKey, PartitionRole,
    PartitionSize, PartitionSpec, RawFilesystem, RawMount, RawPartition, RawUser, Template,
    UserSpec, SWAP_MOUNT,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path};

const LAYOUT: &str = "PartitionLayout";
const FILESYSTEMS: &str = "FilesystemTypes";
const MOUNTS: &str = "PartitionMountPoints";

/// Check `raw` and produce the typed template.
///
/// `find_disk` is only called when the template carries no layout at all and the default
/// two-partition layout has to be placed on the detected target disk.
pub fn validate_template(
    raw: Template,
    find_disk: impl FnOnce() -> Result<String>,
) -> Result<InstallTemplate> {
    let source_kind = match non_empty(&raw.image_source_type) {
        None => return Err(TemplateError::MissingField("ImageSourceType").into()),
        Some("local") => ImageSourceKind::Local,
        Some("remote") => ImageSourceKind::Remote,
        Some(other) => return Err(TemplateError::InvalidSourceType(other.to_string()).into()),
    };
    let source_location = non_empty(&raw.image_source_location)
        .ok_or(TemplateError::MissingField("ImageSourceLocation"))?
        .to_string();

    let (partitions, filesystems, mounts) = if raw.has_disk_layout() {
        validate_disk_layout(
            raw.partition_layout.as_deref().unwrap_or_default(),
            raw.filesystem_types.as_deref().unwrap_or_default(),
            raw.partition_mount_points.as_deref().unwrap_or_default(),
        )?
    } else {
        let disk = find_disk()?;
        log::info!("template has no disk layout; using defaults on {}", disk);
        InstallTemplate::default_layout(&disk)
    };

    let users = match raw.users.as_deref() {
        Some(users) => validate_users(users)?,
        None => Vec::new(),
    };

    Ok(InstallTemplate {
        source_kind,
        source_location,
        partitions,
        filesystems,
        mounts,
        users,
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn render<T: Serialize>(entry: &T) -> String {
    serde_json::to_string(entry).unwrap_or_else(|_| "<unprintable>".to_string())
}

fn invalid<T: Serialize>(section: &'static str, entry: &T) -> TemplateError {
    TemplateError::InvalidEntry {
        section,
        entry: render(entry),
    }
}

fn entry_key<T: Serialize>(
    section: &'static str,
    entry: &T,
    disk: &Option<String>,
    partition: Option<i64>,
) -> std::result::Result<PartKey, TemplateError> {
    let disk = non_empty(disk)
        .filter(|d| !d.contains('/'))
        .ok_or_else(|| invalid(section, entry))?;
    let partition = partition
        .filter(|p| *p >= 1)
        .and_then(|p| u32::try_from(p).ok())
        .ok_or_else(|| invalid(section, entry))?;
    Ok(PartKey::new(disk, partition))
}

fn validate_disk_layout(
    layout: &[RawPartition],
    filesystems: &[RawFilesystem],
    mounts: &[RawMount],
) -> std::result::Result<(Vec<PartitionSpec>, Vec<FilesystemSpec>, Vec<MountSpec>), TemplateError>
{
    let partitions = validate_partitions(layout)?;
    let layout_keys: HashSet<&PartKey> = partitions.iter().map(|p| &p.key).collect();

    let mut fs_specs: Vec<FilesystemSpec> = Vec::with_capacity(filesystems.len());
    let mut fs_kinds: HashMap<PartKey, FsKind> = HashMap::new();
    for entry in filesystems {
        let key = entry_key(FILESYSTEMS, entry, &entry.disk, entry.partition)?;
        let raw_kind = non_empty(&entry.kind).ok_or_else(|| invalid(FILESYSTEMS, entry))?;
        let kind = FsKind::parse(raw_kind)
            .ok_or_else(|| TemplateError::InvalidFilesystemType(raw_kind.to_string()))?;
        if fs_kinds.contains_key(&key) {
            return Err(duplicate(FILESYSTEMS, key));
        }
        if !layout_keys.contains(&key) {
            return Err(dangling(FILESYSTEMS, LAYOUT, key));
        }
        fs_kinds.insert(key.clone(), kind);
        fs_specs.push(FilesystemSpec {
            key,
            kind,
            options: entry.options.clone().filter(|o| !o.trim().is_empty()),
        });
    }

    let mut mount_specs: Vec<MountSpec> = Vec::with_capacity(mounts.len());
    let mut seen: HashSet<PartKey> = HashSet::new();
    for entry in mounts {
        let key = entry_key(MOUNTS, entry, &entry.disk, entry.partition)?;
        let mount = non_empty(&entry.mount).ok_or_else(|| invalid(MOUNTS, entry))?;
        if !seen.insert(key.clone()) {
            return Err(duplicate(MOUNTS, key));
        }
        let Some(kind) = fs_kinds.get(&key) else {
            return Err(dangling(MOUNTS, FILESYSTEMS, key));
        };
        // Swap is never mounted, so it takes `none` and nothing else.
        let valid_mount = if *kind == FsKind::Swap {
            mount == SWAP_MOUNT
        } else {
            is_absolute_clean(mount)
        };
        if !valid_mount {
            return Err(TemplateError::InvalidMount {
                disk: key.disk,
                partition: key.partition,
                mount: mount.to_string(),
            });
        }
        mount_specs.push(MountSpec {
            key,
            mount: mount.to_string(),
            options: entry.options.clone().filter(|o| !o.trim().is_empty()),
        });
    }

    Ok((partitions, fs_specs, mount_specs))
}

fn validate_partitions(
    layout: &[RawPartition],
) -> std::result::Result<Vec<PartitionSpec>, TemplateError> {
    let mut specs: Vec<PartitionSpec> = Vec::with_capacity(layout.len());
    let mut seen: HashSet<PartKey> = HashSet::new();
    let mut has_efi = false;

    for entry in layout {
        let key = entry_key(LAYOUT, entry, &entry.disk, entry.partition)?;
        let raw_size = non_empty(&entry.size).ok_or_else(|| invalid(LAYOUT, entry))?;
        let raw_role = non_empty(&entry.role).ok_or_else(|| invalid(LAYOUT, entry))?;

        let size = PartitionSize::parse(raw_size).ok_or_else(|| TemplateError::InvalidSize {
            disk: key.disk.clone(),
            partition: key.partition,
            size: raw_size.to_string(),
        })?;
        let role = PartitionRole::parse(raw_role)
            .ok_or_else(|| TemplateError::InvalidPartitionType(raw_role.to_string()))?;

        if role == PartitionRole::Efi {
            if has_efi {
                return Err(TemplateError::MultipleEfi);
            }
            has_efi = true;
        }
        if !seen.insert(key.clone()) {
            return Err(duplicate(LAYOUT, key));
        }
        specs.push(PartitionSpec { key, size, role });
    }

    if !has_efi {
        return Err(TemplateError::NoEfi);
    }

    // A partition taking the rest of the disk must be the last one on that disk.
    let mut last_on_disk: BTreeMap<&str, u32> = BTreeMap::new();
    for spec in &specs {
        let last = last_on_disk.entry(spec.key.disk.as_str()).or_insert(0);
        *last = (*last).max(spec.key.partition);
    }
    for spec in &specs {
        if spec.size == PartitionSize::Remaining
            && last_on_disk.get(spec.key.disk.as_str()) != Some(&spec.key.partition)
        {
            return Err(TemplateError::RemainingNotLast {
                disk: spec.key.disk.clone(),
                partition: spec.key.partition,
            });
        }
    }

    Ok(specs)
}

fn is_absolute_clean(mount: &str) -> bool {
    let path = Path::new(mount);
    path.is_absolute() && !path.components().any(|c| c == Component::ParentDir)
}

fn duplicate(section: &'static str, key: PartKey) -> TemplateError {
    TemplateError::DuplicateKey {
        section,
        disk: key.disk,
        partition: key.partition,
    }
}

fn dangling(section: &'static str, referenced: &'static str, key: PartKey) -> TemplateError {
    TemplateError::DanglingKey {
        section,
        referenced,
        disk: key.disk,
        partition: key.partition,
    }
}

fn validate_users(users: &[RawUser]) -> std::result::Result<Vec<UserSpec>, TemplateError> {
    let mut names: HashSet<&str> = HashSet::new();
    let mut uids: HashSet<u32> = HashSet::new();
    let mut specs = Vec::with_capacity(users.len());

    for entry in users {
        let name = non_empty(&entry.username)
            .ok_or_else(|| TemplateError::MissingUsername(render(entry)))?;
        if name.starts_with('-')
            || name
                .chars()
                .any(|c| c == '/' || c == ':' || c.is_whitespace())
        {
            return Err(TemplateError::InvalidUsername(name.to_string()));
        }
        if !names.insert(name) {
            return Err(TemplateError::DuplicateUsername(name.to_string()));
        }

        let uid = match entry.uid {
            Some(raw) => {
                let uid = u32::try_from(raw)
                    .ok()
                    .filter(|uid| *uid >= 1)
                    .ok_or(TemplateError::InvalidUid(raw))?;
                if !uids.insert(uid) {
                    return Err(TemplateError::DuplicateUid(uid));
                }
                Some(uid)
            }
            None => None,
        };

        let sudo = match entry.sudo.as_deref() {
            None => false,
            Some("password") => true,
            Some(other) => return Err(TemplateError::InvalidSudo(other.to_string())),
        };

        specs.push(UserSpec {
            username: name.to_string(),
            uid,
            key: entry.key.clone().filter(|k| !k.is_empty()),
            sudo,
        });
    }

    Ok(specs)
}
