//! Partition UUID resolution.
//!
//! Joins the three layout lists by `(disk, partition)` and looks up each mounted partition's
//! filesystem UUID in a `blkid` listing.

use crate::errors::{InstallError, Result, TemplateError};
use crate::template::{InstallTemplate, PartKey, PartitionRole, SWAP_MOUNT};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// One line of `blkid` output: `/dev/sda1: UUID="53E0-A0AB" TYPE="vfat" ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlkidEntry {
    pub device: String,
    pub attrs: BTreeMap<String, String>,
    pub line: String,
}

impl BlkidEntry {
    pub fn uuid(&self) -> Option<&str> {
        self.attrs.get("UUID").map(String::as_str)
    }
}

/// Parse a `blkid` listing. Lines without a `<device>:` prefix are skipped; quoted values may
/// contain spaces and `\"` escapes.
pub fn parse_blkid(listing: &str) -> Vec<BlkidEntry> {
    listing
        .lines()
        .filter_map(|line| {
            let (device, rest) = line.split_once(':')?;
            let device = device.trim();
            if device.is_empty() || device.contains(char::is_whitespace) {
                return None;
            }
            Some(BlkidEntry {
                device: device.to_string(),
                attrs: parse_attrs(rest),
                line: line.to_string(),
            })
        })
        .collect()
}

fn parse_attrs(input: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() {
            break;
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }
        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    other => value.push(other),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        attrs.insert(key, value);
    }
    attrs
}

/// A partition that ends up in the installed system's mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPartition {
    pub key: PartKey,
    pub uuid: String,
    /// Mount path, or `none` for swap.
    pub mount: String,
    pub fs_type: String,
    pub options: Option<String>,
}

#[derive(Debug, Clone)]
struct Joined {
    role: PartitionRole,
    fs_type: Option<String>,
    mount: Option<String>,
    options: Option<String>,
}

/// Resolve UUIDs for every partition listed in the mount plan. Output follows the order of
/// the `blkid` listing; entries on `nbd_name` (the staged source image) are ignored.
pub fn resolve_partitions(
    template: &InstallTemplate,
    listing: &str,
    nbd_name: &str,
) -> Result<Vec<ResolvedPartition>> {
    let mut joined: HashMap<PartKey, Joined> = HashMap::new();
    for part in &template.partitions {
        joined.insert(
            part.key.clone(),
            Joined {
                role: part.role,
                fs_type: None,
                mount: (part.role == PartitionRole::Swap).then(|| SWAP_MOUNT.to_string()),
                options: None,
            },
        );
    }
    for fs in &template.filesystems {
        let entry = joined.get_mut(&fs.key).ok_or_else(|| TemplateError::DanglingKey {
            section: "FilesystemTypes",
            referenced: "PartitionLayout",
            disk: fs.key.disk.clone(),
            partition: fs.key.partition,
        })?;
        entry.fs_type = Some(fs.kind.as_str().to_string());
    }
    let mut mounted: HashSet<PartKey> = HashSet::new();
    for mount in &template.mounts {
        let entry = joined
            .get_mut(&mount.key)
            .ok_or_else(|| TemplateError::DanglingKey {
                section: "PartitionMountPoints",
                referenced: "PartitionLayout",
                disk: mount.key.disk.clone(),
                partition: mount.key.partition,
            })?;
        entry.mount = Some(mount.mount.clone());
        entry.options = mount.options.clone();
        mounted.insert(mount.key.clone());
    }

    let by_device: HashMap<String, &PartKey> =
        joined.keys().map(|key| (key.device_name(), key)).collect();

    let mut resolved = Vec::new();
    for entry in parse_blkid(listing) {
        let name = Path::new(&entry.device)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if name.starts_with(nbd_name) {
            continue;
        }
        let Some(key) = by_device.get(&name) else {
            continue;
        };
        if !mounted.contains(*key) {
            continue;
        }
        let uuid = entry
            .uuid()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| InstallError::MissingUuid(entry.line.clone()))?;
        let Some(info) = joined.get(*key) else {
            continue;
        };
        log::info!("{} ({}) has UUID {}", key, entry.device, uuid);
        resolved.push(ResolvedPartition {
            key: (*key).clone(),
            uuid: uuid.to_string(),
            mount: info.mount.clone().unwrap_or_default(),
            fs_type: info
                .fs_type
                .clone()
                .unwrap_or_else(|| fallback_fs_type(info.role).to_string()),
            options: info.options.clone(),
        });
    }
    Ok(resolved)
}

fn fallback_fs_type(role: PartitionRole) -> &'static str {
    match role {
        PartitionRole::Efi => "vfat",
        PartitionRole::Swap => "swap",
        PartitionRole::Linux => "auto",
    }
}
