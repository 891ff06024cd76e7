//! Install template model.
//!
//! [`Template`] mirrors the JSON document as written by users: every field is optional so
//! that validation, not deserialization, reports what is wrong. [`InstallTemplate`] is the
//! checked, typed form the pipeline works from.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "ImageSourceType", default)]
    pub image_source_type: Option<String>,
    #[serde(rename = "ImageSourceLocation", default)]
    pub image_source_location: Option<String>,
    #[serde(rename = "PartitionLayout", default)]
    pub partition_layout: Option<Vec<RawPartition>>,
    #[serde(rename = "FilesystemTypes", default)]
    pub filesystem_types: Option<Vec<RawFilesystem>>,
    #[serde(rename = "PartitionMountPoints", default)]
    pub partition_mount_points: Option<Vec<RawMount>>,
    #[serde(rename = "Users", default)]
    pub users: Option<Vec<RawUser>>,
}

impl Template {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// True when the template describes any part of the disk layout itself.
    pub fn has_disk_layout(&self) -> bool {
        self.partition_layout.is_some()
            || self.filesystem_types.is_some()
            || self.partition_mount_points.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPartition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFilesystem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(
        default,
        deserialize_with = "uid_from_number_or_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub uid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sudo: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UidField {
    Number(i64),
    Text(String),
}

/// Reads the uid as a number or as a numeric string.
fn uid_from_number_or_text<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<UidField>::deserialize(deserializer)? {
        None => Ok(None),
        Some(UidField::Number(uid)) => Ok(Some(uid)),
        Some(UidField::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("uid {:?} is not an integer", text))),
    }
}

/// Identifies one partition across the three layout lists. Orders by disk name, then
/// numerically by partition index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartKey {
    pub disk: String,
    pub partition: u32,
}

impl PartKey {
    pub fn new(disk: impl Into<String>, partition: u32) -> Self {
        Self {
            disk: disk.into(),
            partition,
        }
    }

    /// Kernel device name, e.g. `sdb2` or `nvme0n1p2`.
    pub fn device_name(&self) -> String {
        ister_hal::path::partition_path(&self.disk, self.partition)
    }

    pub fn device_path(&self) -> PathBuf {
        ister_hal::path::device_path(&self.device_name())
    }
}

impl fmt::Display for PartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disk {} partition {}", self.disk, self.partition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSourceKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
    Efi,
    Linux,
    Swap,
}

impl PartitionRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "EFI" => Some(Self::Efi),
            "linux" => Some(Self::Linux),
            "swap" => Some(Self::Swap),
            _ => None,
        }
    }

    /// Filesystem hint handed to `parted mkpart`.
    pub fn parted_hint(self) -> &'static str {
        match self {
            Self::Efi => "fat32",
            Self::Swap => "linux-swap",
            Self::Linux => "ext2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSize {
    Mebibytes(u64),
    Remaining,
}

impl PartitionSize {
    /// `512M`, `2G`, `1T`, or `remaining` (`rest` is accepted as an alias).
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "remaining" || raw == "rest" {
            return Some(Self::Remaining);
        }
        let unit = raw.chars().last()?;
        let mult: u64 = match unit {
            'M' => 1,
            'G' => 1024,
            'T' => 1024 * 1024,
            _ => return None,
        };
        let digits = &raw[..raw.len() - unit.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let amount: u64 = digits.parse().ok()?;
        if amount == 0 {
            return None;
        }
        // parted offsets are planned as i64, where -1 marks the end of the disk.
        let mib = amount.checked_mul(mult)?;
        if i64::try_from(mib).is_err() {
            return None;
        }
        Some(Self::Mebibytes(mib))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Ext2,
    Ext3,
    Ext4,
    Vfat,
    Btrfs,
    Xfs,
    Swap,
}

impl FsKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ext2" => Some(Self::Ext2),
            "ext3" => Some(Self::Ext3),
            "ext4" => Some(Self::Ext4),
            "vfat" => Some(Self::Vfat),
            "btrfs" => Some(Self::Btrfs),
            "xfs" => Some(Self::Xfs),
            "swap" => Some(Self::Swap),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ext2 => "ext2",
            Self::Ext3 => "ext3",
            Self::Ext4 => "ext4",
            Self::Vfat => "vfat",
            Self::Btrfs => "btrfs",
            Self::Xfs => "xfs",
            Self::Swap => "swap",
        }
    }

    /// Program that creates this filesystem.
    pub fn program(self) -> &'static str {
        match self {
            Self::Ext2 => "mkfs.ext2",
            Self::Ext3 => "mkfs.ext3",
            Self::Ext4 => "mkfs.ext4",
            Self::Vfat => "mkfs.vfat",
            Self::Btrfs => "mkfs.btrfs",
            Self::Xfs => "mkfs.xfs",
            Self::Swap => "mkswap",
        }
    }
}

impl fmt::Display for FsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub key: PartKey,
    pub size: PartitionSize,
    pub role: PartitionRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemSpec {
    pub key: PartKey,
    pub kind: FsKind,
    /// Raw `mkfs` option string.
    pub options: Option<String>,
}

/// Mount entry. `mount` is an absolute path, or `none` for swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub key: PartKey,
    pub mount: String,
    /// Raw mount option string written to fstab.
    pub options: Option<String>,
}

pub const SWAP_MOUNT: &str = "none";

impl MountSpec {
    pub fn is_swap(&self) -> bool {
        self.mount == SWAP_MOUNT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub username: String,
    pub uid: Option<u32>,
    /// URL of the user's SSH public key.
    pub key: Option<String>,
    /// Only `"password"` is accepted, so presence is all that matters.
    pub sudo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTemplate {
    pub source_kind: ImageSourceKind,
    pub source_location: String,
    pub partitions: Vec<PartitionSpec>,
    pub filesystems: Vec<FilesystemSpec>,
    pub mounts: Vec<MountSpec>,
    pub users: Vec<UserSpec>,
}

impl InstallTemplate {
    /// Two-partition layout on `disk`: 512M EFI vfat at `/boot`, the rest ext4 at `/`.
    pub fn default_layout(disk: &str) -> (Vec<PartitionSpec>, Vec<FilesystemSpec>, Vec<MountSpec>) {
        let efi = PartKey::new(disk, 1);
        let root = PartKey::new(disk, 2);
        let partitions = vec![
            PartitionSpec {
                key: efi.clone(),
                size: PartitionSize::Mebibytes(512),
                role: PartitionRole::Efi,
            },
            PartitionSpec {
                key: root.clone(),
                size: PartitionSize::Remaining,
                role: PartitionRole::Linux,
            },
        ];
        let filesystems = vec![
            FilesystemSpec {
                key: efi.clone(),
                kind: FsKind::Vfat,
                options: None,
            },
            FilesystemSpec {
                key: root.clone(),
                kind: FsKind::Ext4,
                options: None,
            },
        ];
        let mounts = vec![
            MountSpec {
                key: efi,
                mount: "/boot".to_string(),
                options: None,
            },
            MountSpec {
                key: root,
                mount: "/".to_string(),
                options: None,
            },
        ];
        (partitions, filesystems, mounts)
    }
}
