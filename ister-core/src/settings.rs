//! Installer constants.
//!
//! The pointer file is the only runtime input; everything else the installer needs to know
//! about the machine it runs on lives here with its default.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// File whose first line names the template URL.
    pub pointer_path: PathBuf,
    /// Where the decompressed source image is staged before NBD attach.
    pub staging_image: PathBuf,
    /// Parent of the temporary source and target mount trees.
    pub temp_root: PathBuf,
    pub nbd_device: String,
    pub nbd_max_part: u32,
    /// Disks considered when telling the installer media apart from the target.
    pub candidate_disks: [String; 2],
    /// Filesystem UUID carried by the installer media.
    pub installer_uuid: String,
    /// Boot loader entry under `<target>/boot/loader/entries`.
    pub loader_entry: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pointer_path: PathBuf::from("/etc/ister.conf"),
            staging_image: PathBuf::from("/source"),
            temp_root: std::env::temp_dir(),
            nbd_device: "/dev/nbd0".to_string(),
            nbd_max_part: 2,
            candidate_disks: ["sda".to_string(), "sdb".to_string()],
            installer_uuid: "53E0-A0AB".to_string(),
            loader_entry: "clear.conf".to_string(),
        }
    }
}

impl Settings {
    pub fn first_disk(&self) -> &str {
        &self.candidate_disks[0]
    }

    pub fn second_disk(&self) -> &str {
        &self.candidate_disks[1]
    }

    /// `/dev/nbd0` -> `nbd0`
    pub fn nbd_name(&self) -> &str {
        self.nbd_device
            .strip_prefix("/dev/")
            .unwrap_or(&self.nbd_device)
    }
}
