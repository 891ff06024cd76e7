//! Boot loader entry patching.
//!
//! The entry shipped in the image is a systemd-boot style file whose fourth line is the
//! kernel command line. Only that line is rewritten, and only if it looks like one.

use crate::errors::{InstallError, Result};
use crate::uuids::ResolvedPartition;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

const OPTIONS_LINE: usize = 3;

pub fn loader_entry_path(target: &Path, entry: &str) -> PathBuf {
    target.join("boot/loader/entries").join(entry)
}

/// Point the boot entry at the partition mounted at `/`.
pub fn update_loader(resolved: &[ResolvedPartition], target: &Path, entry: &str) -> Result<()> {
    let root = resolved
        .iter()
        .find(|p| p.mount == "/")
        .ok_or(InstallError::NoRootPartition)?;
    let path = loader_entry_path(target, entry);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Unable to open bootloader configuration file {}", path.display()))?;

    let patched = patch_options_line(&contents, &root.uuid)
        .ok_or_else(|| InstallError::BootEntryShape(path.display().to_string()))?;
    fs::write(&path, patched)
        .with_context(|| format!("Unable to write bootloader configuration file {}", path.display()))?;
    log::info!("{} now boots root=UUID={}", path.display(), root.uuid);
    Ok(())
}

/// Replace the options line, keeping every other byte of the entry. `None` when the entry
/// has no options line in the expected place.
pub fn patch_options_line(contents: &str, root_uuid: &str) -> Option<String> {
    let mut lines: Vec<&str> = contents.split_inclusive('\n').collect();
    let current = lines.get(OPTIONS_LINE)?;
    if !current.starts_with("options") {
        return None;
    }
    let ending = if current.ends_with("\r\n") {
        "\r\n"
    } else if current.ends_with('\n') {
        "\n"
    } else {
        ""
    };
    let replacement = format!("options root=UUID={}{}", root_uuid, ending);
    lines[OPTIONS_LINE] = &replacement;
    Some(lines.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::PartKey;
    use tempfile::tempdir;

    const ENTRY: &str = "title Clear Linux\n\
                         linux /EFI/org.clearlinux/kernel\n\
                         initrd /EFI/org.clearlinux/initrd\n\
                         options root=PARTUUID=old console=tty0\n\
                         # trailing comment\n";

    fn root(uuid: &str) -> ResolvedPartition {
        ResolvedPartition {
            key: PartKey::new("sdb", 2),
            uuid: uuid.to_string(),
            mount: "/".to_string(),
            fs_type: "ext4".to_string(),
            options: None,
        }
    }

    #[test]
    fn only_the_options_line_changes() {
        let patched = patch_options_line(ENTRY, "abcd").unwrap();
        let expected = ENTRY.replace(
            "options root=PARTUUID=old console=tty0",
            "options root=UUID=abcd",
        );
        assert_eq!(patched, expected);
    }

    #[test]
    fn unexpected_shape_is_rejected() {
        assert_eq!(patch_options_line("title x\nlinux y\n", "abcd"), None);
        assert_eq!(
            patch_options_line("title x\nlinux y\ninitrd z\nversion 1\n", "abcd"),
            None
        );
    }

    #[test]
    fn update_loader_rewrites_entry_on_disk() {
        let dir = tempdir().unwrap();
        let path = loader_entry_path(dir.path(), "clear.conf");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, ENTRY).unwrap();

        update_loader(&[root("root-uuid")], dir.path(), "clear.conf").unwrap();

        let lines: Vec<String> = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        assert_eq!(lines[3], "options root=UUID=root-uuid");
        assert_eq!(lines[4], "# trailing comment");
    }

    #[test]
    fn update_loader_needs_a_root_partition() {
        let dir = tempdir().unwrap();
        let mut boot = root("u");
        boot.mount = "/boot".to_string();
        let err = update_loader(&[boot], dir.path(), "clear.conf").unwrap_err();
        assert_eq!(
            err.downcast_ref::<InstallError>(),
            Some(&InstallError::NoRootPartition)
        );
    }

    #[test]
    fn update_loader_reports_bad_entry() {
        let dir = tempdir().unwrap();
        let path = loader_entry_path(dir.path(), "clear.conf");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "title only\n").unwrap();

        let err = update_loader(&[root("u")], dir.path(), "clear.conf").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallError>(),
            Some(InstallError::BootEntryShape(_))
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "title only\n");
    }
}
