//! Fake HAL implementation for testing.
//!
//! This implementation records all operations without executing them,
//! allowing for CI-safe testing without root privileges or real hardware.
//! Probes (`blkid`, mountinfo, device existence) are served from canned data,
//! and a tree copy can seed files into the destination so that later stages
//! find what a real image would have provided.

use super::{
    AccountOps, AccountSpec, CopyOps, CopyOptions, FormatOps, FormatOptions, HostOps, ImageOps,
    MountOps, MountOptions, NbdOps, PartedOp, PartitionOps, ProbeOps, RootHandle, RootOps,
    UserIds,
};
use crate::{HalError, HalResult};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Parted {
        disk: PathBuf,
        op: PartedOp,
    },
    Format {
        program: String,
        device: PathBuf,
        args: Vec<String>,
    },
    Mount {
        device: PathBuf,
        target: PathBuf,
        fstype: Option<String>,
        read_only: bool,
    },
    UnmountRecursive {
        target: PathBuf,
    },
    NbdLoadModule {
        max_part: u32,
    },
    NbdAttach {
        image: PathBuf,
        device: String,
    },
    NbdDetach {
        device: String,
    },
    DecompressXz {
        src: PathBuf,
        dst: PathBuf,
    },
    BlkidListing,
    CopyTree {
        src: PathBuf,
        dst: PathBuf,
        skeleton: bool,
    },
    CreateAccount {
        username: String,
        uid: Option<u32>,
    },
    LookupUser {
        username: String,
    },
    EnterRoot {
        root: PathBuf,
    },
    RestoreRoot {
        root: PathBuf,
    },
}

impl Operation {
    /// Short name used for failure injection (see [`FakeHal::fail_on`]).
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Parted { .. } => "parted",
            Operation::Format { .. } => "format",
            Operation::Mount { .. } => "mount",
            Operation::UnmountRecursive { .. } => "unmount_recursive",
            Operation::NbdLoadModule { .. } => "nbd_load_module",
            Operation::NbdAttach { .. } => "nbd_attach",
            Operation::NbdDetach { .. } => "nbd_detach",
            Operation::DecompressXz { .. } => "decompress_xz",
            Operation::BlkidListing => "blkid",
            Operation::CopyTree { .. } => "copy_tree",
            Operation::CreateAccount { .. } => "create_account",
            Operation::LookupUser { .. } => "lookup_user",
            Operation::EnterRoot { .. } => "enter_root",
            Operation::RestoreRoot { .. } => "restore_root",
        }
    }
}

/// Shared state for FakeHal operations.
#[derive(Debug, Clone, Default)]
struct FakeHalState {
    /// All operations that were recorded
    operations: Vec<Operation>,
    /// Currently mounted paths
    mounted_paths: HashSet<PathBuf>,
    devices: HashSet<PathBuf>,
    blkid: String,
    mountinfo: String,
    /// Files (relative path, contents) written into the destination of a full copy
    copy_seed: Vec<(PathBuf, String)>,
    failures: HashSet<String>,
}

/// Fake HAL implementation that records operations without executing them.
///
/// Clones share state, so a test can keep a handle while the pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device nodes reported as present by [`HostOps::device_exists`].
    pub fn with_devices<I, P>(self, devices: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.lock()
            .devices
            .extend(devices.into_iter().map(Into::into));
        self
    }

    /// Canned `blkid` output.
    pub fn with_blkid(self, listing: impl Into<String>) -> Self {
        self.lock().blkid = listing.into();
        self
    }

    /// Canned `/proc/self/mountinfo` contents.
    pub fn with_mountinfo(self, contents: impl Into<String>) -> Self {
        self.lock().mountinfo = contents.into();
        self
    }

    /// Write `contents` to `<dst>/<rel>` whenever a non-skeleton copy runs.
    pub fn seed_copy(self, rel: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.lock().copy_seed.push((rel.into(), contents.into()));
        self
    }

    /// Make every operation with this [`Operation::name`] fail after being recorded.
    pub fn fail_on(self, name: &str) -> Self {
        self.lock().failures.insert(name.to_string());
        self
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.lock().operations.iter().any(check)
    }

    /// Paths the fake currently considers mounted.
    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().mounted_paths.iter().cloned().collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> MutexGuard<'_, FakeHalState> {
        // A panicking test must not poison the fake for the assertions that follow.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, op: Operation) -> HalResult<()> {
        log::info!("FAKE HAL: {:?}", op);
        let name = op.name();
        let mut state = self.lock();
        state.operations.push(op);
        if state.failures.contains(name) {
            return Err(HalError::CommandFailed {
                program: name.to_string(),
                code: Some(1),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl PartitionOps for FakeHal {
    fn parted(&self, disk: &Path, op: PartedOp) -> HalResult<String> {
        self.record(Operation::Parted {
            disk: disk.to_path_buf(),
            op,
        })?;
        Ok(String::new())
    }
}

impl FormatOps for FakeHal {
    fn make_filesystem(&self, program: &str, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        self.record(Operation::Format {
            program: program.to_string(),
            device: device.to_path_buf(),
            args: opts.extra_args.clone(),
        })
    }
}

impl MountOps for FakeHal {
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: MountOptions,
    ) -> HalResult<()> {
        self.record(Operation::Mount {
            device: device.to_path_buf(),
            target: target.to_path_buf(),
            fstype: fstype.map(String::from),
            read_only: options.read_only,
        })?;
        self.lock().mounted_paths.insert(target.to_path_buf());
        Ok(())
    }

    fn unmount_recursive(&self, target: &Path) -> HalResult<()> {
        self.record(Operation::UnmountRecursive {
            target: target.to_path_buf(),
        })?;
        self.lock()
            .mounted_paths
            .retain(|path| !path.starts_with(target));
        Ok(())
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        Ok(self.lock().mounted_paths.contains(path))
    }
}

impl NbdOps for FakeHal {
    fn nbd_load_module(&self, max_part: u32) -> HalResult<()> {
        self.record(Operation::NbdLoadModule { max_part })
    }

    fn nbd_attach(&self, image: &Path, device: &str) -> HalResult<()> {
        self.record(Operation::NbdAttach {
            image: image.to_path_buf(),
            device: device.to_string(),
        })
    }

    fn nbd_detach(&self, device: &str) -> HalResult<()> {
        self.record(Operation::NbdDetach {
            device: device.to_string(),
        })
    }
}

impl ImageOps for FakeHal {
    fn decompress_xz(&self, compressed: &Path, dest: &Path) -> HalResult<u64> {
        self.record(Operation::DecompressXz {
            src: compressed.to_path_buf(),
            dst: dest.to_path_buf(),
        })?;
        // Leave a staged file behind so cleanup has something to remove.
        fs::write(dest, b"")?;
        Ok(0)
    }
}

impl ProbeOps for FakeHal {
    fn blkid_listing(&self) -> HalResult<String> {
        self.record(Operation::BlkidListing)?;
        Ok(self.lock().blkid.clone())
    }
}

impl HostOps for FakeHal {
    fn device_exists(&self, device: &Path) -> bool {
        self.lock().devices.contains(device)
    }

    fn proc_mountinfo(&self) -> HalResult<String> {
        Ok(self.lock().mountinfo.clone())
    }
}

impl CopyOps for FakeHal {
    fn copy_tree(&self, src: &Path, dst: &Path, opts: &CopyOptions) -> HalResult<()> {
        self.record(Operation::CopyTree {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            skeleton: opts.skeleton,
        })?;
        if opts.skeleton {
            return Ok(());
        }
        let seed = self.lock().copy_seed.clone();
        for (rel, contents) in seed {
            let path = dst.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, contents)?;
        }
        Ok(())
    }
}

impl AccountOps for FakeHal {
    fn create_account(&self, spec: &AccountSpec) -> HalResult<()> {
        self.record(Operation::CreateAccount {
            username: spec.username.clone(),
            uid: spec.uid,
        })
    }

    /// Answers with the ids of the test process so the caller's chown succeeds unprivileged.
    fn lookup_user(&self, username: &str) -> HalResult<UserIds> {
        self.record(Operation::LookupUser {
            username: username.to_string(),
        })?;
        Ok(UserIds {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        })
    }
}

impl RootOps for FakeHal {
    /// No real chroot: the handle maps in-root paths under `new_root`.
    fn enter_root(&self, new_root: &Path) -> HalResult<RootHandle> {
        self.record(Operation::EnterRoot {
            root: new_root.to_path_buf(),
        })?;
        Ok(RootHandle::new(new_root, None))
    }

    fn restore_root(&self, handle: RootHandle) -> HalResult<()> {
        self.record(Operation::RestoreRoot {
            root: handle.visible_root().to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fake_hal_records_mount_and_unmount() {
        let hal = FakeHal::new();
        let target = Path::new("/mnt/target");

        hal.mount_device(Path::new("/dev/sdb2"), target, Some("ext4"), MountOptions::new())
            .unwrap();
        assert!(hal.is_mounted(target).unwrap());

        hal.unmount_recursive(target).unwrap();
        assert!(!hal.is_mounted(target).unwrap());
        assert_eq!(hal.operations().len(), 2);
    }

    #[test]
    fn test_unmount_recursive_clears_nested_mounts() {
        let hal = FakeHal::new();
        for target in ["/tmp/t", "/tmp/t/boot", "/tmp/other"] {
            hal.mount_device(
                Path::new("/dev/sdb1"),
                Path::new(target),
                Some("vfat"),
                MountOptions::new(),
            )
            .unwrap();
        }

        hal.unmount_recursive(Path::new("/tmp/t")).unwrap();

        assert_eq!(hal.mounted_paths(), vec![PathBuf::from("/tmp/other")]);
    }

    #[test]
    fn test_fail_on_records_then_fails() {
        let hal = FakeHal::new().fail_on("nbd_attach");

        let err = hal
            .nbd_attach(Path::new("/source"), "/dev/nbd0")
            .unwrap_err();

        assert!(matches!(err, HalError::CommandFailed { .. }));
        assert!(hal.has_operation(|op| matches!(op, Operation::NbdAttach { .. })));
    }

    #[test]
    fn test_copy_tree_seeds_destination() {
        let dir = tempdir().unwrap();
        let hal = FakeHal::new().seed_copy("etc/hostname", "box\n");

        hal.copy_tree(Path::new("/src"), dir.path(), &CopyOptions::skeleton())
            .unwrap();
        assert!(!dir.path().join("etc/hostname").exists());

        hal.copy_tree(Path::new("/src"), dir.path(), &CopyOptions::archive())
            .unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/hostname")).unwrap(),
            "box\n"
        );
    }

    #[test]
    fn test_canned_probes() {
        let hal = FakeHal::new()
            .with_devices(["/dev/sda"])
            .with_blkid("/dev/sda1: UUID=\"53E0-A0AB\"\n");

        assert!(hal.device_exists(Path::new("/dev/sda")));
        assert!(!hal.device_exists(Path::new("/dev/sdb")));
        assert!(hal.blkid_listing().unwrap().contains("53E0-A0AB"));
        assert_eq!(hal.proc_mountinfo().unwrap(), "");
    }
}
