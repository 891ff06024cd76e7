use ister_core::errors::TemplateError;
use ister_core::fstab::render_fstab;
use ister_core::installer::{install_os, run_pipeline, STAGES};
use ister_core::config_states::UnvalidatedTemplate;
use ister_core::Settings;
use ister_hal::{FakeHal, Operation};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const BLKID: &str = "\
/dev/sda1: LABEL=\"installer\" UUID=\"53E0-A0AB\" TYPE=\"vfat\" PARTUUID=\"0001\"
/dev/sdb1: UUID=\"A1B2-C3D4\" TYPE=\"vfat\" PARTUUID=\"1001\"
/dev/sdb2: UUID=\"5d9a3c4e-2f10-4b8e-9d3a-7c1e0f2b6a11\" TYPE=\"ext4\" PARTUUID=\"1002\"
/dev/nbd0p2: UUID=\"11111111-2222-3333-4444-555555555555\" TYPE=\"ext4\"
";

const LOADER_ENTRY: &str = "\
title Clear Linux OS
linux /EFI/org.clearlinux/kernel-org.clearlinux.native
initrd /EFI/org.clearlinux/initrd
options root=PARTUUID=placeholder console=tty0 quiet
";

/// Scratch area holding the compressed image, the ssh key and the staging paths.
struct Scratch {
    dir: TempDir,
}

impl Scratch {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("clear.img.xz"), b"xz").unwrap();
        fs::write(dir.path().join("ops.pub"), "ssh-ed25519 AAAAC3Nza ops@example\n").unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn image_url(&self) -> String {
        format!("file://{}", self.path().join("clear.img.xz").display())
    }

    fn key_url(&self) -> String {
        format!("file://{}", self.path().join("ops.pub").display())
    }

    fn settings(&self) -> Settings {
        Settings {
            pointer_path: self.path().join("ister.conf"),
            staging_image: self.path().join("source"),
            temp_root: self.path().to_path_buf(),
            ..Settings::default()
        }
    }

    fn leftover_trees(&self) -> Vec<PathBuf> {
        fs::read_dir(self.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with("ister-"))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Installer media on sda, blank target on sdb.
fn machine() -> FakeHal {
    FakeHal::new()
        .with_devices(["/dev/sda", "/dev/sda1", "/dev/sda2", "/dev/sdb"])
        .with_blkid(BLKID)
        .seed_copy("boot/loader/entries/clear.conf", LOADER_ENTRY)
        .seed_copy("etc/fstab", "# placeholder\n")
        .seed_copy("etc/sudoers.d/README", "drop-ins go here\n")
}

fn default_layout_template(scratch: &Scratch) -> String {
    format!(
        r#"{{
            "ImageSourceType": "local",
            "ImageSourceLocation": "{}",
            "Users": [
                {{"username": "ops", "uid": 1500, "key": "{}", "sudo": "password"}}
            ]
        }}"#,
        scratch.image_url(),
        scratch.key_url()
    )
}

fn op_names(hal: &FakeHal) -> Vec<&'static str> {
    hal.operations().iter().map(Operation::name).collect()
}

#[test]
fn installs_default_layout_onto_blank_second_disk() {
    let scratch = Scratch::new();
    let hal = machine();
    let template = UnvalidatedTemplate::from_json(&default_layout_template(&scratch)).unwrap();

    let state = run_pipeline(&hal, &scratch.settings(), template).unwrap();

    assert_eq!(state.completed_stages, STAGES.to_vec());
    assert_eq!(
        op_names(&hal),
        vec![
            "parted",
            "parted",
            "parted",
            "parted",
            "format",
            "format",
            "decompress_xz",
            "nbd_load_module",
            "nbd_attach",
            "mount",
            "mount",
            "mount",
            "mount",
            "copy_tree",
            "blkid",
            "enter_root",
            "create_account",
            "restore_root",
            "enter_root",
            "lookup_user",
            "restore_root",
            "unmount_recursive",
            "unmount_recursive",
            "nbd_detach",
        ]
    );

    // Every partitioning call targets sdb, never the installer disk.
    for op in hal.operations() {
        if let Operation::Parted { disk, .. } = op {
            assert_eq!(disk, PathBuf::from("/dev/sdb"));
        }
    }
    assert!(hal.has_operation(|op| matches!(
        op,
        Operation::CreateAccount { username, uid: Some(1500) } if username == "ops"
    )));

    assert_eq!(
        render_fstab(state.resolved()),
        "UUID=A1B2-C3D4 /boot vfat rw,relatime 0 0\n\
         UUID=5d9a3c4e-2f10-4b8e-9d3a-7c1e0f2b6a11 / ext4 rw,relatime 0 0\n"
    );

    assert!(hal.mounted_paths().is_empty());
    assert!(scratch.leftover_trees().is_empty());
    assert!(!scratch.path().join("source").exists());
    assert!(!state.session.is_active());
}

/// Root of the target tree, taken from the full copy into it.
fn copy_destination(hal: &FakeHal) -> PathBuf {
    hal.operations()
        .into_iter()
        .find_map(|op| match op {
            Operation::CopyTree { dst, skeleton: false, .. } => Some(dst),
            _ => None,
        })
        .unwrap()
}

#[test]
fn installed_tree_carries_patched_entry_fstab_and_user_files() {
    let scratch = Scratch::new();
    // Unmounting fails, so cleanup leaves the still-mounted target tree in place.
    let hal = machine().fail_on("unmount_recursive");
    let template = UnvalidatedTemplate::from_json(&default_layout_template(&scratch)).unwrap();

    let err = run_pipeline(&hal, &scratch.settings(), template).unwrap_err();
    assert!(format!("{:#}", err).starts_with("stage Cleanup failed"), "{:#}", err);

    let target = copy_destination(&hal);
    let entry = fs::read_to_string(target.join("boot/loader/entries/clear.conf")).unwrap();
    let lines: Vec<&str> = entry.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "title Clear Linux OS");
    assert_eq!(
        lines[3],
        "options root=UUID=5d9a3c4e-2f10-4b8e-9d3a-7c1e0f2b6a11"
    );

    assert_eq!(
        fs::read_to_string(target.join("etc/fstab")).unwrap(),
        "UUID=A1B2-C3D4 /boot vfat rw,relatime 0 0\n\
         UUID=5d9a3c4e-2f10-4b8e-9d3a-7c1e0f2b6a11 / ext4 rw,relatime 0 0\n"
    );
    assert_eq!(
        fs::read_to_string(target.join("etc/sudoers.d/ops")).unwrap(),
        "ops ALL=(ALL) ALL"
    );
    assert_eq!(
        fs::read_to_string(target.join("home/ops/.ssh/authorized_keys")).unwrap(),
        "ssh-ed25519 AAAAC3Nza ops@example\n"
    );
    assert!(!hal.mounted_paths().is_empty());
}

#[test]
fn duplicate_layout_key_fails_before_partitioning() {
    let scratch = Scratch::new();
    let hal = machine();
    let json = format!(
        r#"{{
            "ImageSourceType": "local",
            "ImageSourceLocation": "{}",
            "PartitionLayout": [
                {{"disk": "sdb", "partition": 1, "size": "512M", "type": "EFI"}},
                {{"disk": "sdb", "partition": 1, "size": "rest", "type": "linux"}}
            ],
            "FilesystemTypes": [
                {{"disk": "sdb", "partition": 1, "type": "vfat"}}
            ],
            "PartitionMountPoints": [
                {{"disk": "sdb", "partition": 1, "mount": "/boot"}}
            ]
        }}"#,
        scratch.image_url()
    );
    let template = UnvalidatedTemplate::from_json(&json).unwrap();

    let err = run_pipeline(&hal, &scratch.settings(), template).unwrap_err();

    let cause = err.downcast_ref::<TemplateError>().unwrap();
    assert_eq!(
        cause.to_string(),
        "Duplicate disk sdb and partition 1 entry in PartitionLayout"
    );
    assert!(!hal.has_operation(|op| matches!(op, Operation::Parted { .. })));
    assert!(hal.operations().is_empty());
}

#[test]
fn failed_copy_cleans_up_and_reports_the_copy_error() {
    let scratch = Scratch::new();
    let hal = machine().fail_on("copy_tree");
    let template = UnvalidatedTemplate::from_json(&default_layout_template(&scratch)).unwrap();

    let err = run_pipeline(&hal, &scratch.settings(), template).unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.starts_with("stage CopyImage failed"), "{}", message);
    assert!(message.contains("injected failure"));

    let names = op_names(&hal);
    let copy_at = names.iter().position(|n| *n == "copy_tree").unwrap();
    assert_eq!(
        &names[copy_at + 1..],
        &["unmount_recursive", "unmount_recursive", "nbd_detach"]
    );
    assert!(!hal.has_operation(|op| matches!(op, Operation::CreateAccount { .. })));
    assert!(hal.mounted_paths().is_empty());
    assert!(scratch.leftover_trees().is_empty());
    assert!(!scratch.path().join("source").exists());
}

#[test]
fn missing_source_image_still_removes_temporary_trees() {
    let scratch = Scratch::new();
    fs::remove_file(scratch.path().join("clear.img.xz")).unwrap();
    let hal = machine();
    let template = UnvalidatedTemplate::from_json(&default_layout_template(&scratch)).unwrap();

    let err = run_pipeline(&hal, &scratch.settings(), template).unwrap_err();

    assert!(format!("{:#}", err).contains("not found"));
    assert!(!hal.has_operation(|op| matches!(op, Operation::NbdAttach { .. })));
    assert!(scratch.leftover_trees().is_empty());
}

#[test]
fn remote_image_is_rejected_before_any_device_work() {
    let scratch = Scratch::new();
    let hal = machine();
    let template = UnvalidatedTemplate::from_json(
        r#"{"ImageSourceType": "remote", "ImageSourceLocation": "https://example.invalid/clear.img.xz"}"#,
    )
    .unwrap();

    let err = run_pipeline(&hal, &scratch.settings(), template).unwrap_err();

    assert!(format!("{:#}", err).contains("Unable to obtain remote image"));
    assert!(hal.operations().is_empty());
}

#[test]
fn unreadable_ssh_key_stops_before_partitioning() {
    let scratch = Scratch::new();
    fs::remove_file(scratch.path().join("ops.pub")).unwrap();
    let hal = machine();
    let template = UnvalidatedTemplate::from_json(&default_layout_template(&scratch)).unwrap();

    let err = run_pipeline(&hal, &scratch.settings(), template).unwrap_err();

    assert!(format!("{:#}", err).contains("Unable to fetch ssh key for ops"));
    assert!(hal.operations().is_empty());
}

#[test]
fn install_os_follows_the_pointer_file() {
    let scratch = Scratch::new();
    let template_path = scratch.path().join("template.json");
    fs::write(&template_path, default_layout_template(&scratch)).unwrap();
    let settings = scratch.settings();
    fs::write(
        &settings.pointer_path,
        format!("template=file://{}\n", template_path.display()),
    )
    .unwrap();
    let hal = machine();

    install_os(&hal, &settings).unwrap();

    assert!(hal.has_operation(|op| matches!(op, Operation::CopyTree { skeleton: false, .. })));
    assert!(hal.has_operation(|op| matches!(op, Operation::NbdDetach { .. })));
    assert!(scratch.leftover_trees().is_empty());
}
