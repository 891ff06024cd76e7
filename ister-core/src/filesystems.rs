use crate::errors::Result;
use crate::template::FilesystemSpec;
use anyhow::Context;
use ister_hal::{FormatOps, FormatOptions};

/// Create every filesystem in template order. The raw option string is split on whitespace
/// and passed ahead of the device.
pub fn create_filesystems<H: FormatOps + ?Sized>(hal: &H, specs: &[FilesystemSpec]) -> Result<()> {
    for spec in specs {
        let device = spec.key.device_path();
        let args: Vec<String> = spec
            .options
            .as_deref()
            .map(|o| o.split_whitespace().map(String::from).collect())
            .unwrap_or_default();
        log::info!(
            "creating {} on {} {:?}",
            spec.kind,
            device.display(),
            args
        );
        hal.make_filesystem(spec.kind.program(), &device, &FormatOptions::new().with_args(args))
            .with_context(|| format!("Failed to create {} filesystem on {}", spec.kind, spec.key))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{FsKind, PartKey};
    use ister_hal::{FakeHal, Operation};
    use std::path::PathBuf;

    #[test]
    fn kind_selects_program_and_options_pass_through() {
        let hal = FakeHal::new();
        let specs = vec![
            FilesystemSpec {
                key: PartKey::new("sdb", 1),
                kind: FsKind::Vfat,
                options: None,
            },
            FilesystemSpec {
                key: PartKey::new("sdb", 2),
                kind: FsKind::Ext4,
                options: Some("-b 4096  -L root".to_string()),
            },
            FilesystemSpec {
                key: PartKey::new("nvme0n1", 3),
                kind: FsKind::Swap,
                options: None,
            },
        ];
        create_filesystems(&hal, &specs).unwrap();

        assert_eq!(
            hal.operations(),
            vec![
                Operation::Format {
                    program: "mkfs.vfat".to_string(),
                    device: PathBuf::from("/dev/sdb1"),
                    args: vec![],
                },
                Operation::Format {
                    program: "mkfs.ext4".to_string(),
                    device: PathBuf::from("/dev/sdb2"),
                    args: vec!["-b", "4096", "-L", "root"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                },
                Operation::Format {
                    program: "mkswap".to_string(),
                    device: PathBuf::from("/dev/nvme0n1p3"),
                    args: vec![],
                },
            ]
        );
    }

    #[test]
    fn failure_names_the_partition() {
        let hal = FakeHal::new().fail_on("format");
        let specs = vec![FilesystemSpec {
            key: PartKey::new("sdb", 2),
            kind: FsKind::Xfs,
            options: None,
        }];
        let err = create_filesystems(&hal, &specs).unwrap_err();
        assert!(format!("{:#}", err)
            .starts_with("Failed to create xfs filesystem on disk sdb partition 2"));
    }
}
