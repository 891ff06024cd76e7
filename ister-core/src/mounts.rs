//! Source image and target disk staging.
//!
//! Everything that gets set up is written into a [`MountSession`] as soon as it exists, so a
//! failure halfway through leaves a session that cleanup can take down.

use crate::errors::{InstallError, Result};
use crate::settings::Settings;
use crate::template::{FsKind, InstallTemplate, MountSpec};
use anyhow::{anyhow, Context};
use ister_hal::path::{device_path, partition_path};
use ister_hal::{ImageOps, MountOps, MountOptions, NbdOps};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Resources held by an install in progress.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MountSession {
    pub source_dir: Option<PathBuf>,
    pub target_dir: Option<PathBuf>,
    pub staged_image: Option<PathBuf>,
    pub nbd_device: Option<String>,
}

impl MountSession {
    pub fn is_active(&self) -> bool {
        self.source_dir.is_some()
            || self.target_dir.is_some()
            || self.staged_image.is_some()
            || self.nbd_device.is_some()
    }

    pub fn source(&self) -> Result<&Path> {
        self.source_dir
            .as_deref()
            .ok_or_else(|| anyhow!("Source tree is not mounted"))
    }

    pub fn target(&self) -> Result<&Path> {
        self.target_dir
            .as_deref()
            .ok_or_else(|| anyhow!("Target tree is not mounted"))
    }
}

/// Fresh directory under `root`, created with `mkdtemp`.
pub fn make_temp_dir(root: &Path) -> Result<PathBuf> {
    let template = root.join("ister-XXXXXX");
    nix::unistd::mkdtemp(&template)
        .with_context(|| format!("Failed to create temporary directory in {}", root.display()))
}

/// Local path named by an `ImageSourceLocation`.
pub fn local_image_path(location: &str) -> PathBuf {
    PathBuf::from(location.strip_prefix("file://").unwrap_or(location))
}

/// Stage the source image read-only and mount the target partitions.
pub fn mount_source_and_target<H>(
    hal: &H,
    template: &InstallTemplate,
    settings: &Settings,
    session: &mut MountSession,
) -> Result<()>
where
    H: MountOps + NbdOps + ImageOps + ?Sized,
{
    session.source_dir = Some(make_temp_dir(&settings.temp_root)?);
    session.target_dir = Some(make_temp_dir(&settings.temp_root)?);
    log::info!("mount session: {:?}", session);

    mount_source(hal, &template.source_location, settings, session)
        .context("Failed to set up source image")?;
    mount_target(hal, template, session).context("Failed to mount target partitions")?;
    Ok(())
}

fn mount_source<H>(
    hal: &H,
    location: &str,
    settings: &Settings,
    session: &mut MountSession,
) -> Result<()>
where
    H: MountOps + NbdOps + ImageOps + ?Sized,
{
    let source_dir = session.source()?.to_path_buf();
    let compressed = local_image_path(location);
    if !compressed.exists() {
        return Err(InstallError::SourceImageMissing(compressed.display().to_string()).into());
    }

    session.staged_image = Some(settings.staging_image.clone());
    let written = hal
        .decompress_xz(&compressed, &settings.staging_image)
        .context("Failed to extract source image")?;
    log::info!(
        "staged {} bytes at {}",
        written,
        settings.staging_image.display()
    );

    hal.nbd_load_module(settings.nbd_max_part)
        .context("Failed to load nbd module")?;
    hal.nbd_attach(&settings.staging_image, &settings.nbd_device)
        .with_context(|| format!("Failed to attach source image to {}", settings.nbd_device))?;
    session.nbd_device = Some(settings.nbd_device.clone());

    let nbd = settings.nbd_name();
    let root_part = device_path(&partition_path(nbd, 2));
    let boot_part = device_path(&partition_path(nbd, 1));
    let boot_dir = source_dir.join("boot");
    hal.mount_device(&root_part, &source_dir, None, MountOptions::read_only())
        .with_context(|| format!("Failed to mount {}", root_part.display()))?;
    hal.mount_device(&boot_part, &boot_dir, None, MountOptions::read_only())
        .with_context(|| format!("Failed to mount {}", boot_part.display()))?;
    Ok(())
}

/// Mount points in path order so that parents are mounted before their children.
pub fn mount_order(mounts: &[MountSpec]) -> Vec<&MountSpec> {
    let mut ordered: Vec<&MountSpec> = mounts.iter().filter(|m| !m.is_swap()).collect();
    ordered.sort_by(|a, b| a.mount.cmp(&b.mount));
    ordered
}

fn mount_target<H: MountOps + ?Sized>(
    hal: &H,
    template: &InstallTemplate,
    session: &MountSession,
) -> Result<()> {
    let target_dir = session.target()?;
    let kinds: HashMap<_, FsKind> = template
        .filesystems
        .iter()
        .map(|fs| (&fs.key, fs.kind))
        .collect();

    for spec in mount_order(&template.mounts) {
        let kind = kinds
            .get(&spec.key)
            .ok_or_else(|| anyhow!("No filesystem defined for {}", spec.key))?;
        let dest = target_dir.join(spec.mount.trim_start_matches('/'));
        if spec.mount != "/" {
            fs::create_dir_all(&dest)
                .with_context(|| format!("Failed to create mount point {}", dest.display()))?;
        }
        let device = spec.key.device_path();
        hal.mount_device(&device, &dest, Some(kind.as_str()), MountOptions::new())
            .with_context(|| format!("Failed to mount {} at {}", device.display(), spec.mount))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ImageSourceKind, PartKey};
    use ister_hal::{FakeHal, Operation};
    use tempfile::tempdir;

    fn template(location: String) -> InstallTemplate {
        let (partitions, filesystems, mounts) = InstallTemplate::default_layout("sdb");
        InstallTemplate {
            source_kind: ImageSourceKind::Local,
            source_location: location,
            partitions,
            filesystems,
            mounts,
            users: Vec::new(),
        }
    }

    fn settings(dir: &Path) -> Settings {
        Settings {
            staging_image: dir.join("source"),
            temp_root: dir.to_path_buf(),
            ..Settings::default()
        }
    }

    #[test]
    fn strips_file_scheme() {
        assert_eq!(
            local_image_path("file:///srv/image.img.xz"),
            PathBuf::from("/srv/image.img.xz")
        );
        assert_eq!(local_image_path("/srv/x.xz"), PathBuf::from("/srv/x.xz"));
    }

    #[test]
    fn mounts_source_then_target_in_path_order() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("image.img.xz");
        fs::write(&image, b"xz").unwrap();
        let hal = FakeHal::new();
        let settings = settings(dir.path());
        let mut session = MountSession::default();

        mount_source_and_target(
            &hal,
            &template(format!("file://{}", image.display())),
            &settings,
            &mut session,
        )
        .unwrap();

        let source = session.source_dir.clone().unwrap();
        let target = session.target_dir.clone().unwrap();
        assert!(source.starts_with(dir.path()) && source.is_dir());
        assert!(target.starts_with(dir.path()) && target.is_dir());
        assert_ne!(source, target);
        assert!(target.join("boot").is_dir());
        assert_eq!(session.nbd_device.as_deref(), Some("/dev/nbd0"));
        assert_eq!(session.staged_image.as_deref(), Some(settings.staging_image.as_path()));

        assert_eq!(
            hal.operations(),
            vec![
                Operation::DecompressXz {
                    src: image,
                    dst: settings.staging_image.clone(),
                },
                Operation::NbdLoadModule { max_part: 2 },
                Operation::NbdAttach {
                    image: settings.staging_image.clone(),
                    device: "/dev/nbd0".to_string(),
                },
                Operation::Mount {
                    device: PathBuf::from("/dev/nbd0p2"),
                    target: source.clone(),
                    fstype: None,
                    read_only: true,
                },
                Operation::Mount {
                    device: PathBuf::from("/dev/nbd0p1"),
                    target: source.join("boot"),
                    fstype: None,
                    read_only: true,
                },
                Operation::Mount {
                    device: PathBuf::from("/dev/sdb2"),
                    target: target.clone(),
                    fstype: Some("ext4".to_string()),
                    read_only: false,
                },
                Operation::Mount {
                    device: PathBuf::from("/dev/sdb1"),
                    target: target.join("boot"),
                    fstype: Some("vfat".to_string()),
                    read_only: false,
                },
            ]
        );
    }

    #[test]
    fn missing_image_fails_before_touching_devices() {
        let dir = tempdir().unwrap();
        let hal = FakeHal::new();
        let mut session = MountSession::default();
        let err = mount_source_and_target(
            &hal,
            &template("file:///nonexistent/image.xz".to_string()),
            &settings(dir.path()),
            &mut session,
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("Source image (/nonexistent/image.xz) not found"));
        assert!(hal.operations().is_empty());
        // The temporary trees exist already and must be left for cleanup.
        assert!(session.is_active());
        assert!(session.nbd_device.is_none());
    }

    #[test]
    fn swap_is_not_mounted() {
        let swap = MountSpec {
            key: PartKey::new("sdb", 3),
            mount: "none".to_string(),
            options: None,
        };
        let root = MountSpec {
            key: PartKey::new("sdb", 2),
            mount: "/".to_string(),
            options: None,
        };
        let home = MountSpec {
            key: PartKey::new("sdb", 4),
            mount: "/home".to_string(),
            options: None,
        };
        let mounts = vec![home, swap, root];
        let order: Vec<&str> = mount_order(&mounts).iter().map(|m| m.mount.as_str()).collect();
        assert_eq!(order, vec!["/", "/home"]);
    }
}
