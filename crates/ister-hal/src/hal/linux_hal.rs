//! Linux HAL implementation using real system calls and external tools.

use super::{
    AccountOps, AccountSpec, CopyOps, CopyOptions, FormatOps, FormatOptions, HostOps, ImageOps,
    MountOps, MountOptions, NbdOps, PartedOp, PartitionOps, ProbeOps, RootHandle, RootOps,
    UserIds,
};
use crate::procfs::mountinfo;
use crate::{HalError, HalResult};
use nix::mount::{MntFlags, MsFlags};
use nix::unistd::User;
use std::fs::{self, File};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// Real HAL implementation for Linux systems.
#[derive(Debug, Clone, Default)]
pub struct LinuxHal;

impl LinuxHal {
    pub fn new() -> Self {
        Self
    }
}

fn map_command_err(program: &str, err: io::Error) -> HalError {
    if err.kind() == io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

fn output_failed(program: &str, output: &Output) -> HalError {
    HalError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Run a command to completion. There is no timeout: block-device tools are not safe to
/// interrupt halfway.
fn run_output(program: &str, cmd: &mut Command) -> HalResult<Output> {
    log::info!("exec: {:?}", cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let output = cmd.output().map_err(|e| map_command_err(program, e))?;
    if !output.status.success() {
        return Err(output_failed(program, &output));
    }
    Ok(output)
}

fn run_status(program: &str, cmd: &mut Command) -> HalResult<()> {
    run_output(program, cmd).map(|_| ())
}

fn run_stdout(program: &str, cmd: &mut Command) -> HalResult<String> {
    let output = run_output(program, cmd)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn map_nix_err(err: nix::errno::Errno) -> HalError {
    use nix::errno::Errno;
    match err {
        Errno::EBUSY => HalError::Busy,
        Errno::EACCES | Errno::EPERM => HalError::PermissionDenied,
        other => HalError::Nix(other),
    }
}

impl PartitionOps for LinuxHal {
    fn parted(&self, disk: &Path, op: PartedOp) -> HalResult<String> {
        let mut args: Vec<String> = vec!["-s".to_string(), "-a".to_string(), "minimal".to_string()];
        // `--` keeps a negative end offset from being read as an option.
        args.push("--".to_string());
        args.push(disk.display().to_string());
        match op {
            PartedOp::MkLabel { label } => {
                args.push("mklabel".to_string());
                args.push(label);
            }
            PartedOp::MkPart {
                part_type,
                fs_type,
                start,
                end,
            } => {
                args.push("mkpart".to_string());
                args.push(part_type);
                args.push(fs_type);
                args.push(start);
                args.push(end);
            }
            PartedOp::SetFlag {
                part_num,
                flag,
                state,
            } => {
                args.push("set".to_string());
                args.push(part_num.to_string());
                args.push(flag);
                args.push(state);
            }
        }

        let mut cmd = Command::new("parted");
        cmd.args(&args);
        run_stdout("parted", &mut cmd)
    }
}

impl FormatOps for LinuxHal {
    fn make_filesystem(&self, program: &str, device: &Path, opts: &FormatOptions) -> HalResult<()> {
        let mut cmd = Command::new(program);
        cmd.args(&opts.extra_args).arg(device);
        run_status(program, &mut cmd)
    }
}

impl MountOps for LinuxHal {
    fn mount_device(
        &self,
        device: &Path,
        target: &Path,
        fstype: Option<&str>,
        options: MountOptions,
    ) -> HalResult<()> {
        let Some(fstype) = fstype else {
            // mount(2) needs a filesystem type; let mount(8) probe it.
            let mut cmd = Command::new("mount");
            if options.read_only {
                cmd.arg("-o").arg("ro");
            }
            cmd.arg(device).arg(target);
            return run_status("mount", &mut cmd);
        };

        log::info!(
            "mount {} -> {} ({})",
            device.display(),
            target.display(),
            fstype
        );
        let mut flags = MsFlags::empty();
        if options.read_only {
            flags |= MsFlags::MS_RDONLY;
        }
        nix::mount::mount(Some(device), target, Some(fstype), flags, None::<&str>)
            .map_err(map_nix_err)?;
        Ok(())
    }

    fn unmount_recursive(&self, target: &Path) -> HalResult<()> {
        log::info!("unmount -R {}", target.display());
        let entries = mountinfo::parse_mountinfo(&self.proc_mountinfo()?);
        for mp in mountinfo::mounts_under(target, &entries) {
            match nix::mount::umount2(&mp, MntFlags::empty()) {
                Ok(()) => {}
                // Already gone (e.g. taken down with its parent).
                Err(nix::errno::Errno::EINVAL) | Err(nix::errno::Errno::ENOENT) => {}
                Err(err) => return Err(map_nix_err(err)),
            }
        }
        Ok(())
    }

    fn is_mounted(&self, path: &Path) -> HalResult<bool> {
        let entries = mountinfo::parse_mountinfo(&self.proc_mountinfo()?);
        Ok(mountinfo::is_mounted_from_info(path, &entries))
    }
}

impl NbdOps for LinuxHal {
    fn nbd_load_module(&self, max_part: u32) -> HalResult<()> {
        let mut cmd = Command::new("modprobe");
        cmd.arg("nbd").arg(format!("max_part={}", max_part));
        run_status("modprobe", &mut cmd)
    }

    fn nbd_attach(&self, image: &Path, device: &str) -> HalResult<()> {
        let mut cmd = Command::new("qemu-nbd");
        cmd.args(["-c", device]).arg(image);
        run_status("qemu-nbd", &mut cmd)
    }

    fn nbd_detach(&self, device: &str) -> HalResult<()> {
        let mut cmd = Command::new("qemu-nbd");
        cmd.args(["-d", device]);
        run_status("qemu-nbd", &mut cmd)
    }
}

impl ImageOps for LinuxHal {
    fn decompress_xz(&self, compressed: &Path, dest: &Path) -> HalResult<u64> {
        log::info!(
            "decompressing {} -> {}",
            compressed.display(),
            dest.display()
        );
        let input = File::open(compressed)?;
        let mut reader = xz2::read::XzDecoder::new(input);
        let mut out = File::create(dest)?;
        let written = io::copy(&mut reader, &mut out)?;
        out.sync_all()?;
        Ok(written)
    }
}

impl ProbeOps for LinuxHal {
    fn blkid_listing(&self) -> HalResult<String> {
        let mut cmd = Command::new("blkid");
        run_stdout("blkid", &mut cmd)
    }
}

impl HostOps for LinuxHal {
    fn device_exists(&self, device: &Path) -> bool {
        device.exists()
    }

    fn proc_mountinfo(&self) -> HalResult<String> {
        Ok(fs::read_to_string("/proc/self/mountinfo")?)
    }
}

impl CopyOps for LinuxHal {
    fn copy_tree(&self, src: &Path, dst: &Path, opts: &CopyOptions) -> HalResult<()> {
        let mut args: Vec<String> = vec!["-aAHX".to_string()];
        for exclude in &opts.excludes {
            args.push("--exclude".to_string());
            args.push(exclude.clone());
        }
        if opts.skeleton {
            args.extend(
                ["-f", "+ */", "-f", "- *"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        // Trailing slash on src copies its contents rather than the directory itself.
        args.push(format!("{}/", src.display()));
        args.push(dst.display().to_string());

        let mut cmd = Command::new("rsync");
        cmd.args(&args);
        run_status("rsync", &mut cmd)
    }
}

impl AccountOps for LinuxHal {
    fn create_account(&self, spec: &AccountSpec) -> HalResult<()> {
        let mut cmd = Command::new("useradd");
        cmd.args(["-U", "-m", "-p", ""]);
        if let Some(uid) = spec.uid {
            cmd.arg("-u").arg(uid.to_string());
        }
        cmd.arg(&spec.username);
        run_status("useradd", &mut cmd)
    }

    fn lookup_user(&self, username: &str) -> HalResult<UserIds> {
        let user = User::from_name(username)
            .map_err(map_nix_err)?
            .ok_or_else(|| HalError::UserNotFound(username.to_string()))?;
        Ok(UserIds {
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
        })
    }
}

impl RootOps for LinuxHal {
    fn enter_root(&self, new_root: &Path) -> HalResult<RootHandle> {
        // Resolve a passwd entry before leaving the real root so the NSS modules are loaded
        // from the installer and not from the target, which would pin the target mounts.
        let _ = User::from_name("root");

        let real_root = File::open("/")?;
        nix::unistd::chroot(new_root).map_err(map_nix_err)?;
        std::env::set_current_dir("/")?;
        Ok(RootHandle::new("/", Some(real_root)))
    }

    fn restore_root(&self, handle: RootHandle) -> HalResult<()> {
        let Some(real_root) = handle.into_real_root() else {
            return Ok(());
        };
        nix::unistd::fchdir(real_root.as_raw_fd()).map_err(map_nix_err)?;
        nix::unistd::chroot(".").map_err(map_nix_err)?;
        Ok(())
    }
}
