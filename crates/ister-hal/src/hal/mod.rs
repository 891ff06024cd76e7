//! HAL trait definitions and implementations.
//!
//! This module defines the traits for every system operation the installer performs and
//! provides both the real (LinuxHal) and the recording (FakeHal) implementation.

pub mod account_ops;
pub mod copy_ops;
pub mod fake_hal;
pub mod format_ops;
pub mod guards;
pub mod host_ops;
pub mod image_ops;
pub mod linux_hal;
pub mod mount_ops;
pub mod nbd_ops;
pub mod partition_ops;
pub mod probe_ops;
pub mod root_ops;

pub use account_ops::{AccountOps, AccountSpec, UserIds};
pub use copy_ops::{CopyOps, CopyOptions};
pub use fake_hal::{FakeHal, Operation};
pub use format_ops::{FormatOps, FormatOptions};
pub use guards::RootGuard;
pub use host_ops::HostOps;
pub use image_ops::ImageOps;
pub use linux_hal::LinuxHal;
pub use mount_ops::{MountOps, MountOptions};
pub use nbd_ops::NbdOps;
pub use partition_ops::{PartedOp, PartitionOps};
pub use probe_ops::ProbeOps;
pub use root_ops::{RootHandle, RootOps};

/// Complete HAL combining every operation the install pipeline needs.
pub trait InstallerHal:
    PartitionOps
    + FormatOps
    + MountOps
    + NbdOps
    + ImageOps
    + ProbeOps
    + HostOps
    + CopyOps
    + AccountOps
    + RootOps
{
}

/// Automatically implement InstallerHal for any type implementing all required traits.
impl<T> InstallerHal for T where
    T: PartitionOps
        + FormatOps
        + MountOps
        + NbdOps
        + ImageOps
        + ProbeOps
        + HostOps
        + CopyOps
        + AccountOps
        + RootOps
{
}
