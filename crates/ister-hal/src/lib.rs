//! ister hardware abstraction layer.
//!
//! Everything that touches block devices, mounts, external tools or the process root goes
//! through the traits defined here, so the install pipeline can be exercised against
//! [`FakeHal`] without root privileges or real disks.

pub mod error;
pub mod hal;
pub mod path;
pub mod procfs;

pub use error::{HalError, HalResult};
pub use hal::*;
