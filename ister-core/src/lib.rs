//! ister core library.
//!
//! Template model and validation, disk and partition planning, source/target staging and
//! the install pipeline. Everything that touches the machine goes through `ister-hal`.

pub mod boot_config;
pub mod cleanup;
pub mod config_states;
pub mod copy;
pub mod disk_resolver;
pub mod errors;
pub mod filesystems;
pub mod fstab;
pub mod installer;
pub mod logging;
pub mod mounts;
pub mod partitioning;
pub mod remote;
pub mod settings;
pub mod source;
pub mod template;
pub mod users;
pub mod uuids;
pub mod validate;

pub use installer::{install_os, run_pipeline};
pub use settings::Settings;
