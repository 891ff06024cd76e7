use thiserror::Error;

/// Result type alias for ister operations
pub type Result<T> = anyhow::Result<T>;

/// Template problems found before anything touches a disk.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Missing {0} field")]
    MissingField(&'static str),

    #[error("Invalid ImageSourceType {0}, supported types are: local, remote")]
    InvalidSourceType(String),

    #[error("Invalid {section} section: {entry}")]
    InvalidEntry { section: &'static str, entry: String },

    #[error("Invalid size {size} for disk {disk} partition {partition}")]
    InvalidSize {
        disk: String,
        partition: u32,
        size: String,
    },

    #[error("Invalid partition type {0}, supported types are: EFI, linux, swap")]
    InvalidPartitionType(String),

    #[error(
        "Invalid filesystem type {0}, supported types are: ext2, ext3, ext4, vfat, btrfs, xfs, swap"
    )]
    InvalidFilesystemType(String),

    #[error("Multiple EFI partitions defined")]
    MultipleEfi,

    #[error("No EFI partition defined")]
    NoEfi,

    #[error("Partition other than last uses rest of disk {disk} partition {partition}")]
    RemainingNotLast { disk: String, partition: u32 },

    #[error("Duplicate disk {disk} and partition {partition} entry in {section}")]
    DuplicateKey {
        section: &'static str,
        disk: String,
        partition: u32,
    },

    #[error("disk {disk} partition {partition} used in {section} not found in {referenced}")]
    DanglingKey {
        section: &'static str,
        referenced: &'static str,
        disk: String,
        partition: u32,
    },

    #[error("Invalid mount point {mount} for disk {disk} partition {partition}")]
    InvalidMount {
        disk: String,
        partition: u32,
        mount: String,
    },

    #[error("Missing username for user entry: {0}")]
    MissingUsername(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Duplicate username: {0}")]
    DuplicateUsername(String),

    #[error("Invalid UID: {0}")]
    InvalidUid(i64),

    #[error("Duplicate UID: {0}")]
    DuplicateUid(u32),

    #[error("Invalid sudo option: {0}")]
    InvalidSudo(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiskError {
    #[error("No target disk available")]
    NoTargetDisk,

    #[error("Could not distinguish install disk")]
    NotDistinguished,
}

/// Failures of the install steps that follow validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("Invalid configuration file")]
    InvalidPointerFile,

    #[error("Unsupported template location: {0}")]
    UnsupportedLocation(String),

    #[error("Unable to obtain remote image")]
    RemoteImage,

    #[error("Partition plan for {0} does not fit on a disk")]
    PlanOverflow(String),

    #[error("Source image ({0}) not found")]
    SourceImageMissing(String),

    #[error("No partition is mounted at /")]
    NoRootPartition,

    #[error("Partition uuid not found in {0}")]
    MissingUuid(String),

    #[error("Unexpected boot loader entry {0}: line 4 is not an options line")]
    BootEntryShape(String),

    #[error("Template has not been validated")]
    NotValidated,
}
