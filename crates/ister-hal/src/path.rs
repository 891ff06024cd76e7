use std::path::PathBuf;

/// Partition name for a block device. Handles nvme/mmcblk postfixing.
pub fn partition_path(disk: &str, num: u32) -> String {
    if disk.contains("nvme") || disk.contains("mmcblk") {
        format!("{}p{}", disk, num)
    } else {
        format!("{}{}", disk, num)
    }
}

/// `/dev/<name>` for a bare device name such as `sda` or `sda1`.
pub fn device_path(name: &str) -> PathBuf {
    if name.starts_with("/dev/") {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("/dev/{}", name))
    }
}
