//! Partition planning and execution.
//!
//! Offsets are in MiB and chain per disk, starting again at 0 when the disk changes. A
//! partition sized "remaining" ends at [`END_OF_DISK`].

use crate::errors::{InstallError, Result};
use crate::template::{PartKey, PartitionRole, PartitionSize, PartitionSpec};
use anyhow::Context;
use ister_hal::path::device_path;
use ister_hal::{PartedOp, PartitionOps};

/// End offset meaning "up to the end of the disk".
pub const END_OF_DISK: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPartition {
    pub key: PartKey,
    pub role: PartitionRole,
    pub start_mib: i64,
    pub end_mib: i64,
}

impl PlannedPartition {
    pub fn fs_hint(&self) -> &'static str {
        self.role.parted_hint()
    }
}

/// Lay out `specs` sorted by `(disk, partition)`. Fails if an end offset leaves the `i64`
/// range parted is driven with.
pub fn plan_partitions(specs: &[PartitionSpec]) -> Result<Vec<PlannedPartition>> {
    let mut sorted: Vec<&PartitionSpec> = specs.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let mut plan = Vec::with_capacity(sorted.len());
    let mut current_disk: Option<&str> = None;
    let mut start: i64 = 0;
    for spec in sorted {
        if current_disk != Some(spec.key.disk.as_str()) {
            current_disk = Some(spec.key.disk.as_str());
            start = 0;
        }
        let end = match spec.size {
            PartitionSize::Remaining => END_OF_DISK,
            PartitionSize::Mebibytes(mib) => i64::try_from(mib)
                .ok()
                .and_then(|mib| start.checked_add(mib))
                .ok_or_else(|| InstallError::PlanOverflow(spec.key.to_string()))?,
        };
        plan.push(PlannedPartition {
            key: spec.key.clone(),
            role: spec.role,
            start_mib: start,
            end_mib: end,
        });
        start = end;
    }
    Ok(plan)
}

fn offset_arg(mib: i64) -> String {
    if mib == END_OF_DISK {
        END_OF_DISK.to_string()
    } else {
        format!("{}MiB", mib)
    }
}

/// Write a fresh GPT label on every disk in the plan, then create each partition. The EFI
/// partition gets its boot flag right after it is created.
pub fn execute_plan<H: PartitionOps + ?Sized>(hal: &H, plan: &[PlannedPartition]) -> Result<()> {
    let mut disks: Vec<&str> = plan.iter().map(|p| p.key.disk.as_str()).collect();
    disks.sort_unstable();
    disks.dedup();

    for disk in disks {
        log::info!("writing GPT label on /dev/{}", disk);
        hal.parted(
            &device_path(disk),
            PartedOp::MkLabel {
                label: "gpt".to_string(),
            },
        )
        .with_context(|| format!("Failed to create partition table on {}", disk))?;
    }

    for part in plan {
        let disk = device_path(&part.key.disk);
        log::info!(
            "creating {} ({}) from {} to {}",
            part.key,
            part.fs_hint(),
            offset_arg(part.start_mib),
            offset_arg(part.end_mib)
        );
        hal.parted(
            &disk,
            PartedOp::MkPart {
                part_type: "primary".to_string(),
                fs_type: part.fs_hint().to_string(),
                start: offset_arg(part.start_mib),
                end: offset_arg(part.end_mib),
            },
        )
        .with_context(|| format!("Failed to create {}", part.key))?;

        if part.role == PartitionRole::Efi {
            hal.parted(
                &disk,
                PartedOp::SetFlag {
                    part_num: part.key.partition,
                    flag: "boot".to_string(),
                    state: "on".to_string(),
                },
            )
            .with_context(|| format!("Failed to set boot flag on {}", part.key))?;
        }
    }
    Ok(())
}
