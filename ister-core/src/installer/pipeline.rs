use crate::boot_config::update_loader;
use crate::cleanup::{cleanup, cleanup_best_effort};
use crate::config_states::{UnvalidatedTemplate, ValidatedTemplate};
use crate::copy::{copy_tree, CopyMode};
use crate::disk_resolver::find_target_disk;
use crate::errors::{InstallError, Result};
use crate::filesystems::create_filesystems;
use crate::fstab::write_fstab;
use crate::mounts::{mount_source_and_target, MountSession};
use crate::partitioning::{execute_plan, plan_partitions};
use crate::remote::{resolve_remote_refs, ResolvedKeys};
use crate::settings::Settings;
use crate::source::{fetch_template, read_pointer_file};
use crate::template::InstallTemplate;
use crate::users::provision_users;
use crate::uuids::{resolve_partitions, ResolvedPartition};
use anyhow::{anyhow, Context};
use ister_hal::InstallerHal;
use ister_workflow::stage_runner::{StageDefinition, StageRunner, WorkflowState};
use std::fmt;

/// Stage names in execution order.
pub const STAGES: [&str; 10] = [
    "Validate",
    "PlanAndPartition",
    "Format",
    "MountSourceAndTarget",
    "CopyImage",
    "ResolveUUIDs",
    "PatchBootConfig",
    "PatchFstab",
    "ProvisionUsers",
    "Cleanup",
];

/// In-memory progress of one install. Nothing is persisted.
#[derive(Debug, Default)]
pub struct InstallState {
    pub current_stage: Option<String>,
    pub completed_stages: Vec<String>,
    pub session: MountSession,
    pending: Option<UnvalidatedTemplate>,
    template: Option<ValidatedTemplate>,
    keys: ResolvedKeys,
    resolved: Vec<ResolvedPartition>,
}

impl InstallState {
    pub fn new(template: UnvalidatedTemplate) -> Self {
        Self {
            pending: Some(template),
            ..Self::default()
        }
    }

    pub fn template(&self) -> Option<&InstallTemplate> {
        self.template.as_deref()
    }

    pub fn resolved(&self) -> &[ResolvedPartition] {
        &self.resolved
    }
}

impl WorkflowState for InstallState {
    fn set_current(&mut self, stage: &str) {
        self.current_stage = Some(stage.to_string());
    }

    fn mark_completed(&mut self, stage: &str) {
        self.completed_stages.push(stage.to_string());
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, stage) in STAGES.iter().enumerate() {
            let mark = if self.completed_stages.iter().any(|s| s == stage) {
                "done"
            } else if self.current_stage.as_deref() == Some(*stage) {
                "failed"
            } else {
                "pending"
            };
            writeln!(f, "{:02}. {} [{}]", idx + 1, stage, mark)?;
        }
        Ok(())
    }
}

fn validated(slot: &Option<ValidatedTemplate>) -> Result<&InstallTemplate> {
    slot.as_deref()
        .ok_or_else(|| InstallError::NotValidated.into())
}

fn install_stages<'a, H>(hal: &'a H, settings: &'a Settings) -> Vec<StageDefinition<'a, InstallState>>
where
    H: InstallerHal + ?Sized,
{
    vec![
        StageDefinition::new(STAGES[0], move |state: &mut InstallState| {
            let pending = state
                .pending
                .take()
                .ok_or_else(|| anyhow!("No template to validate"))?;
            let template = pending.validate(|| find_target_disk(hal, settings))?;
            state.keys = resolve_remote_refs(&template)?;
            state.template = Some(template);
            Ok(())
        }),
        StageDefinition::new(STAGES[1], move |state: &mut InstallState| {
            let template = validated(&state.template)?;
            execute_plan(hal, &plan_partitions(&template.partitions)?)
        }),
        StageDefinition::new(STAGES[2], move |state: &mut InstallState| {
            create_filesystems(hal, &validated(&state.template)?.filesystems)
        }),
        StageDefinition::new(STAGES[3], move |state: &mut InstallState| {
            let template = validated(&state.template)?;
            mount_source_and_target(hal, template, settings, &mut state.session)
        }),
        StageDefinition::new(STAGES[4], move |state: &mut InstallState| {
            copy_tree(
                hal,
                state.session.source()?,
                state.session.target()?,
                CopyMode::Full,
            )
        }),
        StageDefinition::new(STAGES[5], move |state: &mut InstallState| {
            let template = validated(&state.template)?;
            let listing = hal.blkid_listing().context("Call to blkid failed")?;
            state.resolved = resolve_partitions(template, &listing, settings.nbd_name())?;
            Ok(())
        }),
        StageDefinition::new(STAGES[6], move |state: &mut InstallState| {
            update_loader(&state.resolved, state.session.target()?, &settings.loader_entry)
        }),
        StageDefinition::new(STAGES[7], move |state: &mut InstallState| {
            write_fstab(&state.resolved, state.session.target()?)
        }),
        StageDefinition::new(STAGES[8], move |state: &mut InstallState| {
            let template = validated(&state.template)?;
            provision_users(hal, &template.users, &state.keys, state.session.target()?)
        }),
        StageDefinition::new(STAGES[9], move |state: &mut InstallState| {
            cleanup(hal, &mut state.session)
        }),
    ]
}

/// Run every stage against `template`. A failure after the mount session has been opened
/// triggers a best-effort cleanup; the error returned is always the one that stopped the run.
pub fn run_pipeline<H>(
    hal: &H,
    settings: &Settings,
    template: UnvalidatedTemplate,
) -> Result<InstallState>
where
    H: InstallerHal + ?Sized,
{
    let mut state = InstallState::new(template);
    let stages = install_stages(hal, settings);

    if let Err(err) = StageRunner::new().run(&stages, &mut state) {
        log::error!("install failed: {:#}", err);
        if state.session.is_active() {
            cleanup_best_effort(hal, &mut state.session);
        }
        log::info!("install progress:\n{}", state);
        return Err(err);
    }
    Ok(state)
}

/// Read the pointer file, fetch the template it names and install from it.
pub fn install_os<H>(hal: &H, settings: &Settings) -> Result<()>
where
    H: InstallerHal + ?Sized,
{
    let location = read_pointer_file(&settings.pointer_path)?;
    let template = fetch_template(&location)?;
    run_pipeline(hal, settings, template)?;
    Ok(())
}
