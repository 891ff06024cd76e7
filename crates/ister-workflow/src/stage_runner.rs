use anyhow::{Context, Result};

pub type StageFn<'a, S> = Box<dyn Fn(&mut S) -> Result<()> + 'a>;

pub struct StageDefinition<'a, S> {
    pub name: &'a str,
    pub run: StageFn<'a, S>,
}

impl<'a, S> StageDefinition<'a, S> {
    pub fn new(name: &'a str, run: impl Fn(&mut S) -> Result<()> + 'a) -> Self {
        Self {
            name,
            run: Box::new(run),
        }
    }
}

/// Progress bookkeeping the runner drives on the caller's state.
pub trait WorkflowState {
    fn set_current(&mut self, stage: &str);
    fn mark_completed(&mut self, stage: &str);
}

/// Runs stages strictly in order. There is no persistence and no resume: the first
/// failing stage stops the run and its error is returned with the stage name attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageRunner;

impl StageRunner {
    pub fn new() -> Self {
        Self
    }

    pub fn run<S>(&self, stages: &[StageDefinition<'_, S>], state: &mut S) -> Result<()>
    where
        S: WorkflowState,
    {
        let total = stages.len();
        for (idx, stage) in stages.iter().enumerate() {
            log::info!("stage {}/{}: {}", idx + 1, total, stage.name);
            state.set_current(stage.name);

            (stage.run)(state).with_context(|| format!("stage {} failed", stage.name))?;

            state.mark_completed(stage.name);
            log::info!("stage {} complete", stage.name);
        }
        Ok(())
    }
}
