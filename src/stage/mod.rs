//! # Tree Stages
//!
//! A stage runs the worker pool against one root until its termination
//! predicate holds, then turns the grown subtree into a result list.
//!
//! ```text
//!  Uninitialized ──initialize──> Running ──predicate true──> Terminated
//!                                   │                            │
//!                          check_termination_conditions      results
//! ```
//!
//! Stages never stop workers themselves; the driver ([`crate::Search`])
//! polls the predicate, stops dispatching, joins the workers and only then
//! asks for results. Chaining stages means running the next one on a node
//! returned by the previous.

mod depth;
mod grouping;
mod simple;

pub use depth::{MaxDepth, MinDepth};
pub use grouping::Grouping;
pub use simple::{FixedGames, SearchForever};

use crate::actions::Command;
use crate::error::{Result, SearchError};
use crate::tree::{NodeId, SearchTree};
use crate::worker::GameCounter;
use tracing::info;

/// What a stage can see while it runs.
pub struct StageContext<'a, C: Command, S> {
    pub tree: &'a SearchTree<C, S>,
    pub root: NodeId,
    pub worker_count: usize,
    /// Workers still running their loop
    pub active_workers: usize,
    pub counter: &'a GameCounter,
}

/// Termination predicate and result extraction of one stage.
pub trait TreeStage<C: Command, S>: Send {
    fn name(&self) -> &str;

    /// Snapshots whatever the predicate measures relative to the start.
    fn initialize(&mut self, ctx: &StageContext<'_, C, S>) -> Result<()>;

    fn check_termination_conditions(&mut self, ctx: &StageContext<'_, C, S>) -> bool;

    /// Nodes this stage produced. Only meaningful after termination.
    fn results(&self, ctx: &StageContext<'_, C, S>) -> Vec<NodeId>;

    /// Hard cap on iterations dispatched for this stage, if any.
    fn iteration_budget(&self) -> Option<u64> {
        None
    }
}

/// Lifecycle of a stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Uninitialized,
    Running,
    Terminated,
}

/// Enforces the lifecycle around a [`TreeStage`].
pub struct StageDriver<'s, C: Command, S> {
    stage: &'s mut dyn TreeStage<C, S>,
    state: StageState,
}

impl<'s, C: Command, S> StageDriver<'s, C, S> {
    pub fn new(stage: &'s mut dyn TreeStage<C, S>) -> Self {
        StageDriver {
            stage,
            state: StageState::Uninitialized,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn iteration_budget(&self) -> Option<u64> {
        self.stage.iteration_budget()
    }

    pub fn initialize(&mut self, ctx: &StageContext<'_, C, S>) -> Result<()> {
        if self.state != StageState::Uninitialized {
            return Err(SearchError::IllegalState(format!(
                "stage {} initialized twice",
                self.stage.name()
            )));
        }
        if ctx.worker_count == 0 {
            return Err(SearchError::IllegalState(format!(
                "stage {} needs at least one worker",
                self.stage.name()
            )));
        }
        self.stage.initialize(ctx)?;
        self.state = StageState::Running;
        info!(stage = self.stage.name(), root = %ctx.root, workers = ctx.worker_count, "stage started");
        Ok(())
    }

    /// Polls the predicate; once it holds the stage stays terminated.
    pub fn poll(&mut self, ctx: &StageContext<'_, C, S>) -> bool {
        match self.state {
            StageState::Terminated => true,
            StageState::Uninitialized => false,
            StageState::Running => {
                if self.stage.check_termination_conditions(ctx) {
                    info!(stage = self.stage.name(), "stage termination conditions met");
                    self.state = StageState::Terminated;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Marks the stage finished because no worker can make progress.
    pub fn finish(&mut self) {
        if self.state == StageState::Running {
            info!(stage = self.stage.name(), "stage finished with all workers idle");
            self.state = StageState::Terminated;
        }
    }

    pub fn results(&self, ctx: &StageContext<'_, C, S>) -> Result<Vec<NodeId>> {
        if self.state != StageState::Terminated {
            return Err(SearchError::IllegalState(format!(
                "results of stage {} requested before termination",
                self.stage.name()
            )));
        }
        Ok(self.stage.results(ctx))
    }
}
