//! Runs several stages back to back on the same root.

use super::{StageContext, TreeStage};
use crate::actions::Command;
use crate::error::{Result, SearchError};
use crate::tree::NodeId;
use crate::State;
use tracing::{debug, warn};

/// Holds until every inner stage has terminated in turn.
///
/// Each stage is initialized when the one before it finishes, so relative
/// predicates (games played, depth reached) start counting from that point.
pub struct Grouping<C: Command, S> {
    stages: Vec<Box<dyn TreeStage<C, S>>>,
    current: usize,
}

impl<C: Command, S: State> Grouping<C, S> {
    pub fn new(stages: Vec<Box<dyn TreeStage<C, S>>>) -> Self {
        Grouping { stages, current: 0 }
    }

    /// Index of the stage currently being waited on.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<C: Command, S: State> TreeStage<C, S> for Grouping<C, S> {
    fn name(&self) -> &str {
        "grouping"
    }

    fn initialize(&mut self, ctx: &StageContext<'_, C, S>) -> Result<()> {
        self.current = 0;
        match self.stages.first_mut() {
            Some(first) => first.initialize(ctx),
            None => Err(SearchError::IllegalState("grouping stage holds no stages".into())),
        }
    }

    fn check_termination_conditions(&mut self, ctx: &StageContext<'_, C, S>) -> bool {
        while let Some(stage) = self.stages.get_mut(self.current) {
            if !stage.check_termination_conditions(ctx) {
                return false;
            }
            debug!(stage = stage.name(), index = self.current, "grouped stage done");
            self.current += 1;
            if let Some(next) = self.stages.get_mut(self.current) {
                if let Err(err) = next.initialize(ctx) {
                    warn!(stage = next.name(), %err, "could not start grouped stage");
                    self.current = self.stages.len();
                }
            }
        }
        true
    }

    /// Every grouped stage runs on the same root, so the group as a whole
    /// reports that root rather than any one stage's results.
    fn results(&self, ctx: &StageContext<'_, C, S>) -> Vec<NodeId> {
        vec![ctx.root]
    }

    /// Sum of the inner budgets when every stage has one.
    fn iteration_budget(&self) -> Option<u64> {
        self.stages
            .iter()
            .map(|s| s.iteration_budget())
            .sum::<Option<u64>>()
    }
}
