//! Stages that report the root itself.

use super::{StageContext, TreeStage};
use crate::actions::Command;
use crate::error::Result;
use crate::tree::NodeId;
use crate::State;

/// Runs a fixed number of iterations.
#[derive(Debug, Clone)]
pub struct FixedGames {
    target: u64,
    initial_games: u64,
}

impl FixedGames {
    pub fn new(target: u64) -> Self {
        FixedGames {
            target,
            initial_games: 0,
        }
    }
}

impl<C: Command, S: State> TreeStage<C, S> for FixedGames {
    fn name(&self) -> &str {
        "fixed_games"
    }

    fn initialize(&mut self, ctx: &StageContext<'_, C, S>) -> Result<()> {
        self.initial_games = ctx.counter.iterations();
        Ok(())
    }

    fn check_termination_conditions(&mut self, ctx: &StageContext<'_, C, S>) -> bool {
        let played = ctx.counter.iterations().saturating_sub(self.initial_games);
        played + ctx.worker_count as u64 >= self.target || ctx.tree.is_fully_explored(ctx.root)
    }

    fn results(&self, ctx: &StageContext<'_, C, S>) -> Vec<NodeId> {
        vec![ctx.root]
    }

    fn iteration_budget(&self) -> Option<u64> {
        Some(self.target)
    }
}

/// Runs until the root is fully explored.
#[derive(Debug, Clone, Default)]
pub struct SearchForever;

impl<C: Command, S: State> TreeStage<C, S> for SearchForever {
    fn name(&self) -> &str {
        "search_forever"
    }

    fn initialize(&mut self, _ctx: &StageContext<'_, C, S>) -> Result<()> {
        Ok(())
    }

    fn check_termination_conditions(&mut self, ctx: &StageContext<'_, C, S>) -> bool {
        ctx.tree.is_fully_explored(ctx.root)
    }

    fn results(&self, ctx: &StageContext<'_, C, S>) -> Vec<NodeId> {
        vec![ctx.root]
    }
}
