//! Stages that terminate on how deep the tree has grown.

use super::{StageContext, TreeStage};
use crate::actions::Command;
use crate::error::Result;
use crate::tree::NodeId;
use crate::State;

/// Stops as soon as any branch reaches `max_relative_depth` below the root.
///
/// `max_games` caps the search in case no branch ever gets that deep.
#[derive(Debug, Clone)]
pub struct MaxDepth {
    max_relative_depth: u32,
    max_games: u64,
    target_depth: u32,
    initial_games: u64,
}

impl MaxDepth {
    pub fn new(max_relative_depth: u32, max_games: u64) -> Self {
        MaxDepth {
            max_relative_depth,
            max_games,
            target_depth: max_relative_depth,
            initial_games: 0,
        }
    }

    /// Absolute depth the stage is looking for. Set on initialization.
    pub fn target_depth(&self) -> u32 {
        self.target_depth
    }
}

impl<C: Command, S: State> TreeStage<C, S> for MaxDepth {
    fn name(&self) -> &str {
        "max_depth"
    }

    fn initialize(&mut self, ctx: &StageContext<'_, C, S>) -> Result<()> {
        self.target_depth = ctx.tree.depth(ctx.root) + self.max_relative_depth;
        self.initial_games = ctx.counter.iterations();
        Ok(())
    }

    fn check_termination_conditions(&mut self, ctx: &StageContext<'_, C, S>) -> bool {
        let played = ctx.counter.iterations().saturating_sub(self.initial_games);
        ctx.tree.is_fully_explored(ctx.root)
            || ctx.tree.max_branch_depth(ctx.root) >= self.target_depth
            || played >= self.max_games
    }

    /// The first node found at the target depth, or nothing if no branch got there.
    fn results(&self, ctx: &StageContext<'_, C, S>) -> Vec<NodeId> {
        if ctx.tree.max_branch_depth(ctx.root) < self.target_depth {
            return Vec::new();
        }
        ctx.tree
            .get_leaves(ctx.root)
            .into_iter()
            .find_map(|leaf| ctx.tree.ancestor_at_depth(leaf, self.target_depth))
            .into_iter()
            .collect()
    }

    fn iteration_budget(&self) -> Option<u64> {
        Some(self.max_games)
    }
}

/// Stops once everything above `min_relative_depth` has been tried.
///
/// Every leaf must have reached the target depth or failed, and no node
/// above the target depth may have untried actions left.
#[derive(Debug, Clone)]
pub struct MinDepth {
    min_relative_depth: u32,
    target_depth: u32,
}

impl MinDepth {
    pub fn new(min_relative_depth: u32) -> Self {
        MinDepth {
            min_relative_depth,
            target_depth: min_relative_depth,
        }
    }

    pub fn target_depth(&self) -> u32 {
        self.target_depth
    }

    fn covered<C: Command, S: State>(&self, ctx: &StageContext<'_, C, S>) -> bool {
        let tree = ctx.tree;
        tree.get_leaves(ctx.root).into_iter().all(|leaf| {
            let node = tree.node(leaf);
            if node.depth() < self.target_depth && !node.is_failed() {
                return false;
            }
            let start = tree.ancestor_at_depth(leaf, self.target_depth).unwrap_or(leaf);
            let mut current = tree.node(start).parent();
            while let Some(id) = current {
                let n = tree.node(id);
                if n.has_untried() {
                    return false;
                }
                if id == ctx.root {
                    break;
                }
                current = n.parent();
            }
            true
        })
    }
}

impl<C: Command, S: State> TreeStage<C, S> for MinDepth {
    fn name(&self) -> &str {
        "min_depth"
    }

    fn initialize(&mut self, ctx: &StageContext<'_, C, S>) -> Result<()> {
        self.target_depth = ctx.tree.depth(ctx.root) + self.min_relative_depth;
        Ok(())
    }

    fn check_termination_conditions(&mut self, ctx: &StageContext<'_, C, S>) -> bool {
        ctx.tree.is_fully_explored(ctx.root) || ctx.active_workers == 0 || self.covered(ctx)
    }

    /// Distinct nodes at the target depth, in depth-first order.
    fn results(&self, ctx: &StageContext<'_, C, S>) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for leaf in ctx.tree.get_leaves(ctx.root) {
            if let Some(at_depth) = ctx.tree.ancestor_at_depth(leaf, self.target_depth) {
                if !out.contains(&at_depth) {
                    out.push(at_depth);
                }
            }
        }
        out
    }
}
