//! Exhaustive sampler with a fixed expansion order.
//!
//! Expands the first untried action, follows the new node down until it
//! fails or runs out of actions, and on the next iteration re-descends along
//! the first open child at each level. With a finite generator it visits
//! every leaf exactly once and then reports the root exhausted.

use super::{can_continue, ensure_explorable, nothing_untried, open_children, Backoff, Sampler};
use crate::actions::{Action, Command, SearchRng};
use crate::config::BackoffConfig;
use crate::environment::{Constant, EvaluationFunction, Simulator};
use crate::error::Result;
use crate::tree::{NodeId, SearchTree};
use crate::value::{Replace, ValueUpdater};
use crate::State;
use std::sync::Arc;
use tracing::warn;

/// Depth past which a single deterministic expansion chain is suspicious.
const DEPTH_WARNING: u32 = 10_000;

pub struct DeterministicSampler<C: Command, S> {
    evaluation: Arc<dyn EvaluationFunction<C, S>>,
    updater: Arc<dyn ValueUpdater<C>>,
    backoff: Backoff,
}

impl<C: Command, S> DeterministicSampler<C, S> {
    pub fn new() -> Self {
        DeterministicSampler {
            evaluation: Arc::new(Constant(0.0)),
            updater: Arc::new(Replace),
            backoff: Backoff::new(BackoffConfig::default()),
        }
    }

    /// Scores the last node of each chain with `evaluation`.
    pub fn with_evaluation(mut self, evaluation: Arc<dyn EvaluationFunction<C, S>>) -> Self {
        self.evaluation = evaluation;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Backoff::new(backoff);
        self
    }
}

impl<C: Command, S> Default for DeterministicSampler<C, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Command, S> Clone for DeterministicSampler<C, S> {
    fn clone(&self) -> Self {
        DeterministicSampler {
            evaluation: self.evaluation.clone(),
            updater: self.updater.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<C: Command, S: State> Sampler<C, S> for DeterministicSampler<C, S> {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    fn tree_policy(&mut self, tree: &SearchTree<C, S>, root: NodeId, _rng: &mut SearchRng) -> Result<Option<NodeId>> {
        ensure_explorable(tree, root)?;
        loop {
            let mut current = root;
            loop {
                let node = tree.node(current);
                if node.is_fully_explored() {
                    ensure_explorable(tree, root)?;
                    break;
                }
                if node.has_untried() {
                    if tree.reserve_expandable(current) {
                        self.backoff.reset();
                        return Ok(Some(current));
                    }
                    break;
                }
                let (free, busy) = open_children(tree, current);
                match free.first().or(busy.first()) {
                    Some(&child) => current = child,
                    None => break,
                }
            }
            if !self.backoff.wait() {
                return Ok(None);
            }
        }
    }

    fn expansion_policy(&mut self, tree: &SearchTree<C, S>, frontier: NodeId, _rng: &mut SearchRng) -> Result<Action<C>> {
        let untried = tree.node(frontier).untried_actions();
        untried.get(0).cloned().ok_or_else(|| nothing_untried(frontier))
    }

    fn keep_expanding(&self, tree: &SearchTree<C, S>, node: NodeId) -> bool {
        let depth = tree.depth(node);
        if depth == DEPTH_WARNING {
            warn!(node = %node, depth, "deterministic expansion is very deep; is the action sequence finite?");
        }
        can_continue(tree, node)
    }

    fn rollout_policy(
        &mut self,
        tree: &SearchTree<C, S>,
        node: NodeId,
        _simulator: &mut dyn Simulator<C, S>,
        _rng: &mut SearchRng,
    ) -> Result<f32> {
        Ok(self.evaluation.value(&tree.node(node)))
    }

    fn backup(&mut self, tree: &SearchTree<C, S>, _root: NodeId, node: NodeId, value: f32) {
        tree.update_value(node, self.updater.as_ref(), value);
    }

    fn box_clone(&self) -> Box<dyn Sampler<C, S>> {
        Box::new(self.clone())
    }
}
