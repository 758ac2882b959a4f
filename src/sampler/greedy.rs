//! Greedy sampler with a depth-scaled sample budget.
//!
//! Searches below a moving *working root*. After the working root has
//! received its budget of `samples_at_depth(depth)` iterations, the sampler
//! commits to the best leaf found so far by moving the working root
//! `forward_jump` levels toward it. When the working root turns out to be
//! fully explored, it backs off toward the stage root, jumping further on
//! each consecutive dead end.

use super::{DistributionSampler, Sampler};
use crate::actions::{Action, Command, SearchRng};
use crate::config::{BackoffConfig, GreedyConfig};
use crate::environment::{EvaluationFunction, Simulator};
use crate::error::{Result, SearchError};
use crate::tree::{NodeId, SearchTree};
use crate::State;
use std::sync::Arc;
use tracing::debug;

pub struct GreedySampler<C: Command, S> {
    config: GreedyConfig,
    inner: DistributionSampler<C, S>,
    working_root: Option<NodeId>,
    samples_here: u32,
    backwards_jump: f64,
}

impl<C: Command, S> GreedySampler<C, S> {
    pub fn new(config: GreedyConfig, evaluation: Arc<dyn EvaluationFunction<C, S>>) -> Self {
        let backwards_jump = config.backwards_jump_min as f64;
        GreedySampler {
            config,
            inner: DistributionSampler::new(evaluation),
            working_root: None,
            samples_here: 0,
            backwards_jump,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.inner = self.inner.with_backoff(backoff);
        self
    }

    pub fn working_root(&self) -> Option<NodeId> {
        self.working_root
    }
}

impl<C: Command, S> Clone for GreedySampler<C, S> {
    fn clone(&self) -> Self {
        GreedySampler {
            config: self.config.clone(),
            inner: self.inner.clone(),
            working_root: None,
            samples_here: 0,
            backwards_jump: self.config.backwards_jump_min as f64,
        }
    }
}

impl<C: Command, S: State> GreedySampler<C, S> {
    /// Best scoring leaf below `id` that is worth following.
    fn best_leaf(&self, tree: &SearchTree<C, S>, id: NodeId) -> Option<NodeId> {
        let evaluation = self.inner.evaluation();
        tree.get_leaves(id)
            .into_iter()
            .map(|leaf| (leaf, evaluation.value(&tree.node(leaf))))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(leaf, _)| leaf)
    }

    /// Moves the working root and resets the budget.
    fn place(&mut self, to: NodeId) {
        self.working_root = Some(to);
        self.samples_here = 0;
    }

    fn jump_forward(&mut self, tree: &SearchTree<C, S>, current: NodeId) {
        let target = tree.depth(current) + self.config.forward_jump;
        let next = self
            .best_leaf(tree, current)
            .and_then(|leaf| tree.ancestor_at_depth(leaf, target))
            .filter(|&n| !tree.is_fully_explored(n));
        match next {
            Some(next) => {
                debug!(from = %current, to = %next, depth = target, "greedy jump forward");
                self.backwards_jump = self.config.backwards_jump as f64;
                self.place(next);
            }
            None => self.samples_here = 0,
        }
    }

    fn jump_back(&mut self, tree: &SearchTree<C, S>, root: NodeId, current: NodeId) -> NodeId {
        let levels = self.backwards_jump.max(self.config.backwards_jump_min as f64).round() as u32;
        let target = tree.depth(current).saturating_sub(levels).max(tree.depth(root));
        let back = tree.ancestor_at_depth(current, target).unwrap_or(root);
        debug!(from = %current, to = %back, levels, "greedy dead end, jumping back");
        self.backwards_jump *= self.config.failure_multiplier;
        self.place(back);
        back
    }
}

impl<C: Command, S: State> Sampler<C, S> for GreedySampler<C, S> {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn tree_policy(&mut self, tree: &SearchTree<C, S>, root: NodeId, rng: &mut SearchRng) -> Result<Option<NodeId>> {
        if tree.is_fully_explored(root) {
            return Err(SearchError::ExplorationExhausted { node: root });
        }
        let mut current = match self.working_root {
            Some(n) if n == root || tree.is_ancestor(root, n) => n,
            _ => {
                self.place(root);
                self.backwards_jump = self.config.backwards_jump_min as f64;
                root
            }
        };

        if self.samples_here >= self.config.samples_at_depth(tree.depth(current)) {
            self.jump_forward(tree, current);
            current = self.working_root.unwrap_or(root);
        }
        while current != root && tree.is_fully_explored(current) {
            current = self.jump_back(tree, root, current);
        }

        self.samples_here += 1;
        loop {
            match self.inner.tree_policy(tree, current, rng) {
                // Another worker finished the working root while we waited on it.
                Err(SearchError::ExplorationExhausted { node }) if node != root => {
                    if tree.is_fully_explored(root) {
                        return Err(SearchError::ExplorationExhausted { node: root });
                    }
                    current = self.jump_back(tree, root, current);
                }
                other => return other,
            }
        }
    }

    fn expansion_policy(&mut self, tree: &SearchTree<C, S>, frontier: NodeId, rng: &mut SearchRng) -> Result<Action<C>> {
        self.inner.expansion_policy(tree, frontier, rng)
    }

    fn keep_expanding(&self, tree: &SearchTree<C, S>, node: NodeId) -> bool {
        self.inner.keep_expanding(tree, node)
    }

    fn rollout_policy(
        &mut self,
        tree: &SearchTree<C, S>,
        node: NodeId,
        simulator: &mut dyn Simulator<C, S>,
        rng: &mut SearchRng,
    ) -> Result<f32> {
        self.inner.rollout_policy(tree, node, simulator, rng)
    }

    fn backup(&mut self, tree: &SearchTree<C, S>, root: NodeId, node: NodeId, value: f32) {
        self.inner.backup(tree, root, node, value);
    }

    fn box_clone(&self) -> Box<dyn Sampler<C, S>> {
        Box::new(self.clone())
    }
}
