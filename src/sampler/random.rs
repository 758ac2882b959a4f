//! Uniform random sampler.
//!
//! At each node the tree policy draws one slot among the open children and
//! the untried actions: a child slot descends, an untried slot expands here.
//! Expansion keeps going from each new node until it fails or runs out of
//! actions. Only the last node gets a value.

use super::{can_continue, ensure_explorable, nothing_untried, open_children, Backoff, Sampler};
use crate::actions::{Action, Command, SearchRng};
use crate::config::BackoffConfig;
use crate::environment::{EvaluationFunction, Simulator};
use crate::error::Result;
use crate::tree::{NodeId, SearchTree};
use crate::value::{Replace, ValueUpdater};
use crate::State;
use rand::Rng;
use std::sync::Arc;

pub struct RandomSampler<C: Command, S> {
    evaluation: Arc<dyn EvaluationFunction<C, S>>,
    updater: Arc<dyn ValueUpdater<C>>,
    backoff: Backoff,
}

impl<C: Command, S> RandomSampler<C, S> {
    pub fn new(evaluation: Arc<dyn EvaluationFunction<C, S>>) -> Self {
        RandomSampler {
            evaluation,
            updater: Arc::new(Replace),
            backoff: Backoff::new(BackoffConfig::default()),
        }
    }

    pub fn with_updater(mut self, updater: Arc<dyn ValueUpdater<C>>) -> Self {
        self.updater = updater;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Backoff::new(backoff);
        self
    }
}

impl<C: Command, S> Clone for RandomSampler<C, S> {
    fn clone(&self) -> Self {
        RandomSampler {
            evaluation: self.evaluation.clone(),
            updater: self.updater.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<C: Command, S: State> Sampler<C, S> for RandomSampler<C, S> {
    fn name(&self) -> &'static str {
        "random"
    }

    fn tree_policy(&mut self, tree: &SearchTree<C, S>, root: NodeId, rng: &mut SearchRng) -> Result<Option<NodeId>> {
        ensure_explorable(tree, root)?;
        loop {
            let mut current = root;
            loop {
                let node = tree.node(current);
                if node.is_fully_explored() {
                    ensure_explorable(tree, root)?;
                    break;
                }
                let (free, _) = open_children(tree, current);
                let untried = node.untried_count();
                let slots = free.len() + untried;
                if slots == 0 {
                    break;
                }
                let pick = rng.random_range(0..slots);
                if pick < free.len() {
                    current = free[pick];
                    continue;
                }
                if tree.reserve_expandable(current) {
                    self.backoff.reset();
                    return Ok(Some(current));
                }
                break;
            }
            if !self.backoff.wait() {
                return Ok(None);
            }
        }
    }

    fn expansion_policy(&mut self, tree: &SearchTree<C, S>, frontier: NodeId, rng: &mut SearchRng) -> Result<Action<C>> {
        let untried = tree.node(frontier).untried_actions();
        if untried.is_empty() {
            return Err(nothing_untried(frontier));
        }
        Ok(untried.random_uniform(rng)?.clone())
    }

    fn keep_expanding(&self, tree: &SearchTree<C, S>, node: NodeId) -> bool {
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
