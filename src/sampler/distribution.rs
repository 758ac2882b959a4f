//! Sampler guided by each node's action distribution.
//!
//! At a node with both untried actions and open children, one draw from the
//! node's distribution over `untried ++ open child actions` decides whether
//! to expand here or descend, and which child to descend into.

use super::{can_continue, ensure_explorable, nothing_untried, open_children, Backoff, Sampler};
use crate::actions::{Action, Command, SearchRng};
use crate::config::BackoffConfig;
use crate::environment::{EvaluationFunction, Simulator};
use crate::error::{Result, SearchError};
use crate::tree::{NodeId, SearchTree};
use crate::value::{Replace, ValueUpdater};
use crate::State;
use std::sync::Arc;

pub struct DistributionSampler<C: Command, S> {
    evaluation: Arc<dyn EvaluationFunction<C, S>>,
    updater: Arc<dyn ValueUpdater<C>>,
    backoff: Backoff,
}

impl<C: Command, S> DistributionSampler<C, S> {
    pub fn new(evaluation: Arc<dyn EvaluationFunction<C, S>>) -> Self {
        DistributionSampler {
            evaluation,
            updater: Arc::new(Replace),
            backoff: Backoff::new(BackoffConfig::default()),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Backoff::new(backoff);
        self
    }

    pub fn evaluation(&self) -> &Arc<dyn EvaluationFunction<C, S>> {
        &self.evaluation
    }
}

impl<C: Command, S> Clone for DistributionSampler<C, S> {
    fn clone(&self) -> Self {
        DistributionSampler {
            evaluation: self.evaluation.clone(),
            updater: self.updater.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<C: Command, S: State> DistributionSampler<C, S> {
    /// Child of `parent` chosen by the parent's distribution over the children's actions.
    fn child_on_distribution(
        &self,
        tree: &SearchTree<C, S>,
        parent: NodeId,
        children: &[NodeId],
        rng: &mut SearchRng,
    ) -> Result<NodeId> {
        let node = tree.node(parent);
        let actions: Vec<Action<C>> = children
            .iter()
            .filter_map(|&c| tree.node(c).action().cloned())
            .collect();
        if actions.len() != children.len() {
            return Err(SearchError::IllegalState(format!("child of {parent} has no action")));
        }
        let idx = node.untried_actions().distribution().sample_index(&actions, rng)?;
        Ok(children[idx])
    }
}

impl<C: Command, S: State> Sampler<C, S> for DistributionSampler<C, S> {
    fn name(&self) -> &'static str {
        "distribution"
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
                let untried = node.untried_actions();

                let expand_here = if free.is_empty() {
                    !untried.is_empty()
                } else if untried.is_empty() {
                    false
                } else {
                    let explored: Vec<Action<C>> = free
                        .iter()
                        .filter_map(|&c| tree.node(c).action().cloned())
                        .collect();
                    untried
                        .distribution()
                        .choose_a_set(untried.as_slice(), &explored, rng)?
                };

                if expand_here {
                    if tree.reserve_expandable(current) {
                        self.backoff.reset();
                        return Ok(Some(current));
                    }
                    break;
                }
                if free.is_empty() {
                    break;
                }
                current = self.child_on_distribution(tree, current, &free, rng)?;
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
        Ok(untried.sample_distribution(rng)?.clone())
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
