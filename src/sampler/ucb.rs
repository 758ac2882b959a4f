//! Upper-confidence-bound sampler.
//!
//! Descends by `mean + c * sqrt(ln(parent visits) / child visits)` until it
//! reaches a node with untried actions, expands one of them, scores the new
//! node with a rollout and backs the score up to the stage root.

use super::{ensure_explorable, nothing_untried, open_children, Backoff, RolloutPolicy, Sampler};
use crate::actions::{Action, Command, SearchRng};
use crate::config::{BackoffConfig, UcbConfig};
use crate::environment::{EvaluationFunction, Simulator};
use crate::error::Result;
use crate::tree::{NodeId, SearchTree};
use crate::value::ValueUpdater;
use crate::State;
use rand::Rng;
use std::sync::Arc;
use tracing::trace;

pub struct UcbSampler<C: Command, S> {
    config: UcbConfig,
    evaluation: Arc<dyn EvaluationFunction<C, S>>,
    rollout: Arc<dyn RolloutPolicy<C, S>>,
    updater: Arc<dyn ValueUpdater<C>>,
    backoff: Backoff,
}

impl<C: Command, S> UcbSampler<C, S> {
    /// # Arguments
    /// * `evaluation` - Scores nodes that fail on creation, where a rollout is pointless
    /// * `rollout` - Scores every other new node
    /// * `updater` - Folds scores into each node on the way back up
    pub fn new(
        config: UcbConfig,
        evaluation: Arc<dyn EvaluationFunction<C, S>>,
        rollout: Arc<dyn RolloutPolicy<C, S>>,
        updater: Arc<dyn ValueUpdater<C>>,
    ) -> Self {
        UcbSampler {
            config,
            evaluation,
            rollout,
            updater,
            backoff: Backoff::new(BackoffConfig::default()),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Backoff::new(backoff);
        self
    }

    /// Confidence bound of a child. Unvisited children score +∞.
    pub fn score(mean: f32, child_visits: u32, parent_visits: u32, c: f64) -> f64 {
        if child_visits == 0 {
            return f64::INFINITY;
        }
        let exploration = ((parent_visits.max(1) as f64).ln() / child_visits as f64).sqrt();
        mean as f64 + c * exploration
    }

    fn best_child(&self, tree: &SearchTree<C, S>, parent: NodeId, candidates: &[NodeId], c: f64) -> Option<NodeId>
    where
        S: State,
    {
        let parent_visits = tree.value(parent).update_count();
        candidates
            .iter()
            .map(|&child| {
                let v = tree.value(child);
                (child, Self::score(v.value(), v.update_count(), parent_visits, c))
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(child, _)| child)
    }
}

impl<C: Command, S> Clone for UcbSampler<C, S> {
    fn clone(&self) -> Self {
        UcbSampler {
            config: self.config.clone(),
            evaluation: self.evaluation.clone(),
            rollout: self.rollout.clone(),
            updater: self.updater.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<C: Command, S: State> Sampler<C, S> for UcbSampler<C, S> {
    fn name(&self) -> &'static str {
        "ucb"
    }

    fn tree_policy(&mut self, tree: &SearchTree<C, S>, root: NodeId, rng: &mut SearchRng) -> Result<Option<NodeId>> {
        ensure_explorable(tree, root)?;
        let c = self.config.exploration_constant + self.config.exploration_random_factor * rng.random::<f64>();

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
                        trace!(node = %current, "ucb frontier");
                        return Ok(Some(current));
                    }
                    break;
                }
                let (free, busy) = open_children(tree, current);
                let pool = if free.is_empty() { busy } else { free };
                match self.best_child(tree, current, &pool, c) {
                    Some(child) => current = child,
                    None => break,
                }
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

    fn rollout_policy(
        &mut self,
        tree: &SearchTree<C, S>,
        node: NodeId,
        simulator: &mut dyn Simulator<C, S>,
        rng: &mut SearchRng,
    ) -> Result<f32> {
        let created = tree.node(node);
        if created.is_failed() {
            return Ok(self.evaluation.value(&created));
        }
        self.rollout.rollout(tree, node, simulator, rng)
    }

    fn backup(&mut self, tree: &SearchTree<C, S>, root: NodeId, node: NodeId, value: f32) {
        tree.backup(node, root, self.updater.as_ref(), value);
    }

    fn box_clone(&self) -> Box<dyn Sampler<C, S>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionGenerator, Distribution, EqualDistribution, PerDepthCatalog};
    use crate::environment::Constant;
    use crate::sampler::EvaluationOnly;
    use crate::value::Average;
    use rand::SeedableRng;

    fn sampler() -> UcbSampler<char, u32> {
        let eval: Arc<dyn EvaluationFunction<char, u32>> = Arc::new(Constant(1.0));
        UcbSampler::new(
            UcbConfig::default(),
            eval.clone(),
            Arc::new(EvaluationOnly::new(eval)),
            Arc::new(Average),
        )
    }

    fn tree() -> SearchTree<char, u32> {
        let dist: Arc<dyn Distribution<char>> = Arc::new(EqualDistribution);
        let generator: Arc<dyn ActionGenerator<char>> = Arc::new(PerDepthCatalog::from_levels(
            vec![vec![Action::new('a', 0), Action::new('a', 1)]],
            dist,
            true,
        ));
        SearchTree::new(0, generator)
    }

    #[test]
    fn test_unvisited_scores_infinite() {
        assert_eq!(UcbSampler::<char, u32>::score(0.0, 0, 10, 1.0), f64::INFINITY);
        let a = UcbSampler::<char, u32>::score(1.0, 1, 10, 1.0);
        let b = UcbSampler::<char, u32>::score(1.0, 5, 10, 1.0);
        assert!(a > b);
    }

    #[test]
    fn test_root_with_untried_is_frontier() {
        let tree = tree();
        let mut rng = SearchRng::seed_from_u64(0);
        let mut sampler = sampler();
        let frontier = sampler.tree_policy(&tree, tree.root(), &mut rng).unwrap();
        assert_eq!(frontier, Some(tree.root()));
        assert!(tree.node(tree.root()).is_frontier());
        let action = sampler.expansion_policy(&tree, tree.root(), &mut rng).unwrap();
        assert!(tree.node(tree.root()).untried_actions().contains(&action));
        tree.release(tree.root()).unwrap();
    }

    #[test]
    fn test_descends_to_least_visited_child() {
        let tree = tree();
        let root = tree.root();
        let mut rng = SearchRng::seed_from_u64(0);
        let mut sampler = sampler();
        let mut children = Vec::new();
        for d in 0..2 {
            assert!(tree.reserve(root));
            let child = tree.expand(root, Action::new('a', d), d, false).unwrap();
            tree.release(root).unwrap();
            children.push(child);
        }
        for _ in 0..3 {
            sampler.backup(&tree, root, children[0], 1.0);
        }
        sampler.backup(&tree, root, children[1], 1.0);
        let frontier = sampler.tree_policy(&tree, root, &mut rng).unwrap();
        assert_eq!(frontier, Some(children[1]));
        tree.release(children[1]).unwrap();
    }

    #[test]
    fn test_failed_node_is_scored_without_rollout() {
        let tree = tree();
        let root = tree.root();
        assert!(tree.reserve(root));
        let child = tree.expand(root, Action::new('a', 0), 0, true).unwrap();
        tree.release(root).unwrap();
        let mut rng = SearchRng::seed_from_u64(0);
        struct Never;
        impl Simulator<char, u32> for Never {
            fn step(&mut self, _s: &u32, _a: &Action<char>) -> (u32, bool) {
                unreachable!("rollout must not run for failed nodes")
            }
            fn box_clone(&self) -> Box<dyn Simulator<char, u32>> {
                Box::new(Never)
            }
        }
        let value = sampler().rollout_policy(&tree, child, &mut Never, &mut rng).unwrap();
        assert_eq!(value, 1.0);
    }
}
