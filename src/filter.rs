//! # Node Filters
//!
//! Post-processing applied to the nodes a stage returns before the next
//! stage runs on them. Filters only read the tree.

use crate::actions::{Command, SearchRng};
use crate::tree::{NodeId, SearchTree};
use crate::State;
use rand::seq::index;
use rand::SeedableRng;

/// Narrows a list of nodes.
pub trait NodeFilter<C: Command, S: State>: Send + Sync {
    /// Per-node predicate used by the default [`NodeFilter::filter`].
    fn keep(&self, _tree: &SearchTree<C, S>, _id: NodeId) -> bool {
        true
    }

    /// Returns the kept nodes in their original order.
    fn filter(&self, tree: &SearchTree<C, S>, mut nodes: Vec<NodeId>) -> Vec<NodeId> {
        nodes.retain(|&id| self.keep(tree, id));
        nodes
    }
}

/// Passes everything through.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl<C: Command, S: State> NodeFilter<C, S> for KeepAll {}

/// How [`Downsample`] picks survivors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownsampleStrategy {
    /// Indices `i * n / k` for `i` in `0..k`
    EvenlySpaced,
    /// Uniform subset drawn with the given seed
    Random(u64),
}

/// Keeps at most `max` nodes.
#[derive(Debug, Clone)]
pub struct Downsample {
    max: usize,
    strategy: DownsampleStrategy,
}

impl Downsample {
    pub fn new(max: usize, strategy: DownsampleStrategy) -> Self {
        Downsample { max, strategy }
    }

    pub fn evenly(max: usize) -> Self {
        Self::new(max, DownsampleStrategy::EvenlySpaced)
    }
}

impl<C: Command, S: State> NodeFilter<C, S> for Downsample {
    fn filter(&self, _tree: &SearchTree<C, S>, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let n = nodes.len();
        if n <= self.max {
            return nodes;
        }
        let k = self.max;
        match self.strategy {
            DownsampleStrategy::EvenlySpaced => (0..k).map(|i| nodes[i * n / k]).collect(),
            DownsampleStrategy::Random(seed) => {
                let mut rng = SearchRng::seed_from_u64(seed);
                let mut picked = index::sample(&mut rng, n, k).into_vec();
                picked.sort_unstable();
                picked.into_iter().map(|i| nodes[i]).collect()
            }
        }
    }
}

/// Keeps nodes whose depth lies in `min_depth..=max_depth`.
#[derive(Debug, Clone)]
pub struct HorizonFilter {
    pub min_depth: u32,
    pub max_depth: u32,
}

impl HorizonFilter {
    pub fn new(min_depth: u32, max_depth: u32) -> Self {
        HorizonFilter { min_depth, max_depth }
    }
}

impl<C: Command, S: State> NodeFilter<C, S> for HorizonFilter {
    fn keep(&self, tree: &SearchTree<C, S>, id: NodeId) -> bool {
        (self.min_depth..=self.max_depth).contains(&tree.depth(id))
    }
}

/// Keeps terminal nodes that ended in failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailedOnly;

impl<C: Command, S: State> NodeFilter<C, S> for FailedOnly {
    fn keep(&self, tree: &SearchTree<C, S>, id: NodeId) -> bool {
        tree.node(id).is_failed()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotFailed;

impl<C: Command, S: State> NodeFilter<C, S> for NotFailed {
    fn keep(&self, tree: &SearchTree<C, S>, id: NodeId) -> bool {
        !tree.node(id).is_failed()
    }
}

/// Applies filters left to right.
pub struct FilterChain<C: Command, S: State> {
    filters: Vec<Box<dyn NodeFilter<C, S>>>,
}

impl<C: Command, S: State> FilterChain<C, S> {
    pub fn new() -> Self {
        FilterChain { filters: Vec::new() }
    }

    pub fn then(mut self, filter: impl NodeFilter<C, S> + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl<C: Command, S: State> Default for FilterChain<C, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Command, S: State> NodeFilter<C, S> for FilterChain<C, S> {
    fn filter(&self, tree: &SearchTree<C, S>, nodes: Vec<NodeId>) -> Vec<NodeId> {
        self.filters
            .iter()
            .fold(nodes, |kept, f| f.filter(tree, kept))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionGenerator, Distribution, EqualDistribution, PerDepthCatalog};
    use std::sync::Arc;

    /// Root with four children (the odd ones failed) and one grandchild.
    fn tree() -> (SearchTree<char, u32>, Vec<NodeId>) {
        let dist: Arc<dyn Distribution<char>> = Arc::new(EqualDistribution);
        let levels = vec![(0..4).map(|d| Action::new('a', d)).collect(), vec![Action::new('b', 0)]];
        let generator: Arc<dyn ActionGenerator<char>> =
            Arc::new(PerDepthCatalog::from_levels(levels, dist, false));
        let tree = SearchTree::new(0, generator);
        let root = tree.root();
        let mut ids = Vec::new();
        assert!(tree.reserve(root));
        for d in 0..4 {
            ids.push(tree.expand(root, Action::new('a', d), d, d % 2 == 1).unwrap());
        }
        tree.release(root).unwrap();
        assert!(tree.reserve(ids[0]));
        ids.push(tree.expand(ids[0], Action::new('b', 0), 9, false).unwrap());
        tree.release(ids[0]).unwrap();
        (tree, ids)
    }

    #[test]
    fn test_keep_all_is_identity() {
        let (tree, ids) = tree();
        assert_eq!(KeepAll.filter(&tree, ids.clone()), ids);
    }

    #[test]
    fn test_evenly_spaced_downsample() {
        let (tree, ids) = tree();
        let kept = Downsample::evenly(2).filter(&tree, ids.clone());
        assert_eq!(kept, vec![ids[0], ids[2]]);
        let all = Downsample::evenly(10).filter(&tree, ids.clone());
        assert_eq!(all, ids);
        assert!(Downsample::evenly(0).filter(&tree, ids).is_empty());
    }

    #[test]
    fn test_random_downsample_is_seeded_and_ordered() {
        let (tree, ids) = tree();
        let filter = Downsample::new(3, DownsampleStrategy::Random(5));
        let a = filter.filter(&tree, ids.clone());
        let b = filter.filter(&tree, ids.clone());
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(a.iter().all(|id| ids.contains(id)));
    }

    #[test]
    fn test_failure_filters_split_the_set() {
        let (tree, ids) = tree();
        let failed = FailedOnly.filter(&tree, ids.clone());
        let ok = NotFailed.filter(&tree, ids.clone());
        assert_eq!(failed, vec![ids[1], ids[3]]);
        assert_eq!(failed.len() + ok.len(), ids.len());
    }

    #[test]
    fn test_chain_applies_in_order() {
        let (tree, ids) = tree();
        let chain = FilterChain::new()
            .then(HorizonFilter::new(1, 1))
            .then(NotFailed)
            .then(Downsample::evenly(1));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.filter(&tree, ids.clone()), vec![ids[0]]);
    }
}
