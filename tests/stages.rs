//! Stages driven through the search facade, alone, chained and grouped.

use std::sync::Arc;
use treesearch::actions::{Distribution, EqualDistribution, PerDepthCatalog};
use treesearch::environment::DepthEvaluation;
use treesearch::filter::{FilterChain, HorizonFilter, NotFailed};
use treesearch::sampler::{DeterministicSampler, RandomSampler, Sampler};
use treesearch::stage::{FixedGames, Grouping, MaxDepth, MinDepth, TreeStage};
use treesearch::{
    Action, ActionGenerator, NodeId, Search, SearchConfig, SearchError, SearchRng, SearchTree, Simulator,
};

/// Fails whenever a duration of 9 is applied.
#[derive(Clone)]
struct Steps;

impl Simulator<char, u32> for Steps {
    fn step(&mut self, state: &u32, action: &Action<char>) -> (u32, bool) {
        (state + action.duration, action.duration == 9)
    }

    fn box_clone(&self) -> Box<dyn Simulator<char, u32>> {
        Box::new(self.clone())
    }
}

fn catalog(levels: usize, width: u32) -> Arc<dyn ActionGenerator<char>> {
    let dist: Arc<dyn Distribution<char>> = Arc::new(EqualDistribution);
    let level: Vec<_> = (0..width).map(|d| Action::new('s', d)).collect();
    Arc::new(PerDepthCatalog::from_levels(vec![level; levels], dist, false))
}

fn random_search(levels: usize, width: u32, workers: usize) -> Search<char, u32> {
    let config = SearchConfig::for_testing().with_workers(workers);
    let sampler: RandomSampler<char, u32> =
        RandomSampler::new(Arc::new(DepthEvaluation)).with_backoff(config.backoff.clone());
    let tree = SearchTree::new(0, catalog(levels, width));
    Search::with_sampler(config, tree, Box::new(sampler), Box::new(Steps)).unwrap()
}

#[test]
fn test_max_depth_then_min_depth_chain() {
    let mut search = random_search(4, 2, 3);
    let root = search.tree().root();

    let found = search.run_stage(&mut MaxDepth::new(2, 10_000), root).unwrap();
    assert_eq!(found.len(), 1);
    let next = found[0];
    assert_eq!(search.tree().depth(next), 2);

    let below = search.run_stage(&mut MinDepth::new(1), next).unwrap();
    assert_eq!(below.len(), 2);
    for id in &below {
        assert_eq!(search.tree().depth(*id), 3);
        assert_eq!(search.tree().node(*id).parent(), Some(next));
    }
    assert!(!search.tree().node(next).has_untried());
}

#[test]
fn test_grouped_stages_run_in_sequence() {
    let mut search = random_search(6, 3, 2);
    let root = search.tree().root();
    let mut grouping: Grouping<char, u32> =
        Grouping::new(vec![Box::new(MaxDepth::new(1, 1_000)), Box::new(FixedGames::new(20))]);
    assert_eq!(TreeStage::<char, u32>::iteration_budget(&grouping), Some(1_020));

    let results = search.run_stage(&mut grouping, root).unwrap();
    assert_eq!(results, vec![root]);
    assert_eq!(grouping.current(), 2);
    assert!(search.counter().iterations() >= 19);
    assert_eq!(search.tree().max_branch_depth(root), 6);
}

#[test]
fn test_filtered_results() {
    let mut search = random_search(3, 2, 2);
    let root = search.tree().root();
    let filter = FilterChain::new().then(HorizonFilter::new(2, 2)).then(NotFailed);
    let kept = search
        .run_filtered(&mut MinDepth::new(2), root, &filter)
        .unwrap();
    assert_eq!(kept.len(), 4);
    assert!(kept.iter().all(|&id| search.tree().depth(id) == 2));
}

/// Deterministic sampler that asks for an action no generator ever offers.
#[derive(Clone)]
struct Rogue(DeterministicSampler<char, u32>);

impl Sampler<char, u32> for Rogue {
    fn name(&self) -> &'static str {
        "rogue"
    }

    fn tree_policy(
        &mut self,
        tree: &SearchTree<char, u32>,
        root: NodeId,
        rng: &mut SearchRng,
    ) -> treesearch::Result<Option<NodeId>> {
        self.0.tree_policy(tree, root, rng)
    }

    fn expansion_policy(
        &mut self,
        _tree: &SearchTree<char, u32>,
        _frontier: NodeId,
        _rng: &mut SearchRng,
    ) -> treesearch::Result<Action<char>> {
        Ok(Action::new('z', 42))
    }

    fn rollout_policy(
        &mut self,
        tree: &SearchTree<char, u32>,
        node: NodeId,
        simulator: &mut dyn Simulator<char, u32>,
        rng: &mut SearchRng,
    ) -> treesearch::Result<f32> {
        self.0.rollout_policy(tree, node, simulator, rng)
    }

    fn backup(&mut self, tree: &SearchTree<char, u32>, root: NodeId, node: NodeId, value: f32) {
        self.0.backup(tree, root, node, value)
    }

    fn box_clone(&self) -> Box<dyn Sampler<char, u32>> {
        Box::new(self.clone())
    }
}

#[test]
fn test_protocol_errors_stop_the_stage() {
    let config = SearchConfig::for_testing().with_workers(3);
    let tree = SearchTree::new(0, catalog(2, 2));
    let mut search =
        Search::with_sampler(config, tree, Box::new(Rogue(DeterministicSampler::new())), Box::new(Steps)).unwrap();
    let root = search.tree().root();
    let err = search.run_stage(&mut FixedGames::new(100), root).unwrap_err();
    assert!(matches!(err, SearchError::InvalidActionRequest { .. }), "{err}");
    assert_eq!(search.tree().len(), 1);
    assert!(!search.tree().is_reserved(root));
}
