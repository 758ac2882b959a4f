//! Property tests for the structural invariants of the search tree.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use treesearch::actions::{ActionContext, Distribution, EqualDistribution, PerDepthCatalog};
use treesearch::{Action, ActionGenerator, NodeId, SearchError, SearchTree};

fn generator() -> Arc<dyn ActionGenerator<char>> {
    let dist: Arc<dyn Distribution<char>> = Arc::new(EqualDistribution);
    let levels = vec![
        vec![Action::new('a', 1), Action::new('a', 2), Action::new('b', 1)],
        vec![Action::new('a', 1), Action::new('b', 3)],
        vec![Action::new('c', 1), Action::new('c', 2), Action::new('c', 3), Action::new('c', 4)],
    ];
    Arc::new(PerDepthCatalog::from_levels(levels, dist, false))
}

/// Applies `(node pick, action pick, failed)` growth steps single-threaded,
/// checking that explored flags never flip back.
fn grow(steps: &[(usize, usize, bool)]) -> SearchTree<char, u8> {
    let tree = SearchTree::new(0u8, generator());
    let mut explored: HashSet<NodeId> = HashSet::new();
    for &(pick, action, failed) in steps {
        let id = NodeId((pick % tree.len()) as u32);
        let untried = tree.node(id).untried_actions();
        if untried.is_empty() {
            continue;
        }
        let action = untried.as_slice()[action % untried.len()].clone();
        assert!(tree.reserve(id));
        tree.expand(id, action, 0, failed).unwrap();
        tree.release(id).unwrap();

        for &seen in &explored {
            assert!(tree.is_fully_explored(seen), "{seen} lost its explored flag");
        }
        for i in 0..tree.len() {
            let id = NodeId(i as u32);
            if tree.is_fully_explored(id) {
                explored.insert(id);
            }
        }
    }
    tree
}

fn steps() -> impl Strategy<Value = Vec<(usize, usize, bool)>> {
    prop::collection::vec((0usize..64, 0usize..8, prop::bool::weighted(0.2)), 0..80)
}

proptest! {
    #[test]
    fn prop_depth_bounds_and_cached_flags(steps in steps()) {
        let tree = grow(&steps);
        for i in 0..tree.len() {
            let id = NodeId(i as u32);
            let node = tree.node(id);
            prop_assert!(node.max_branch_depth() >= node.depth());
            prop_assert_eq!(node.max_branch_depth(), tree.recompute_max_branch_depth(id));
            prop_assert_eq!(node.is_fully_explored(), tree.recompute_fully_explored(id));
            if node.child_count() == 0 {
                prop_assert_eq!(node.max_branch_depth(), node.depth());
            }
        }
    }

    #[test]
    fn prop_tried_and_untried_partition_the_action_space(steps in steps()) {
        let tree = grow(&steps);
        let generator = generator();
        for i in 0..tree.len() {
            let id = NodeId(i as u32);
            let node = tree.node(id);
            let tried: Vec<Action<char>> = node.child_entries().into_iter().map(|(a, _)| a).collect();
            let unique: HashSet<&Action<char>> = tried.iter().collect();
            prop_assert_eq!(unique.len(), tried.len());

            let mut all: Vec<Action<char>> = tried.clone();
            all.extend(node.untried_actions().iter().cloned());
            all.sort();

            let path = tree.path_actions(id);
            let mut expected = if node.is_failed() {
                tried.clone()
            } else {
                generator
                    .potential_child_actions(&ActionContext::new(node.depth(), &path))
                    .as_slice()
                    .to_vec()
            };
            expected.sort();
            prop_assert_eq!(all, expected);
        }
    }

    #[test]
    fn prop_reservations_balance(
        growth in steps(),
        claims in prop::collection::vec(0usize..64, 0..40),
    ) {
        let tree = grow(&growth);
        let mut held: Vec<NodeId> = Vec::new();
        for pick in claims {
            let id = NodeId((pick % tree.len()) as u32);
            let contended = held
                .iter()
                .any(|&h| h == id || tree.is_ancestor(h, id) || tree.is_ancestor(id, h));
            let reserved = tree.reserve(id);
            prop_assert_eq!(reserved, !contended);
            if reserved {
                held.push(id);
            }
        }
        for id in held.drain(..) {
            tree.release(id).unwrap();
        }
        for i in 0..tree.len() {
            prop_assert!(!tree.is_reserved(NodeId(i as u32)));
        }
    }
}

#[test]
fn test_double_release_is_misuse() {
    let tree = SearchTree::new(0u8, generator());
    let root = tree.root();
    assert!(tree.reserve(root));
    tree.release(root).unwrap();
    assert!(matches!(
        tree.release(root),
        Err(SearchError::ReservationMisuse { .. })
    ));
}
