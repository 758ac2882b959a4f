//! # Shared Search Tree
//!
//! All workers grow one [`SearchTree`]. Nodes live in an append-only arena
//! and refer to each other by [`NodeId`], so the tree never frees or moves a
//! node while a stage is running.
//!
//! ## Reservation protocol
//!
//! A worker that wants to expand a node first reserves it. The reserved
//! node becomes the worker's *frontier*; every ancestor records that a
//! frontier sits below it.
//!
//! ```text
//!            root   pass_through = 2
//!           /    \
//!          a      b   pass_through = 1
//!         [F]      \
//!                   c [F]
//! ```
//!
//! A reservation is refused when the requested node is already a frontier,
//! already has a frontier below it, or sits below a frontier. So no frontier
//! is ever an ancestor of another one, and a frontier's whole subtree belongs
//! to its holder. Reserve, release and transfer run under one tree-wide lock
//! and touch the path root-first; flags are atomics so readers never lock.

mod node;

pub use node::{Node, NodeId};

use crate::actions::{Action, ActionContext, ActionGenerator, ActionList, Command};
use crate::error::{Result, SearchError};
use crate::value::{ChildValue, ValueContainer, ValueUpdater};
use crate::State;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::trace;

/// The shared, growing search tree.
pub struct SearchTree<C: Command, S> {
    nodes: RwLock<Vec<Arc<Node<C, S>>>>,
    generator: Arc<dyn ActionGenerator<C>>,
    reservations: Mutex<()>,
    root: NodeId,
}

impl<C: Command, S: State> SearchTree<C, S> {
    /// Creates a tree whose root sits at depth 0.
    pub fn new(root_state: S, generator: Arc<dyn ActionGenerator<C>>) -> Self {
        Self::with_root_depth(root_state, 0, generator)
    }

    /// Creates a tree whose root continues an earlier run at `depth`.
    pub fn with_root_depth(root_state: S, depth: u32, generator: Arc<dyn ActionGenerator<C>>) -> Self {
        let untried = generator.potential_child_actions(&ActionContext::new(depth, &[]));
        let root = Node::new(NodeId(0), None, None, depth, root_state, false, untried);
        SearchTree {
            nodes: RwLock::new(vec![Arc::new(root)]),
            generator,
            reservations: Mutex::new(()),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes created so far.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    pub fn generator(&self) -> &Arc<dyn ActionGenerator<C>> {
        &self.generator
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<Node<C, S>>> {
        self.nodes.read().get(id.index()).cloned()
    }

    /// Node behind `id`.
    ///
    /// # Panics
    /// If `id` was not handed out by this tree.
    pub fn node(&self, id: NodeId) -> Arc<Node<C, S>> {
        self.nodes.read()[id.index()].clone()
    }

    pub fn depth(&self, id: NodeId) -> u32 {
        self.node(id).depth()
    }

    pub fn is_fully_explored(&self, id: NodeId) -> bool {
        self.node(id).is_fully_explored()
    }

    pub fn max_branch_depth(&self, id: NodeId) -> u32 {
        self.node(id).max_branch_depth()
    }

    pub fn is_reserved(&self, id: NodeId) -> bool {
        self.node(id).is_reserved()
    }

    pub fn value(&self, id: NodeId) -> ValueContainer {
        self.node(id).value()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children()
    }

    /// Ancestors of `id` from its parent up to the tree root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.node(id).parent();
        while let Some(p) = current {
            out.push(p);
            current = self.node(p).parent();
        }
        out
    }

    /// Ancestor of `id` (or `id` itself) sitting at `depth`.
    pub fn ancestor_at_depth(&self, id: NodeId, depth: u32) -> Option<NodeId> {
        let mut current = self.node(id);
        if current.depth() < depth {
            return None;
        }
        while current.depth() > depth {
            current = self.node(current.parent()?);
        }
        Some(current.id())
    }

    /// True if `ancestor` lies on the path from the tree root to `id`, `id` excluded.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Actions from the tree root to `id`, root first.
    pub fn path_actions(&self, id: NodeId) -> Vec<Action<C>> {
        let mut path = Vec::new();
        let mut current = self.node(id);
        while let Some(parent) = current.parent() {
            if let Some(action) = current.action() {
                path.push(action.clone());
            }
            current = self.node(parent);
        }
        path.reverse();
        path
    }

    /// Candidate actions for a node reached from `id` by `path`, as if it were in the tree.
    pub fn actions_after(&self, id: NodeId, path: &[Action<C>]) -> ActionList<C> {
        let mut full = self.path_actions(id);
        full.extend_from_slice(path);
        let depth = self.depth(id) + path.len() as u32;
        self.generator
            .potential_child_actions(&ActionContext::new(depth, &full))
    }

    // ---- reservation -----------------------------------------------------

    /// Claims `id` as a frontier. Returns `false` when contended.
    pub fn reserve(&self, id: NodeId) -> bool {
        self.reserve_if(id, |_| true)
    }

    /// Claims `id` as a frontier only if it still has an untried action.
    ///
    /// The check runs under the reservation lock, so a node whose last
    /// action was taken after the caller looked at it is refused here
    /// instead of failing later in expansion.
    pub fn reserve_expandable(&self, id: NodeId) -> bool {
        self.reserve_if(id, |node| node.has_untried() && !node.is_fully_explored())
    }

    fn reserve_if(&self, id: NodeId, accept: impl FnOnce(&Node<C, S>) -> bool) -> bool {
        let _guard = self.reservations.lock();
        let node = self.node(id);
        if node.is_reserved() || !accept(node.as_ref()) {
            return false;
        }
        let mut path = self.ancestors(id);
        path.reverse();
        if path.iter().any(|&a| self.node(a).is_frontier()) {
            return false;
        }
        for &a in &path {
            self.node(a).pass_through.fetch_add(1, Ordering::SeqCst);
        }
        node.frontier.store(true, Ordering::SeqCst);
        trace!(node = %id, "reserved");
        true
    }

    /// Gives up the frontier claim on `id` and the marks on its ancestors.
    pub fn release(&self, id: NodeId) -> Result<()> {
        let _guard = self.reservations.lock();
        let node = self.node(id);
        if !node.is_frontier() {
            return Err(SearchError::ReservationMisuse {
                node: id,
                reason: "release without a matching reservation".into(),
            });
        }
        let mut path = self.ancestors(id);
        path.reverse();
        let nodes: Vec<_> = path.iter().map(|&a| self.node(a)).collect();
        if let Some(bad) = nodes.iter().find(|n| n.pass_through.load(Ordering::SeqCst) == 0) {
            return Err(SearchError::ReservationMisuse {
                node: bad.id(),
                reason: format!("ancestor of {id} carries no reservation mark"),
            });
        }
        for n in &nodes {
            n.pass_through.fetch_sub(1, Ordering::SeqCst);
        }
        node.frontier.store(false, Ordering::SeqCst);
        trace!(node = %id, "released");
        Ok(())
    }

    /// Moves the frontier claim from `from` down to its child `to` in one step.
    pub fn transfer_reservation(&self, from: NodeId, to: NodeId) -> Result<()> {
        let _guard = self.reservations.lock();
        let parent = self.node(from);
        let child = self.node(to);
        if child.parent() != Some(from) {
            return Err(SearchError::ReservationMisuse {
                node: to,
                reason: format!("{to} is not a child of {from}"),
            });
        }
        if !parent.is_frontier() {
            return Err(SearchError::ReservationMisuse {
                node: from,
                reason: "transfer from a node that is not reserved".into(),
            });
        }
        if child.is_reserved() {
            return Err(SearchError::ReservationMisuse {
                node: to,
                reason: "transfer into a reserved subtree".into(),
            });
        }
        parent.pass_through.fetch_add(1, Ordering::SeqCst);
        parent.frontier.store(false, Ordering::SeqCst);
        child.frontier.store(true, Ordering::SeqCst);
        Ok(())
    }

    // ---- growth ----------------------------------------------------------

    /// Adds the child reached from `parent` by `action`.
    ///
    /// The caller must hold `parent` as its frontier and `action` must be
    /// untried there. A `failed` child is terminal and gets no actions.
    pub fn expand(&self, parent: NodeId, action: Action<C>, state: S, failed: bool) -> Result<NodeId> {
        let parent_node = self.node(parent);
        if !parent_node.is_frontier() {
            return Err(SearchError::ReservationMisuse {
                node: parent,
                reason: "expansion without holding the reservation".into(),
            });
        }

        let mut path = self.path_actions(parent);
        path.push(action.clone());
        let depth = parent_node.depth() + 1;
        let untried = self
            .generator
            .potential_child_actions(&ActionContext::new(depth, &path));

        let child_id = {
            let mut links = parent_node.links.lock();
            if links.untried.is_empty() {
                return Err(SearchError::InvalidActionRequest {
                    node: parent,
                    reason: "no untried actions left".into(),
                });
            }
            if !links.untried.remove(&action) {
                return Err(SearchError::InvalidActionRequest {
                    node: parent,
                    reason: format!("action {action} is not untried here"),
                });
            }
            let child_id = {
                let mut nodes = self.nodes.write();
                let id = NodeId(nodes.len() as u32);
                nodes.push(Arc::new(Node::new(
                    id,
                    Some(parent),
                    Some(action.clone()),
                    depth,
                    state,
                    failed,
                    untried,
                )));
                id
            };
            links.children.push((action, child_id));
            child_id
        };

        trace!(parent = %parent, child = %child_id, depth, failed, "expanded");
        self.propagate_max_branch_depth(child_id);
        self.propagate_fully_explored(child_id);
        Ok(child_id)
    }

    /// Whether `id` is fully explored given its current structure.
    pub fn recompute_fully_explored(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if node.is_failed() {
            return true;
        }
        let children = {
            let links = node.links.lock();
            if !links.untried.is_empty() {
                return false;
            }
            links.children.iter().map(|(_, c)| *c).collect::<Vec<_>>()
        };
        children.into_iter().all(|c| self.node(c).is_fully_explored())
    }

    /// Deepest depth reachable from `id` given its children's cached values.
    pub fn recompute_max_branch_depth(&self, id: NodeId) -> u32 {
        let node = self.node(id);
        node.children()
            .into_iter()
            .map(|c| self.node(c).max_branch_depth())
            .fold(node.depth(), u32::max)
    }

    /// Marks `id` and then its ancestors fully explored for as long as each qualifies.
    pub fn propagate_fully_explored(&self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            if !self.recompute_fully_explored(id) {
                return;
            }
            let node = self.node(id);
            node.fully_explored.store(true, Ordering::SeqCst);
            current = node.parent();
        }
    }

    /// Raises cached max depths from `id` upward until one is already deep enough.
    pub fn propagate_max_branch_depth(&self, id: NodeId) {
        let node = self.node(id);
        let depth = node.max_branch_depth();
        let mut current = node.parent();
        while let Some(p) = current {
            let parent = self.node(p);
            let previous = parent.max_branch_depth.fetch_max(depth, Ordering::SeqCst);
            if previous >= depth {
                return;
            }
            current = parent.parent();
        }
    }

    // ---- values ----------------------------------------------------------

    /// Snapshot of the updated children of `id`.
    pub fn child_values(&self, id: NodeId) -> Vec<ChildValue<C>> {
        self.node(id)
            .child_entries()
            .into_iter()
            .filter_map(|(action, c)| {
                let v = self.node(c).value();
                (v.update_count() > 0).then(|| ChildValue {
                    action,
                    value: v.value(),
                    update_count: v.update_count(),
                })
            })
            .collect()
    }

    /// Folds `observation` into the value of `id` alone.
    pub fn update_value(&self, id: NodeId, updater: &dyn ValueUpdater<C>, observation: f32) {
        let children = self.child_values(id);
        let node = self.node(id);
        let mut value = node.value.lock();
        value.apply(updater, observation, &children);
    }

    /// Folds `observation` into `from` and each ancestor up to `to` inclusive.
    pub fn backup(&self, from: NodeId, to: NodeId, updater: &dyn ValueUpdater<C>, observation: f32) {
        let mut current = Some(from);
        while let Some(id) = current {
            self.update_value(id, updater, observation);
            if id == to {
                return;
            }
            current = self.node(id).parent();
        }
    }

    // ---- traversal -------------------------------------------------------

    /// Visits `id` and all its descendants, parents before children.
    pub fn recurse_down_tree(&self, id: NodeId, mut f: impl FnMut(&Node<C, S>)) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current);
            f(&node);
            let mut children = node.children();
            children.reverse();
            stack.extend(children);
        }
    }

    /// Childless nodes under `id` (or `id` itself), in depth-first creation order.
    pub fn get_leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        self.recurse_down_tree(id, |n| {
            if n.child_count() == 0 {
                leaves.push(n.id());
            }
        });
        leaves
    }

    /// Descendants of `id` (or `id` itself) at exactly `depth`.
    pub fn nodes_at_depth(&self, id: NodeId, depth: u32) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.recurse_down_tree(id, |n| {
            if n.depth() == depth {
                out.push(n.id());
            }
        });
        out
    }

    /// Number of nodes strictly below `id`.
    pub fn count_descendants(&self, id: NodeId) -> usize {
        let mut count = 0usize;
        self.recurse_down_tree(id, |_| count += 1);
        count - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Distribution, EqualDistribution, PerDepthCatalog};
    use crate::value::Average;

    fn catalog(levels: Vec<Vec<u32>>) -> Arc<dyn ActionGenerator<char>> {
        let dist: Arc<dyn Distribution<char>> = Arc::new(EqualDistribution);
        let levels = levels
            .into_iter()
            .map(|l| l.into_iter().map(|d| Action::new('a', d)).collect())
            .collect();
        Arc::new(PerDepthCatalog::from_levels(levels, dist, false))
    }

    fn tree() -> SearchTree<char, u32> {
        SearchTree::new(0, catalog(vec![vec![0, 1], vec![2, 3, 4]]))
    }

    fn grow(tree: &SearchTree<char, u32>, parent: NodeId, duration: u32, failed: bool) -> NodeId {
        assert!(tree.reserve(parent));
        let child = tree.expand(parent, Action::new('a', duration), duration, failed).unwrap();
        tree.release(parent).unwrap();
        child
    }

    #[test]
    fn test_root_starts_with_generator_actions() {
        let tree = tree();
        let root = tree.node(tree.root());
        assert_eq!(root.depth(), 0);
        assert_eq!(root.untried_count(), 2);
        assert!(!root.is_fully_explored());
        assert_eq!(root.max_branch_depth(), 0);
    }

    #[test]
    fn test_root_depth_offset() {
        let tree: SearchTree<char, u32> =
            SearchTree::with_root_depth(0, 1, catalog(vec![vec![0, 1], vec![2, 3, 4]]));
        assert_eq!(tree.depth(tree.root()), 1);
        assert_eq!(tree.node(tree.root()).untried_count(), 3);
    }

    #[test]
    fn test_expand_moves_action_from_untried_to_children() {
        let tree = tree();
        let root = tree.root();
        let child = grow(&tree, root, 1, false);
        let node = tree.node(root);
        assert_eq!(node.untried_count(), 1);
        assert_eq!(node.child_entries(), vec![(Action::new('a', 1), child)]);
        assert_eq!(tree.depth(child), 1);
        assert_eq!(tree.node(child).untried_count(), 3);
        assert_eq!(tree.max_branch_depth(root), 1);
    }

    #[test]
    fn test_expand_rejects_repeat_and_unknown_actions() {
        let tree = tree();
        let root = tree.root();
        assert!(tree.reserve(root));
        tree.expand(root, Action::new('a', 0), 0, false).unwrap();
        let repeat = tree.expand(root, Action::new('a', 0), 0, false);
        assert!(matches!(repeat, Err(SearchError::InvalidActionRequest { .. })));
        let unknown = tree.expand(root, Action::new('z', 0), 0, false);
        assert!(matches!(unknown, Err(SearchError::InvalidActionRequest { .. })));
        tree.release(root).unwrap();
    }

    #[test]
    fn test_expand_requires_reservation() {
        let tree = tree();
        let result = tree.expand(tree.root(), Action::new('a', 0), 0, false);
        assert!(matches!(result, Err(SearchError::ReservationMisuse { .. })));
    }

    #[test]
    fn test_reservation_blocks_whole_path() {
        let tree = tree();
        let root = tree.root();
        let a = grow(&tree, root, 0, false);
        let b = grow(&tree, root, 1, false);

        assert!(tree.reserve(a));
        assert!(tree.is_reserved(root));
        // Sibling is free, the ancestor and the node itself are not.
        assert!(!tree.reserve(a));
        assert!(!tree.reserve(root));
        assert!(tree.reserve(b));
        tree.release(a).unwrap();
        assert!(tree.is_reserved(root));
        tree.release(b).unwrap();
        assert!(!tree.is_reserved(root));
        assert!(!tree.is_reserved(a));
    }

    #[test]
    fn test_descendant_of_frontier_cannot_be_reserved() {
        let tree = tree();
        let root = tree.root();
        let a = grow(&tree, root, 0, false);
        assert!(tree.reserve(root));
        assert!(!tree.reserve(a));
        tree.release(root).unwrap();
        assert!(tree.reserve(a));
        tree.release(a).unwrap();
    }

    #[test]
    fn test_reserve_expandable_refuses_node_without_untried_actions() {
        let tree = tree();
        let root = tree.root();
        let a = grow(&tree, root, 0, false);
        assert!(tree.reserve_expandable(root));
        tree.release(root).unwrap();

        // The last root action goes to someone else between look and claim.
        grow(&tree, root, 1, false);
        assert!(!tree.node(root).has_untried());
        assert!(!tree.reserve_expandable(root));
        assert!(!tree.is_reserved(root));
        assert!(tree.reserve(root));
        tree.release(root).unwrap();

        let failed = grow(&tree, a, 2, true);
        assert!(!tree.reserve_expandable(failed));
        assert!(!tree.is_reserved(a));
        assert!(tree.reserve_expandable(a));
        tree.release(a).unwrap();
    }

    #[test]
    fn test_release_without_reserve_is_misuse() {
        let tree = tree();
        assert!(matches!(tree.release(tree.root()), Err(SearchError::ReservationMisuse { .. })));
    }

    #[test]
    fn test_transfer_keeps_path_marked() {
        let tree = tree();
        let root = tree.root();
        assert!(tree.reserve(root));
        let child = tree.expand(root, Action::new('a', 0), 0, false).unwrap();
        tree.transfer_reservation(root, child).unwrap();
        assert!(tree.node(child).is_frontier());
        assert!(!tree.node(root).is_frontier());
        assert!(tree.is_reserved(root));
        assert!(!tree.reserve(root));
        tree.release(child).unwrap();
        assert!(!tree.is_reserved(root));
        assert!(!tree.is_reserved(child));
    }

    #[test]
    fn test_failed_child_is_terminal_and_explored() {
        let tree = tree();
        let child = grow(&tree, tree.root(), 0, true);
        let node = tree.node(child);
        assert!(node.is_failed());
        assert!(node.is_fully_explored());
        assert_eq!(node.untried_count(), 0);
    }

    #[test]
    fn test_full_enumeration_marks_root_explored() {
        let tree = tree();
        let root = tree.root();
        for first in 0..2 {
            let mid = grow(&tree, root, first, false);
            assert!(!tree.is_fully_explored(root));
            for second in 2..5 {
                let leaf = grow(&tree, mid, second, false);
                assert!(tree.is_fully_explored(leaf));
                assert_eq!(tree.max_branch_depth(leaf), 2);
            }
            assert!(tree.is_fully_explored(mid));
        }
        assert!(tree.is_fully_explored(root));
        assert_eq!(tree.get_leaves(root).len(), 6);
        assert_eq!(tree.count_descendants(root), 8);
        assert_eq!(tree.nodes_at_depth(root, 1).len(), 2);
    }

    #[test]
    fn test_ancestor_queries() {
        let tree = tree();
        let root = tree.root();
        let mid = grow(&tree, root, 1, false);
        let leaf = grow(&tree, mid, 4, false);
        assert_eq!(tree.ancestors(leaf), vec![mid, root]);
        assert_eq!(tree.ancestor_at_depth(leaf, 1), Some(mid));
        assert_eq!(tree.ancestor_at_depth(mid, 2), None);
        assert!(tree.is_ancestor(root, leaf));
        assert!(!tree.is_ancestor(leaf, root));
        assert_eq!(tree.path_actions(leaf), vec![Action::new('a', 1), Action::new('a', 4)]);
    }

    #[test]
    fn test_backup_updates_path_only() {
        let tree = tree();
        let root = tree.root();
        let a = grow(&tree, root, 0, false);
        let b = grow(&tree, root, 1, false);
        tree.backup(a, root, &Average, 4.0);
        tree.backup(a, root, &Average, 8.0);
        assert_eq!(tree.value(a).value(), 6.0);
        assert_eq!(tree.value(root).update_count(), 2);
        assert_eq!(tree.value(b).update_count(), 0);
        assert_eq!(tree.child_values(root).len(), 1);
    }
}
