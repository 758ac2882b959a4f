//! A single vertex of the search tree.

use crate::actions::{Action, ActionList, Command};
use crate::value::ValueContainer;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Handle of a node inside a [`super::SearchTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mutable structure of a node: what is left to try and what already exists.
pub(crate) struct NodeLinks<C: Command> {
    pub(crate) untried: ActionList<C>,
    /// Append-only, in creation order
    pub(crate) children: Vec<(Action<C>, NodeId)>,
}

/// One vertex of the search tree.
///
/// Identity fields are fixed at creation. Structure sits behind a mutex and
/// only grows; status flags are atomics so they can be read without locking.
pub struct Node<C: Command, S> {
    id: NodeId,
    parent: Option<NodeId>,
    action: Option<Action<C>>,
    depth: u32,
    state: S,
    failed: bool,
    pub(crate) links: Mutex<NodeLinks<C>>,
    pub(crate) value: Mutex<ValueContainer>,
    pub(crate) fully_explored: AtomicBool,
    pub(crate) max_branch_depth: AtomicU32,
    /// Set while a worker holds this node as its frontier
    pub(crate) frontier: AtomicBool,
    /// Number of frontiers currently reserved strictly below this node
    pub(crate) pass_through: AtomicU32,
}

impl<C: Command, S> Node<C, S> {
    pub(crate) fn new(
        id: NodeId,
        parent: Option<NodeId>,
        action: Option<Action<C>>,
        depth: u32,
        state: S,
        failed: bool,
        untried: ActionList<C>,
    ) -> Self {
        let untried = if failed {
            ActionList::new(untried.distribution().clone())
        } else {
            untried
        };
        let explored = failed || untried.is_empty();
        Node {
            id,
            parent,
            action,
            depth,
            state,
            failed,
            links: Mutex::new(NodeLinks {
                untried,
                children: Vec::new(),
            }),
            value: Mutex::new(ValueContainer::new()),
            fully_explored: AtomicBool::new(explored),
            max_branch_depth: AtomicU32::new(depth),
            frontier: AtomicBool::new(false),
            pass_through: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Action that led here from the parent. `None` for the tree root.
    pub fn action(&self) -> Option<&Action<C>> {
        self.action.as_ref()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// The simulator reported failure on the step into this node. Failed nodes are terminal.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_fully_explored(&self) -> bool {
        self.fully_explored.load(Ordering::SeqCst)
    }

    pub fn max_branch_depth(&self) -> u32 {
        self.max_branch_depth.load(Ordering::SeqCst)
    }

    /// Held as a frontier, or on the path to one.
    pub fn is_reserved(&self) -> bool {
        self.frontier.load(Ordering::SeqCst) || self.pass_through.load(Ordering::SeqCst) > 0
    }

    pub fn is_frontier(&self) -> bool {
        self.frontier.load(Ordering::SeqCst)
    }

    pub fn value(&self) -> ValueContainer {
        *self.value.lock()
    }

    pub fn untried_count(&self) -> usize {
        self.links.lock().untried.len()
    }

    pub fn has_untried(&self) -> bool {
        !self.links.lock().untried.is_empty()
    }

    /// Copy of the untried actions, in generator order.
    pub fn untried_actions(&self) -> ActionList<C> {
        self.links.lock().untried.clone()
    }

    pub fn child_count(&self) -> usize {
        self.links.lock().children.len()
    }

    pub fn children(&self) -> Vec<NodeId> {
        self.links.lock().children.iter().map(|(_, id)| *id).collect()
    }

    /// Children tagged with the action that produced them, in creation order.
    pub fn child_entries(&self) -> Vec<(Action<C>, NodeId)> {
        self.links.lock().children.clone()
    }
}

impl<C: Command, S> fmt::Debug for Node<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("action", &self.action)
            .field("failed", &self.failed)
            .field("fully_explored", &self.is_fully_explored())
            .field("max_branch_depth", &self.max_branch_depth())
            .field("reserved", &self.is_reserved())
            .finish()
    }
}
