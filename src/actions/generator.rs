//! Producers of the candidate action list offered at a node.
//!
//! A generator sees only the node's absolute depth and the actions on the
//! path from the tree root, so it can be called for tree nodes and for
//! unattached rollout states alike. Calls must be deterministic.

use super::{Action, ActionList, Command, Distribution};
use std::collections::HashMap;
use std::sync::Arc;

/// What a generator knows about the node it is generating for.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a, C> {
    /// Absolute depth of the node
    pub depth: u32,
    /// Actions from the tree root down to the node, root first
    pub path: &'a [Action<C>],
}

impl<'a, C> ActionContext<'a, C> {
    pub fn new(depth: u32, path: &'a [Action<C>]) -> Self {
        ActionContext { depth, path }
    }

    /// Action that produced the node, if it is not the root.
    pub fn last_action(&self) -> Option<&'a Action<C>> {
        self.path.last()
    }
}

/// Produces the candidate child actions of a node.
pub trait ActionGenerator<C: Command>: Send + Sync {
    fn potential_child_actions(&self, ctx: &ActionContext<'_, C>) -> ActionList<C>;

    /// Every action this generator can ever produce.
    fn all_possible_actions(&self) -> Vec<Action<C>>;
}

/// The same list at every node.
pub struct FixedActions<C: Command> {
    actions: ActionList<C>,
}

impl<C: Command> FixedActions<C> {
    pub fn new(actions: ActionList<C>) -> Self {
        FixedActions { actions }
    }
}

impl<C: Command> ActionGenerator<C> for FixedActions<C> {
    fn potential_child_actions(&self, _ctx: &ActionContext<'_, C>) -> ActionList<C> {
        self.actions.clone()
    }

    fn all_possible_actions(&self) -> Vec<Action<C>> {
        self.actions.as_slice().to_vec()
    }
}

/// A catalog with one list per depth.
///
/// In cycling mode depth `d` gets `catalog[d % len]`; otherwise depths past
/// the end of the catalog get an empty list, which bounds the tree. Exceptions
/// override the list at specific depths in either mode.
pub struct PerDepthCatalog<C: Command> {
    catalog: Vec<ActionList<C>>,
    exceptions: HashMap<u32, ActionList<C>>,
    cycle: bool,
    empty: ActionList<C>,
}

impl<C: Command> PerDepthCatalog<C> {
    /// Catalog repeated forever.
    pub fn cycling(catalog: Vec<ActionList<C>>, distribution: Arc<dyn Distribution<C>>) -> Self {
        Self::build(catalog, distribution, true)
    }

    /// Catalog played once; the tree ends after the last level.
    pub fn bounded(catalog: Vec<ActionList<C>>, distribution: Arc<dyn Distribution<C>>) -> Self {
        Self::build(catalog, distribution, false)
    }

    fn build(catalog: Vec<ActionList<C>>, distribution: Arc<dyn Distribution<C>>, cycle: bool) -> Self {
        PerDepthCatalog {
            catalog,
            exceptions: HashMap::new(),
            cycle,
            empty: ActionList::new(distribution),
        }
    }

    /// Convenience: build from plain action vectors sharing one distribution.
    pub fn from_levels(
        levels: Vec<Vec<Action<C>>>,
        distribution: Arc<dyn Distribution<C>>,
        cycle: bool,
    ) -> Self {
        let catalog = levels
            .into_iter()
            .map(|level| ActionList::from_actions(level, distribution.clone()))
            .collect();
        Self::build(catalog, distribution, cycle)
    }

    /// Replaces the list offered at one absolute depth.
    pub fn with_exception(mut self, depth: u32, actions: ActionList<C>) -> Self {
        self.exceptions.insert(depth, actions);
        self
    }

    pub fn levels(&self) -> usize {
        self.catalog.len()
    }
}

impl<C: Command> ActionGenerator<C> for PerDepthCatalog<C> {
    fn potential_child_actions(&self, ctx: &ActionContext<'_, C>) -> ActionList<C> {
        if let Some(list) = self.exceptions.get(&ctx.depth) {
            return list.clone();
        }
        let depth = ctx.depth as usize;
        if self.catalog.is_empty() || (!self.cycle && depth >= self.catalog.len()) {
            return self.empty.clone();
        }
        self.catalog[depth % self.catalog.len()].clone()
    }

    fn all_possible_actions(&self) -> Vec<Action<C>> {
        let mut all = ActionList::new(self.empty.distribution().clone());
        for list in self.catalog.iter().chain(self.exceptions.values()) {
            all.extend(list.iter().cloned());
        }
        all.as_slice().to_vec()
    }
}

/// Offers every list except the one holding the node's own action.
///
/// Stops the same kind of input being chained back to back. The root is
/// offered everything.
pub struct UniformNoRepeats<C: Command> {
    lists: Vec<ActionList<C>>,
    distribution: Arc<dyn Distribution<C>>,
}

impl<C: Command> UniformNoRepeats<C> {
    pub fn new(lists: Vec<ActionList<C>>, distribution: Arc<dyn Distribution<C>>) -> Self {
        UniformNoRepeats { lists, distribution }
    }
}

impl<C: Command> ActionGenerator<C> for UniformNoRepeats<C> {
    fn potential_child_actions(&self, ctx: &ActionContext<'_, C>) -> ActionList<C> {
        let mut out = ActionList::new(self.distribution.clone());
        let last = ctx.last_action();
        for list in &self.lists {
            if let Some(last) = last {
                if list.contains(last) {
                    continue;
                }
            }
            out.extend(list.iter().cloned());
        }
        out
    }

    fn all_possible_actions(&self) -> Vec<Action<C>> {
        let mut all = ActionList::new(self.distribution.clone());
        for list in &self.lists {
            all.extend(list.iter().cloned());
        }
        all.as_slice().to_vec()
    }
}
