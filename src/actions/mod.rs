//! # Action Space
//!
//! Actions are timed control inputs: a command held for `duration`
//! simulator ticks. An [`ActionList`] is an ordered, duplicate-free set of
//! candidate actions together with the [`Distribution`] used to pick among
//! them, and an [`ActionGenerator`] produces the list offered at a node.

pub mod distribution;
pub mod generator;

pub use distribution::{rand_sample, Distribution, EqualDistribution, NormalDistribution};
pub use generator::{ActionContext, ActionGenerator, FixedActions, PerDepthCatalog, UniformNoRepeats};

use crate::error::Result;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Random number generator used throughout the engine. Each worker owns one.
pub type SearchRng = Xoshiro256PlusPlus;

/// Bounds required of a control command.
///
/// `Ord` gives actions a canonical order, which the windowed value updater
/// relies on when grouping sibling actions.
pub trait Command: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

impl<T> Command for T where T: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

/// A control command held for a number of simulator ticks.
///
/// Two actions are equal iff both command and duration match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Action<C> {
    pub command: C,
    pub duration: u32,
}

impl<C> Action<C> {
    pub fn new(command: C, duration: u32) -> Self {
        Action { command, duration }
    }
}

impl<C: fmt::Debug> fmt::Display for Action<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.command, self.duration)
    }
}

/// Ordered, duplicate-free list of actions with a sampling distribution.
#[derive(Clone)]
pub struct ActionList<C: Command> {
    actions: Vec<Action<C>>,
    distribution: Arc<dyn Distribution<C>>,
}

impl<C: Command> ActionList<C> {
    pub fn new(distribution: Arc<dyn Distribution<C>>) -> Self {
        ActionList {
            actions: Vec::new(),
            distribution,
        }
    }

    /// Builds a list from `actions`, dropping repeats but keeping first-seen order.
    pub fn from_actions(
        actions: impl IntoIterator<Item = Action<C>>,
        distribution: Arc<dyn Distribution<C>>,
    ) -> Self {
        let mut list = Self::new(distribution);
        list.extend(actions);
        list
    }

    /// Adds `action` unless an equal one is already present. Returns whether it was added.
    pub fn push(&mut self, action: Action<C>) -> bool {
        if self.actions.contains(&action) {
            return false;
        }
        self.actions.push(action);
        true
    }

    pub fn extend(&mut self, actions: impl IntoIterator<Item = Action<C>>) {
        for action in actions {
            self.push(action);
        }
    }

    /// Removes `action`, keeping the order of the rest. Returns whether it was present.
    pub fn remove(&mut self, action: &Action<C>) -> bool {
        match self.actions.iter().position(|a| a == action) {
            Some(idx) => {
                self.actions.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn contains(&self, action: &Action<C>) -> bool {
        self.actions.contains(action)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Action<C>> {
        self.actions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action<C>> {
        self.actions.iter()
    }

    pub fn as_slice(&self) -> &[Action<C>] {
        &self.actions
    }

    pub fn distribution(&self) -> &Arc<dyn Distribution<C>> {
        &self.distribution
    }

    /// Uniform draw, ignoring the list's distribution.
    pub fn random_uniform(&self, rng: &mut SearchRng) -> Result<&Action<C>> {
        rand_sample(&self.actions, rng)
    }

    /// Draw under the list's distribution.
    pub fn sample_distribution(&self, rng: &mut SearchRng) -> Result<&Action<C>> {
        self.distribution.rand_on_distribution(&self.actions, rng)
    }
}

impl<C: Command> fmt::Debug for ActionList<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionList")
            .field("actions", &self.actions)
            .field("distribution", &self.distribution)
            .finish()
    }
}

impl<C: Command> PartialEq for ActionList<C> {
    /// Lists compare by contents and order; the distribution is not compared.
    fn eq(&self, other: &Self) -> bool {
        self.actions == other.actions
    }
}

impl<'a, C: Command> IntoIterator for &'a ActionList<C> {
    type Item = &'a Action<C>;
    type IntoIter = std::slice::Iter<'a, Action<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
