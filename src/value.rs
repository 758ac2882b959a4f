//! # Value Model
//!
//! Every node carries a [`ValueContainer`]: an aggregate score plus the
//! number of observations folded into it. A [`ValueUpdater`] is the only
//! thing allowed to change that aggregate. Updaters that summarize children
//! return the raw observation when there are no children to summarize.

use crate::actions::{Action, Command};
use std::cmp::Ordering;
use std::fmt;

/// Aggregate score of a node and the number of observations behind it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ValueContainer {
    value: f32,
    update_count: u32,
}

impl ValueContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn update_count(&self) -> u32 {
        self.update_count
    }

    /// Folds `observation` in through `updater`.
    pub fn apply<C: Command>(
        &mut self,
        updater: &dyn ValueUpdater<C>,
        observation: f32,
        children: &[ChildValue<C>],
    ) {
        self.value = updater.update(self.value, observation, self.update_count, children);
        self.update_count += 1;
    }
}

/// Snapshot of one child's statistics, handed to updaters.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildValue<C> {
    pub action: Action<C>,
    pub value: f32,
    pub update_count: u32,
}

/// Rule for folding a new observation into a node's aggregate.
///
/// `children` holds the node's children that have at least one update.
/// Implementations must be pure: the tree serializes calls per node.
pub trait ValueUpdater<C: Command>: Send + Sync + fmt::Debug {
    fn update(&self, current: f32, observation: f32, prior_updates: u32, children: &[ChildValue<C>]) -> f32;
}

/// Running mean of all observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Average;

impl<C: Command> ValueUpdater<C> for Average {
    fn update(&self, current: f32, observation: f32, prior_updates: u32, _children: &[ChildValue<C>]) -> f32 {
        let n = prior_updates as f32;
        (current * n + observation) / (n + 1.0)
    }
}

/// Latest observation wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct Replace;

impl<C: Command> ValueUpdater<C> for Replace {
    fn update(&self, _current: f32, observation: f32, _prior_updates: u32, _children: &[ChildValue<C>]) -> f32 {
        observation
    }
}

/// Best observation seen so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl<C: Command> ValueUpdater<C> for Max {
    fn update(&self, current: f32, observation: f32, prior_updates: u32, _children: &[ChildValue<C>]) -> f32 {
        if prior_updates == 0 {
            observation
        } else {
            current.max(observation)
        }
    }
}

/// Mean of the `n` best children.
///
/// With fewer than `n` children the lowest child is repeated to fill the
/// divisor, so a single lucky child cannot dominate.
#[derive(Debug, Clone, Copy)]
pub struct TopNChildren {
    n: usize,
}

impl TopNChildren {
    pub fn new(n: usize) -> Self {
        TopNChildren { n: n.max(1) }
    }
}

impl<C: Command> ValueUpdater<C> for TopNChildren {
    fn update(&self, _current: f32, observation: f32, _prior_updates: u32, children: &[ChildValue<C>]) -> f32 {
        if children.is_empty() {
            return observation;
        }
        let mut values: Vec<f32> = children.iter().map(|c| c.value).collect();
        values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        values.truncate(self.n);
        let lowest = values[values.len() - 1];
        let sum: f32 = values.iter().sum::<f32>() + lowest * (self.n - values.len()) as f32;
        sum / self.n as f32
    }
}

/// How a window of neighbouring children is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCriteria {
    Worst,
    Average,
}

/// Best window of neighbouring actions.
///
/// Children are grouped into clusters of equal command and consecutive
/// durations. Every window of `window` adjacent children inside a cluster
/// is scored by `criteria`, and the node takes the best window anywhere.
/// A cluster narrower than the window is scored as a whole.
#[derive(Debug, Clone, Copy)]
pub struct TopWindow {
    window: usize,
    criteria: WindowCriteria,
}

impl TopWindow {
    pub fn new(window: usize, criteria: WindowCriteria) -> Self {
        TopWindow {
            window: window.max(1),
            criteria,
        }
    }

    fn score(&self, values: &[f32]) -> f32 {
        match self.criteria {
            WindowCriteria::Worst => values.iter().copied().fold(f32::INFINITY, f32::min),
            WindowCriteria::Average => values.iter().sum::<f32>() / values.len() as f32,
        }
    }
}

/// Splits children sorted by action into runs of equal command and consecutive durations.
pub fn separate_clusters<C: Command>(sorted: &[ChildValue<C>]) -> Vec<&[ChildValue<C>]> {
    let mut clusters = Vec::new();
    let mut start = 0;
    for i in 1..=sorted.len() {
        let split = i == sorted.len() || {
            let prev = &sorted[i - 1].action;
            let next = &sorted[i].action;
            prev.command != next.command || next.duration != prev.duration + 1
        };
        if split && i > start {
            clusters.push(&sorted[start..i]);
            start = i;
        }
    }
    clusters
}

impl<C: Command> ValueUpdater<C> for TopWindow {
    fn update(&self, _current: f32, observation: f32, _prior_updates: u32, children: &[ChildValue<C>]) -> f32 {
        if children.is_empty() {
            return observation;
        }
        let mut sorted = children.to_vec();
        sorted.sort_by(|a, b| a.action.cmp(&b.action));

        let mut best = f32::NEG_INFINITY;
        for cluster in separate_clusters(&sorted) {
            let values: Vec<f32> = cluster.iter().map(|c| c.value).collect();
            let cluster_best = if values.len() <= self.window {
                self.score(&values)
            } else {
                values
                    .windows(self.window)
                    .map(|w| self.score(w))
                    .fold(f32::NEG_INFINITY, f32::max)
            };
            best = best.max(cluster_best);
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    enum Keys {
        None,
        Wo,
        Qp,
    }

    fn child<C>(command: C, duration: u32, value: f32) -> ChildValue<C> {
        ChildValue {
            action: Action::new(command, duration),
            value,
            update_count: 1,
        }
    }

    #[test]
    fn test_average_of_two_observations() {
        let mut container = ValueContainer::new();
        container.apply::<u8>(&Average, 10.0, &[]);
        container.apply::<u8>(&Average, 20.0, &[]);
        assert_eq!(container.value(), 15.0);
        assert_eq!(container.update_count(), 2);
    }

    #[test]
    fn test_replace_and_max() {
        let mut replace = ValueContainer::new();
        let mut max = ValueContainer::new();
        for obs in [3.0, -1.0, 2.0] {
            replace.apply::<u8>(&Replace, obs, &[]);
            max.apply::<u8>(&Max, obs, &[]);
        }
        assert_eq!(replace.value(), 2.0);
        assert_eq!(max.value(), 3.0);
    }

    #[test]
    fn test_top_n_pads_with_lowest() {
        let children = vec![child(0u8, 1, 2.0), child(0u8, 2, 4.0)];
        let at = |n| TopNChildren::new(n).update(0.0, 100.0, 0, &children);
        assert_eq!(at(1), 4.0);
        assert_eq!(at(2), 3.0);
        assert!((at(3) - 8.0 / 3.0).abs() < 1e-6);

        let root = vec![
            child(0u8, 1, 8.0 / 3.0),
            child(0u8, 2, 6.0),
            child(0u8, 3, 1.0),
            child(0u8, 4, 7.0),
            child(0u8, 5, 9.0),
        ];
        let at = |n| TopNChildren::new(n).update(0.0, 100.0, 0, &root);
        assert_eq!(at(1), 9.0);
        assert_eq!(at(2), 8.0);
        assert!((at(3) - 22.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_childless_updaters_return_observation() {
        let none: &[ChildValue<u8>] = &[];
        assert_eq!(TopNChildren::new(3).update(5.0, 1.5, 4, none), 1.5);
        assert_eq!(TopWindow::new(3, WindowCriteria::Worst).update(5.0, -2.0, 4, none), -2.0);
    }

    fn window_children() -> Vec<ChildValue<Keys>> {
        vec![
            child(Keys::None, 5, 8.0),
            child(Keys::None, 6, 10.0),
            child(Keys::None, 1, 4.0),
            child(Keys::Qp, 3, -1.0),
            child(Keys::Wo, 6, 0.0),
            child(Keys::Wo, 5, 4.0),
            child(Keys::Wo, 4, 11.0),
            child(Keys::Wo, 7, -2.0),
            child(Keys::Wo, 3, 15.0),
            child(Keys::Wo, 8, 14.0),
            child(Keys::None, 8, 3.0),
            child(Keys::None, 9, 2.0),
            child(Keys::None, 10, -6.0),
        ]
    }

    #[test]
    fn test_cluster_separation() {
        let mut sorted = window_children();
        sorted.sort_by(|a, b| a.action.cmp(&b.action));
        let clusters = separate_clusters(&sorted);
        let sizes: Vec<usize> = clusters.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![1, 2, 3, 6, 1]);
        assert_eq!(clusters[0][0].action, Action::new(Keys::None, 1));
        assert_eq!(clusters[3][0].action, Action::new(Keys::Wo, 3));
        assert_eq!(clusters[3][5].action, Action::new(Keys::Wo, 8));
        assert_eq!(clusters[4][0].action, Action::new(Keys::Qp, 3));
    }

    #[test]
    fn test_top_window_scores() {
        let children = window_children();
        let worst = TopWindow::new(3, WindowCriteria::Worst).update(0.0, 0.0, 0, &children);
        assert_eq!(worst, 8.0);
        let average = TopWindow::new(3, WindowCriteria::Average).update(0.0, 0.0, 0, &children);
        assert!((average - 10.0).abs() < 1e-6);
    }
}
