//! # Samplers
//!
//! A sampler is the strategy behind one search iteration. The worker calls
//! its phases in a fixed order:
//!
//! ```text
//!  tree_policy ──> expansion_policy ──> rollout_policy ──> backup
//!   (reserve)       │      ▲              (unattached)     (values)
//!                   └──────┘
//!              while keep_expanding
//! ```
//!
//! The tree policy returns a node the sampler has reserved. The worker
//! steps the simulator for the chosen action, adds the child and carries the
//! reservation down to it; samplers that keep expanding repeat this from the
//! new child. The reservation is released after backup.

pub mod deterministic;
pub mod distribution;
pub mod greedy;
pub mod random;
pub mod rollout;
pub mod ucb;

pub use deterministic::DeterministicSampler;
pub use distribution::DistributionSampler;
pub use greedy::GreedySampler;
pub use random::RandomSampler;
pub use rollout::{DecayingHorizon, DeltaScore, EndScore, EvaluationOnly, RolloutPolicy};
pub use ucb::UcbSampler;

use crate::actions::{Action, Command, SearchRng};
use crate::config::BackoffConfig;
use crate::environment::Simulator;
use crate::error::{Result, SearchError};
use crate::tree::{NodeId, SearchTree};
use crate::State;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// The four-phase strategy run by a worker.
pub trait Sampler<C: Command, S>: Send {
    fn name(&self) -> &'static str;

    /// Picks and reserves a node to expand below `root`.
    ///
    /// `Ok(None)` means every candidate stayed contended; the worker counts a
    /// jam and tries again. Fails with `ExplorationExhausted` when `root` is
    /// fully explored.
    fn tree_policy(&mut self, tree: &SearchTree<C, S>, root: NodeId, rng: &mut SearchRng) -> Result<Option<NodeId>>;

    /// Untried action to expand at the reserved `frontier`.
    fn expansion_policy(&mut self, tree: &SearchTree<C, S>, frontier: NodeId, rng: &mut SearchRng) -> Result<Action<C>>;

    /// Whether to expand again from the node just created.
    fn keep_expanding(&self, _tree: &SearchTree<C, S>, _node: NodeId) -> bool {
        false
    }

    /// Value observed for the last node created.
    fn rollout_policy(
        &mut self,
        tree: &SearchTree<C, S>,
        node: NodeId,
        simulator: &mut dyn Simulator<C, S>,
        rng: &mut SearchRng,
    ) -> Result<f32>;

    /// Records `value` for `node` and, depending on the strategy, its ancestors up to `root`.
    fn backup(&mut self, tree: &SearchTree<C, S>, root: NodeId, node: NodeId, value: f32);

    fn box_clone(&self) -> Box<dyn Sampler<C, S>>;
}

/// Growing sleep used while a tree policy keeps hitting reserved nodes.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    delay: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let delay = config.initial_delay;
        Backoff { config, delay }
    }

    pub fn reset(&mut self) {
        self.delay = self.config.initial_delay;
    }

    /// Sleeps for the current delay and grows it. Returns false once the
    /// delay has passed the cap; the caller should give up this attempt.
    pub fn wait(&mut self) -> bool {
        if self.delay > self.config.max_delay {
            debug!(delay_ms = self.delay.as_millis() as u64, "tree policy jammed, giving up");
            self.reset();
            return false;
        }
        if self.delay.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(self.delay);
        }
        self.delay = self.delay * 2 + Duration::from_millis(1);
        true
    }
}

/// Fails with `ExplorationExhausted` if `root` has nothing left.
pub(crate) fn ensure_explorable<C: Command, S: State>(
    tree: &SearchTree<C, S>,
    root: NodeId,
) -> Result<()> {
    if tree.is_fully_explored(root) {
        return Err(SearchError::ExplorationExhausted { node: root });
    }
    Ok(())
}

/// Children of `id` that are not fully explored, not reserved first.
///
/// Children with reservations somewhere below them come after the free ones
/// and are only used when no free child is left. Frontier children are never
/// returned.
pub(crate) fn open_children<C: Command, S: State>(
    tree: &SearchTree<C, S>,
    id: NodeId,
) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut free = Vec::new();
    let mut busy = Vec::new();
    for child in tree.children(id) {
        let node = tree.node(child);
        if node.is_fully_explored() || node.is_frontier() {
            continue;
        }
        if node.is_reserved() {
            busy.push(child);
        } else {
            free.push(child);
        }
    }
    (free, busy)
}

/// Error for expanding a node that has nothing left to try.
pub(crate) fn nothing_untried(node: NodeId) -> SearchError {
    SearchError::InvalidActionRequest {
        node,
        reason: "expansion policy called on a node with no untried actions".into(),
    }
}

/// Expansion rule shared by the single-path samplers: keep going while the
/// new node is alive and has something to try.
pub(crate) fn can_continue<C: Command, S: State>(tree: &SearchTree<C, S>, node: NodeId) -> bool {
    let node = tree.node(node);
    !node.is_failed() && node.has_untried()
}
