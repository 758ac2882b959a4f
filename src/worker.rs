//! # Tree Workers
//!
//! A [`TreeWorker`] is one concurrent execution unit. It owns its sampler,
//! its simulators, its data saver and its random number generator; the only
//! thing it shares is the tree. Each iteration walks the worker through
//!
//! ```text
//! Idle -> TreePolicy -> Expansion (xN) -> Rollout -> Evaluate -> Idle
//! ```
//!
//! and releases the reservation it took in the tree policy before going
//! idle, whether the iteration succeeded or not.

use crate::actions::{Command, SearchRng};
use crate::environment::{DataSaver, NullSaver, Simulator};
use crate::error::Result;
use crate::sampler::Sampler;
use crate::tree::{NodeId, SearchTree};
use crate::State;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Monotonic totals shared by every worker that reports into it.
#[derive(Debug, Default)]
pub struct GameCounter {
    iterations: AtomicU64,
    steps: AtomicU64,
}

impl GameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide counter.
    pub fn global() -> Arc<GameCounter> {
        static GLOBAL: OnceLock<Arc<GameCounter>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(GameCounter::new())).clone()
    }

    /// Completed iterations ("games played").
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::SeqCst)
    }

    /// Simulator steps taken inside the tree.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::SeqCst)
    }

    fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::SeqCst);
    }

    fn record_step(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }
}

/// Start/stop boundary between a stage and its workers.
///
/// Workers take one ticket per iteration. A stage with an iteration budget
/// limits the tickets; stopping hands out no more.
#[derive(Debug)]
pub struct Dispatcher {
    stop: AtomicBool,
    remaining: Option<AtomicU64>,
}

impl Dispatcher {
    pub fn new(budget: Option<u64>) -> Self {
        Dispatcher {
            stop: AtomicBool::new(false),
            remaining: budget.map(AtomicU64::new),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Takes a ticket for one iteration.
    pub fn try_acquire(&self) -> bool {
        if self.is_stopped() {
            return false;
        }
        match &self.remaining {
            None => true,
            Some(remaining) => remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
                .is_ok(),
        }
    }

    /// Returns a ticket whose iteration did not complete.
    pub fn refund(&self) {
        if let Some(remaining) = &self.remaining {
            remaining.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Phase a worker is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    TreePolicy,
    Expansion,
    Rollout,
    Evaluate,
}

/// Per-worker throughput counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStats {
    pub iterations: u64,
    pub expansions: u64,
    pub failures: u64,
    pub jams: u64,
    pub busy: Duration,
}

/// How one iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// A chain of nodes was added; `leaf` is the last one.
    Completed { leaf: NodeId },
    /// The tree policy found nothing it could reserve.
    Jammed,
}

pub struct TreeWorker<C: Command, S> {
    id: usize,
    sampler: Box<dyn Sampler<C, S>>,
    simulator: Box<dyn Simulator<C, S>>,
    rollout_simulator: Box<dyn Simulator<C, S>>,
    saver: Box<dyn DataSaver<C, S>>,
    rng: SearchRng,
    counter: Arc<GameCounter>,
    status: WorkerStatus,
    stats: WorkerStats,
}

impl<C: Command, S: State> TreeWorker<C, S> {
    /// Creates a worker with a private rollout copy of `simulator`.
    ///
    /// # Arguments
    /// * `id` - Index used in log lines
    /// * `seed` - Seeds the worker's generator; `None` draws from entropy
    pub fn new(
        id: usize,
        sampler: Box<dyn Sampler<C, S>>,
        simulator: Box<dyn Simulator<C, S>>,
        counter: Arc<GameCounter>,
        seed: Option<u64>,
    ) -> Self {
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        let rollout_simulator = simulator.box_clone();
        TreeWorker {
            id,
            sampler,
            simulator,
            rollout_simulator,
            saver: Box::new(NullSaver),
            rng: SearchRng::seed_from_u64(seed),
            counter,
            status: WorkerStatus::Idle,
            stats: WorkerStats::default(),
        }
    }

    pub fn with_saver(mut self, saver: Box<dyn DataSaver<C, S>>) -> Self {
        self.saver = saver;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn sampler_name(&self) -> &'static str {
        self.sampler.name()
    }

    /// Runs iterations below `root` until the dispatcher stops handing out tickets.
    ///
    /// Returns `Ok` when stopped or when `root` is exhausted, and the error of
    /// the iteration that failed otherwise.
    pub fn run(&mut self, tree: &SearchTree<C, S>, root: NodeId, dispatcher: &Dispatcher) -> Result<()> {
        debug!(worker = self.id, sampler = self.sampler.name(), root = %root, "worker started");
        let result = self.run_loop(tree, root, dispatcher);
        self.saver.finalize();
        self.status = WorkerStatus::Idle;
        debug!(worker = self.id, iterations = self.stats.iterations, jams = self.stats.jams, "worker stopped");
        result
    }

    fn run_loop(&mut self, tree: &SearchTree<C, S>, root: NodeId, dispatcher: &Dispatcher) -> Result<()> {
        while dispatcher.try_acquire() {
            if tree.is_fully_explored(root) {
                dispatcher.refund();
                return Ok(());
            }
            match self.run_iteration(tree, root) {
                Ok(IterationOutcome::Completed { .. }) => {}
                Ok(IterationOutcome::Jammed) => dispatcher.refund(),
                Err(e) if e.is_exhausted() => {
                    dispatcher.refund();
                    debug!(worker = self.id, "root exhausted");
                    return Ok(());
                }
                Err(e) => {
                    dispatcher.refund();
                    warn!(worker = self.id, error = %e, "worker stopping on error");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Runs one full iteration below `root`.
    pub fn run_iteration(&mut self, tree: &SearchTree<C, S>, root: NodeId) -> Result<IterationOutcome> {
        let started = Instant::now();
        self.status = WorkerStatus::TreePolicy;
        let frontier = match self.sampler.tree_policy(tree, root, &mut self.rng) {
            Ok(Some(frontier)) => frontier,
            Ok(None) => {
                self.stats.jams += 1;
                self.status = WorkerStatus::Idle;
                return Ok(IterationOutcome::Jammed);
            }
            Err(e) => {
                self.status = WorkerStatus::Idle;
                return Err(e);
            }
        };
        trace!(worker = self.id, frontier = %frontier, "tree policy done");

        let mut held = frontier;
        let result = self.grow_and_score(tree, root, &mut held);
        let released = tree.release(held);
        self.status = WorkerStatus::Idle;
        self.stats.busy += started.elapsed();

        result?;
        released?;
        self.stats.iterations += 1;
        self.counter.record_iteration();
        Ok(IterationOutcome::Completed { leaf: held })
    }

    /// Expansion, rollout and backup. `held` always names the node currently reserved.
    fn grow_and_score(&mut self, tree: &SearchTree<C, S>, root: NodeId, held: &mut NodeId) -> Result<()> {
        loop {
            self.status = WorkerStatus::Expansion;
            let action = self.sampler.expansion_policy(tree, *held, &mut self.rng)?;
            let state = tree.node(*held).state().clone();
            let (next, failed) = self.simulator.step(&state, &action);
            self.counter.record_step();
            self.saver.report_step(&state, &action);

            let child = tree.expand(*held, action, next, failed)?;
            tree.transfer_reservation(*held, child)?;
            *held = child;
            self.stats.expansions += 1;
            if failed {
                self.stats.failures += 1;
            }
            if !self.sampler.keep_expanding(tree, child) {
                break;
            }
        }

        self.status = WorkerStatus::Rollout;
        let value = self
            .sampler
            .rollout_policy(tree, *held, self.rollout_simulator.as_mut(), &mut self.rng)?;

        self.status = WorkerStatus::Evaluate;
        self.sampler.backup(tree, root, *held, value);
        let leaf = tree.node(*held);
        self.saver.report_iteration_end(leaf.state(), leaf.is_failed());
        trace!(worker = self.id, leaf = %leaf.id(), value, "iteration done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionGenerator, Distribution, EqualDistribution, PerDepthCatalog};
    use crate::environment::MemorySaver;
    use crate::sampler::DeterministicSampler;

    #[derive(Clone)]
    struct Adder;

    impl Simulator<char, u32> for Adder {
        fn step(&mut self, state: &u32, action: &Action<char>) -> (u32, bool) {
            (state + action.duration, action.command == 'f')
        }

        fn box_clone(&self) -> Box<dyn Simulator<char, u32>> {
            Box::new(self.clone())
        }
    }

    fn tree(levels: Vec<Vec<Action<char>>>) -> SearchTree<char, u32> {
        let dist: Arc<dyn Distribution<char>> = Arc::new(EqualDistribution);
        let generator: Arc<dyn ActionGenerator<char>> = Arc::new(PerDepthCatalog::from_levels(levels, dist, false));
        SearchTree::new(0, generator)
    }

    fn worker(counter: Arc<GameCounter>) -> TreeWorker<char, u32> {
        TreeWorker::new(0, Box::new(DeterministicSampler::new()), Box::new(Adder), counter, Some(1))
    }

    #[test]
    fn test_dispatcher_budget_and_refund() {
        let dispatcher = Dispatcher::new(Some(2));
        assert!(dispatcher.try_acquire());
        assert!(dispatcher.try_acquire());
        assert!(!dispatcher.try_acquire());
        dispatcher.refund();
        assert!(dispatcher.try_acquire());
        dispatcher.stop();
        dispatcher.refund();
        assert!(!dispatcher.try_acquire());
    }

    #[test]
    fn test_iteration_releases_and_counts() {
        let tree = tree(vec![vec![Action::new('a', 1)], vec![Action::new('a', 2)]]);
        let counter = Arc::new(GameCounter::new());
        let mut worker = worker(counter.clone());
        let outcome = worker.run_iteration(&tree, tree.root()).unwrap();
        let IterationOutcome::Completed { leaf } = outcome else {
            panic!("expected a completed iteration, got {outcome:?}");
        };
        assert_eq!(tree.depth(leaf), 2);
        assert_eq!(*tree.node(leaf).state(), 3);
        assert!(!tree.is_reserved(tree.root()));
        assert_eq!(counter.iterations(), 1);
        assert_eq!(counter.steps(), 2);
        assert_eq!(worker.stats().expansions, 2);
        assert_eq!(worker.status(), WorkerStatus::Idle);
    }

    #[test]
    fn test_failed_step_ends_chain() {
        let tree = tree(vec![vec![Action::new('f', 1)], vec![Action::new('a', 2)]]);
        let mut worker = worker(Arc::new(GameCounter::new()));
        worker.run_iteration(&tree, tree.root()).unwrap();
        let leaves = tree.get_leaves(tree.root());
        assert_eq!(leaves.len(), 1);
        assert!(tree.node(leaves[0]).is_failed());
        assert!(tree.is_fully_explored(tree.root()));
        assert_eq!(worker.stats().failures, 1);
    }

    #[test]
    fn test_run_stops_when_exhausted_and_reports_to_saver() {
        let tree = tree(vec![vec![Action::new('a', 1), Action::new('a', 2)]]);
        let saver: MemorySaver<char, u32> = MemorySaver::new();
        let log = saver.log();
        let mut worker = worker(Arc::new(GameCounter::new())).with_saver(Box::new(saver));
        worker.run(&tree, tree.root(), &Dispatcher::unlimited()).unwrap();
        assert!(tree.is_fully_explored(tree.root()));
        let log = log.lock();
        assert_eq!(log.steps.len(), 2);
        assert_eq!(log.iterations, 2);
        assert_eq!(log.finalized, 1);
    }

    #[test]
    fn test_exhausted_iteration_is_an_error() {
        let tree = tree(vec![vec![Action::new('a', 1)]]);
        let mut worker = worker(Arc::new(GameCounter::new()));
        worker.run_iteration(&tree, tree.root()).unwrap();
        let err = worker.run_iteration(&tree, tree.root()).unwrap_err();
        assert!(err.is_exhausted());
    }
}
