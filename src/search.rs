//! # Search Driver
//!
//! Owns the shared tree, the workers and the rayon pool they run on, and
//! runs one stage at a time:
//!
//! 1. initialize the stage against its root
//! 2. let every worker loop on its own pool thread
//! 3. poll the stage predicate from one more pool thread
//! 4. stop dispatching, join the workers, collect results
//!
//! The pool is sized `workers + 1` so the polling loop never competes with
//! a worker for a thread.

use crate::actions::Command;
use crate::config::SearchConfig;
use crate::environment::Simulator;
use crate::error::{Result, SearchError};
use crate::filter::NodeFilter;
use crate::sampler::Sampler;
use crate::stage::{StageContext, StageDriver, TreeStage};
use crate::tree::{NodeId, SearchTree};
use crate::worker::{Dispatcher, GameCounter, TreeWorker};
use crate::State;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Snapshot of a search, for reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStatistics {
    /// Nodes in the whole tree
    pub total_nodes: usize,
    /// Iterations completed by every worker sharing the counter
    pub iterations: u64,
    /// Simulator steps taken inside the tree
    pub steps: u64,
    /// Updates recorded at the tree root
    pub root_visits: u32,
    /// Deepest absolute depth reached
    pub max_depth: u32,
    /// Tree policy attempts that found nothing to reserve
    pub jams: u64,
    /// Time workers spent inside iterations, summed
    pub busy: Duration,
}

pub struct Search<C: Command, S: State> {
    config: SearchConfig,
    tree: SearchTree<C, S>,
    workers: Vec<TreeWorker<C, S>>,
    pool: ThreadPool,
    counter: Arc<GameCounter>,
}

impl<C: Command, S: State> Search<C, S> {
    /// Wraps already built workers. They should all report into `counter`.
    pub fn new(
        config: SearchConfig,
        tree: SearchTree<C, S>,
        workers: Vec<TreeWorker<C, S>>,
        counter: Arc<GameCounter>,
    ) -> Result<Self> {
        config.validate()?;
        if workers.is_empty() {
            return Err(SearchError::InvalidConfig("a search needs at least one worker".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.len() + 1)
            .thread_name(|i| format!("tree-search-{i}"))
            .build()?;
        Ok(Search {
            config,
            tree,
            workers,
            pool,
            counter,
        })
    }

    /// Builds `config.worker_count` workers, each with its own copy of
    /// `sampler` and `simulator`, seeded from the config.
    pub fn with_sampler(
        config: SearchConfig,
        tree: SearchTree<C, S>,
        sampler: Box<dyn Sampler<C, S>>,
        simulator: Box<dyn Simulator<C, S>>,
    ) -> Result<Self> {
        let counter = Arc::new(GameCounter::new());
        let workers = (0..config.worker_count)
            .map(|i| {
                TreeWorker::new(
                    i,
                    sampler.box_clone(),
                    simulator.box_clone(),
                    counter.clone(),
                    config.worker_seed(i),
                )
            })
            .collect();
        Self::new(config, tree, workers, counter)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn tree(&self) -> &SearchTree<C, S> {
        &self.tree
    }

    pub fn workers(&self) -> &[TreeWorker<C, S>] {
        &self.workers
    }

    pub fn counter(&self) -> &Arc<GameCounter> {
        &self.counter
    }

    /// Runs `stage` below `root` until its predicate holds or no worker can
    /// make progress, and returns the stage's results.
    ///
    /// The first worker error stops the others and is returned instead.
    pub fn run_stage(&mut self, stage: &mut dyn TreeStage<C, S>, root: NodeId) -> Result<Vec<NodeId>> {
        let Search {
            config,
            tree,
            workers,
            pool,
            counter,
        } = self;
        let tree: &SearchTree<C, S> = tree;
        let counter: &GameCounter = counter;
        if tree.get(root).is_none() {
            return Err(SearchError::IllegalState(format!("stage root {root} is not in the tree")));
        }

        let worker_count = workers.len();
        let context = |active_workers| StageContext {
            tree,
            root,
            worker_count,
            active_workers,
            counter,
        };

        let mut driver = StageDriver::new(stage);
        driver.initialize(&context(worker_count))?;

        let dispatcher = Dispatcher::new(driver.iteration_budget());
        let active = AtomicUsize::new(worker_count);
        let failure: Mutex<Option<SearchError>> = Mutex::new(None);
        let poll_interval = config.poll_interval;
        let started = Instant::now();
        let games_before = counter.iterations();

        pool.scope(|scope| {
            for worker in workers.iter_mut() {
                let dispatcher = &dispatcher;
                let active = &active;
                let failure = &failure;
                scope.spawn(move |_| {
                    if let Err(err) = worker.run(tree, root, dispatcher) {
                        failure.lock().get_or_insert(err);
                        dispatcher.stop();
                    }
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }

            loop {
                let running = active.load(Ordering::SeqCst);
                if driver.poll(&context(running)) {
                    break;
                }
                if running == 0 {
                    driver.finish();
                    break;
                }
                thread::sleep(poll_interval);
            }
            dispatcher.stop();
        });

        if let Some(err) = failure.into_inner() {
            warn!(root = %root, error = %err, "stage aborted");
            return Err(err);
        }

        let results = driver.results(&context(0))?;
        info!(
            root = %root,
            games = counter.iterations() - games_before,
            nodes = tree.len(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage complete"
        );
        Ok(results)
    }

    /// [`Search::run_stage`] followed by `filter`.
    pub fn run_filtered(
        &mut self,
        stage: &mut dyn TreeStage<C, S>,
        root: NodeId,
        filter: &dyn NodeFilter<C, S>,
    ) -> Result<Vec<NodeId>> {
        let results = self.run_stage(stage, root)?;
        Ok(filter.filter(&self.tree, results))
    }

    pub fn statistics(&self) -> SearchStatistics {
        let root = self.tree.root();
        let (jams, busy) = self
            .workers
            .iter()
            .fold((0, Duration::ZERO), |(jams, busy), w| (jams + w.stats().jams, busy + w.stats().busy));
        SearchStatistics {
            total_nodes: self.tree.len(),
            iterations: self.counter.iterations(),
            steps: self.counter.steps(),
            root_visits: self.tree.value(root).update_count(),
            max_depth: self.tree.max_branch_depth(root),
            jams,
            busy,
        }
    }

    /// Hands the grown tree back.
    pub fn into_tree(self) -> SearchTree<C, S> {
        self.tree
    }
}
