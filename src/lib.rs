//! # Parallel Tree Search
//!
//! A multi-threaded best-first search that grows one shared tree over a
//! simulated sequential-decision process. Nodes are simulator states,
//! edges are timed actions, and a node's value is whatever the active
//! value updater folds out of the observations backed up into it.
//!
//! Each worker repeats four phases against the shared tree:
//!
//! - **Tree policy** walks down from the stage root and reserves a node
//! - **Expansion** simulates one untried action and adds the child
//! - **Rollout** scores the new node, with or without an unattached playout
//! - **Backup** folds the score into the node and possibly its ancestors
//!
//! Path reservation keeps two workers from ever expanding in the same
//! subtree branch at once (see [`tree`]). Stages ([`stage`]) decide when a
//! run ends and which nodes it produced; [`Search`] runs them on a rayon
//! pool.
//!
//! ```no_run
//! use std::sync::Arc;
//! use treesearch::envs::walker::{WalkerSim, WalkerState};
//! use treesearch::sampler::{EndScore, UcbSampler};
//! use treesearch::stage::FixedGames;
//! use treesearch::value::Average;
//! use treesearch::{Search, SearchConfig, SearchTree};
//!
//! let sim = WalkerSim::default();
//! let config = SearchConfig::default();
//! let tree = SearchTree::new(WalkerState::initial(), Arc::new(WalkerSim::action_generator(4)));
//! let eval = WalkerSim::evaluation();
//! let rollout = Arc::new(EndScore::new(eval.clone(), config.rollout.clone()));
//! let sampler = UcbSampler::new(config.ucb.clone(), eval, rollout, Arc::new(Average));
//! let mut search = Search::with_sampler(config, tree, Box::new(sampler), Box::new(sim))?;
//! let root = search.tree().root();
//! search.run_stage(&mut FixedGames::new(1000), root)?;
//! # Ok::<(), treesearch::SearchError>(())
//! ```

pub mod actions;
pub mod config;
pub mod environment;
pub mod envs;
pub mod error;
pub mod filter;
pub mod sampler;
pub mod search;
pub mod stage;
pub mod tree;
pub mod value;
pub mod worker;

pub use actions::{Action, ActionGenerator, ActionList, Command, SearchRng};
pub use config::SearchConfig;
pub use environment::{DataSaver, EvaluationFunction, Simulator};
pub use error::{Result, SearchError};
pub use search::{Search, SearchStatistics};
pub use tree::{Node, NodeId, SearchTree};
pub use worker::{GameCounter, TreeWorker};

/// A simulator state stored in tree nodes.
///
/// Nodes are shared between worker threads and states are cloned whenever
/// a worker steps the simulator from them.
pub trait State: Clone + Send + Sync + 'static {}

impl<T> State for T where T: Clone + Send + Sync + 'static {}
