//! # Search Configuration
//!
//! Tunables for the worker pool and for each sampling strategy. Every
//! struct has a sensible `Default`, chainable `with_*` setters and a
//! `validate` check run by [`crate::Search::new`].

use crate::error::{Result, SearchError};
use std::time::Duration;

/// Configuration for the confidence-bound sampler
#[derive(Debug, Clone, PartialEq)]
pub struct UcbConfig {
    /// Weight of the exploration term
    pub exploration_constant: f64,
    /// Each sampler copy adds `U(0, 1) * factor` to the constant, so workers
    /// disagree slightly on how adventurous to be
    pub exploration_random_factor: f64,
}

impl Default for UcbConfig {
    fn default() -> Self {
        Self {
            exploration_constant: std::f64::consts::SQRT_2,
            exploration_random_factor: 0.0,
        }
    }
}

/// Shape of the greedy sampler's per-depth sample budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCurve {
    /// Straight line from the start value to the inflection point, then the
    /// same slope down to the floor
    PiecewiseLinear,
    /// Hyperbola through the start value and the inflection point with the
    /// floor as its asymptote
    Hyperbolic,
}

/// Configuration for the depth-scaled greedy sampler
#[derive(Debug, Clone, PartialEq)]
pub struct GreedyConfig {
    pub samples_at_zero: u32,
    pub inflection_depth: u32,
    pub samples_at_inflection: u32,
    pub samples_floor: u32,
    /// Levels to move the working root down once its budget is spent
    pub forward_jump: u32,
    /// Levels to move the working root back up when it is fully explored
    pub backwards_jump: u32,
    pub backwards_jump_min: u32,
    /// Growth of the backwards jump on consecutive dead ends
    pub failure_multiplier: f64,
    pub curve: SampleCurve,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        Self {
            samples_at_zero: 1000,
            inflection_depth: 5,
            samples_at_inflection: 200,
            samples_floor: 75,
            forward_jump: 1,
            backwards_jump: 10,
            backwards_jump_min: 5,
            failure_multiplier: 1.5,
            curve: SampleCurve::PiecewiseLinear,
        }
    }
}

impl GreedyConfig {
    /// Number of iterations spent on a working root at depth `depth`.
    pub fn samples_at_depth(&self, depth: u32) -> u32 {
        let s0 = self.samples_at_zero as f64;
        let sn = self.samples_at_inflection as f64;
        let floor = self.samples_floor as f64;
        let n = self.inflection_depth.max(1) as f64;
        let d = depth as f64;

        let samples = match self.curve {
            SampleCurve::PiecewiseLinear => {
                let slope = (s0 - sn) / n;
                (s0 - slope * d).max(floor)
            }
            SampleCurve::Hyperbolic => {
                if s0 <= sn {
                    return self.samples_at_zero;
                }
                let a = n * n * (sn - floor) / (s0 - sn);
                a * (s0 - floor) / (d * d + a) + floor
            }
        };
        samples.round() as u32
    }
}

/// Bounds for unattached rollouts
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutConfig {
    /// Maximum simulator steps per rollout
    pub max_steps: u32,
    /// Multiplier applied to the score of a rollout that ended in failure
    pub failure_multiplier: f32,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            failure_multiplier: 1.0,
        }
    }
}

/// Back-off used when a tree policy keeps running into reserved nodes
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    /// Once the delay grows past this the tree policy gives up for this iteration
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_millis(64),
        }
    }
}

/// Top level configuration for a [`crate::Search`]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Number of concurrent workers
    pub worker_count: usize,
    /// How often the driver polls the stage's termination predicate
    pub poll_interval: Duration,
    /// Base seed; worker `i` is seeded with `seed + i`
    pub seed: Option<u64>,
    pub ucb: UcbConfig,
    pub greedy: GreedyConfig,
    pub rollout: RolloutConfig,
    pub backoff: BackoffConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            poll_interval: Duration::from_millis(500),
            seed: None,
            ucb: UcbConfig::default(),
            greedy: GreedyConfig::default(),
            rollout: RolloutConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Small, seeded configuration with fast polling for tests.
    pub fn for_testing() -> Self {
        Self {
            worker_count: 2,
            poll_interval: Duration::from_millis(1),
            seed: Some(42),
            backoff: BackoffConfig {
                initial_delay: Duration::ZERO,
                max_delay: Duration::from_millis(4),
            },
            ..Default::default()
        }
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_exploration_constant(mut self, c: f64) -> Self {
        self.ucb.exploration_constant = c;
        self
    }

    pub fn with_rollout_steps(mut self, max_steps: u32) -> Self {
        self.rollout.max_steps = max_steps;
        self
    }

    pub fn with_greedy(mut self, greedy: GreedyConfig) -> Self {
        self.greedy = greedy;
        self
    }

    /// Seed for worker `index`, if the run is seeded.
    pub fn worker_seed(&self, index: usize) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add(index as u64))
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(SearchError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }
        if !self.ucb.exploration_constant.is_finite() || self.ucb.exploration_constant < 0.0 {
            return Err(SearchError::InvalidConfig(format!(
                "exploration constant must be finite and non-negative, got {}",
                self.ucb.exploration_constant
            )));
        }
        if self.greedy.samples_floor > self.greedy.samples_at_zero {
            return Err(SearchError::InvalidConfig(
                "greedy sample floor exceeds the start value".into(),
            ));
        }
        if self.greedy.failure_multiplier < 1.0 {
            return Err(SearchError::InvalidConfig(
                "greedy failure multiplier must be at least 1".into(),
            ));
        }
        if self.backoff.max_delay < self.backoff.initial_delay {
            return Err(SearchError::InvalidConfig(
                "back-off cap is below the initial delay".into(),
            ));
        }
        Ok(())
    }
}
