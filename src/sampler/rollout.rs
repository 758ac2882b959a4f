//! Rollout policies: unattached forward simulations that score a new node.
//!
//! A rollout starts from the node's state, repeatedly draws a uniform random
//! action from what the generator would offer at that point, and steps a
//! private simulator. Nothing it visits is added to the tree.

use crate::actions::{Action, Command, SearchRng};
use crate::config::RolloutConfig;
use crate::environment::{EvaluationFunction, Simulator};
use crate::error::Result;
use crate::tree::{NodeId, SearchTree};
use crate::State;
use std::sync::Arc;

/// Scores a freshly created node.
pub trait RolloutPolicy<C: Command, S>: Send + Sync {
    fn rollout(
        &self,
        tree: &SearchTree<C, S>,
        node: NodeId,
        simulator: &mut dyn Simulator<C, S>,
        rng: &mut SearchRng,
    ) -> Result<f32>;
}

/// One simulated transition of a rollout.
struct Transition<'a, S> {
    before: &'a S,
    after: &'a S,
    depth: u32,
    index: u32,
}

/// End of a rollout.
struct Outcome<S> {
    state: S,
    depth: u32,
    failed: bool,
}

fn random_walk<C: Command, S: State>(
    tree: &SearchTree<C, S>,
    node: NodeId,
    simulator: &mut dyn Simulator<C, S>,
    rng: &mut SearchRng,
    max_steps: u32,
    mut on_step: impl FnMut(Transition<'_, S>),
) -> Result<Outcome<S>> {
    let start = tree.node(node);
    let mut state = start.state().clone();
    let mut depth = start.depth();
    let mut failed = start.is_failed();
    let mut taken: Vec<Action<C>> = Vec::new();

    let mut index = 0;
    while !failed && index < max_steps {
        let offered = tree.actions_after(node, &taken);
        if offered.is_empty() {
            break;
        }
        let action = offered.random_uniform(rng)?.clone();
        let (next, step_failed) = simulator.step(&state, &action);
        depth += 1;
        on_step(Transition {
            before: &state,
            after: &next,
            depth,
            index,
        });
        state = next;
        failed = step_failed;
        taken.push(action);
        index += 1;
    }
    Ok(Outcome { state, depth, failed })
}

/// No simulation: the evaluation applied to the node itself.
pub struct EvaluationOnly<C: Command, S> {
    evaluation: Arc<dyn EvaluationFunction<C, S>>,
}

impl<C: Command, S> EvaluationOnly<C, S> {
    pub fn new(evaluation: Arc<dyn EvaluationFunction<C, S>>) -> Self {
        EvaluationOnly { evaluation }
    }
}

impl<C: Command, S: State> RolloutPolicy<C, S> for EvaluationOnly<C, S> {
    fn rollout(
        &self,
        tree: &SearchTree<C, S>,
        node: NodeId,
        _simulator: &mut dyn Simulator<C, S>,
        _rng: &mut SearchRng,
    ) -> Result<f32> {
        Ok(self.evaluation.value(&tree.node(node)))
    }
}

/// Score of the state the rollout ends in.
pub struct EndScore<C: Command, S> {
    evaluation: Arc<dyn EvaluationFunction<C, S>>,
    config: RolloutConfig,
}

impl<C: Command, S> EndScore<C, S> {
    pub fn new(evaluation: Arc<dyn EvaluationFunction<C, S>>, config: RolloutConfig) -> Self {
        EndScore { evaluation, config }
    }
}

impl<C: Command, S: State> RolloutPolicy<C, S> for EndScore<C, S> {
    fn rollout(
        &self,
        tree: &SearchTree<C, S>,
        node: NodeId,
        simulator: &mut dyn Simulator<C, S>,
        rng: &mut SearchRng,
    ) -> Result<f32> {
        let end = random_walk(tree, node, simulator, rng, self.config.max_steps, |_| {})?;
        let score = self.evaluation.evaluate(&end.state, end.depth, end.failed);
        Ok(if end.failed {
            score * self.config.failure_multiplier
        } else {
            score
        })
    }
}

/// Improvement from the node's state to the state the rollout ends in.
pub struct DeltaScore<C: Command, S> {
    evaluation: Arc<dyn EvaluationFunction<C, S>>,
    config: RolloutConfig,
}

impl<C: Command, S> DeltaScore<C, S> {
    pub fn new(evaluation: Arc<dyn EvaluationFunction<C, S>>, config: RolloutConfig) -> Self {
        DeltaScore { evaluation, config }
    }
}

impl<C: Command, S: State> RolloutPolicy<C, S> for DeltaScore<C, S> {
    fn rollout(
        &self,
        tree: &SearchTree<C, S>,
        node: NodeId,
        simulator: &mut dyn Simulator<C, S>,
        rng: &mut SearchRng,
    ) -> Result<f32> {
        let start_score = self.evaluation.value(&tree.node(node));
        let end = random_walk(tree, node, simulator, rng, self.config.max_steps, |_| {})?;
        let delta = self.evaluation.evaluate(&end.state, end.depth, end.failed) - start_score;
        Ok(if end.failed {
            delta * self.config.failure_multiplier
        } else {
            delta
        })
    }
}

/// Sum of per-step improvements, weighted down as the rollout goes on.
///
/// Weight of step `t` out of `m` is `kernel(t / (m - 1))` with
/// `kernel(x) = 0.5 - 0.5 * tanh(5 * (x - 0.5))`.
pub struct DecayingHorizon<C: Command, S> {
    evaluation: Arc<dyn EvaluationFunction<C, S>>,
    config: RolloutConfig,
}

impl<C: Command, S> DecayingHorizon<C, S> {
    pub fn new(evaluation: Arc<dyn EvaluationFunction<C, S>>, config: RolloutConfig) -> Self {
        DecayingHorizon { evaluation, config }
    }

    pub fn kernel(x: f32) -> f32 {
        -0.5 * (5.0 * (x - 0.5)).tanh() + 0.5
    }
}

impl<C: Command, S: State> RolloutPolicy<C, S> for DecayingHorizon<C, S> {
    fn rollout(
        &self,
        tree: &SearchTree<C, S>,
        node: NodeId,
        simulator: &mut dyn Simulator<C, S>,
        rng: &mut SearchRng,
    ) -> Result<f32> {
        let steps = self.config.max_steps;
        let span = steps.saturating_sub(1).max(1) as f32;
        let mut total = 0.0;
        random_walk(tree, node, simulator, rng, steps, |t| {
            let before = self.evaluation.evaluate(t.before, t.depth - 1, false);
            let after = self.evaluation.evaluate(t.after, t.depth, false);
            total += Self::kernel(t.index as f32 / span) * (after - before);
        })?;
        Ok(total)
    }
}
