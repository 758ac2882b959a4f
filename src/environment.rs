//! # External Collaborators
//!
//! The engine never simulates, scores or stores anything itself. It talks
//! to three collaborators:
//!
//! - [`Simulator`]: advances a state by one action. Each worker owns its
//!   own instances, so implementations need not be `Sync`.
//! - [`EvaluationFunction`]: scores a state, higher is better.
//! - [`DataSaver`]: observes the steps a worker takes.

use crate::actions::{Action, Command};
use crate::tree::Node;
use parking_lot::Mutex;
use std::sync::Arc;

/// Advances an environment state.
pub trait Simulator<C: Command, S>: Send {
    /// Applies `action` to `state`. The flag is true when the step failed,
    /// which makes the resulting node terminal.
    fn step(&mut self, state: &S, action: &Action<C>) -> (S, bool);

    /// A private copy for another worker or for rollouts.
    fn box_clone(&self) -> Box<dyn Simulator<C, S>>;
}

/// Scores states; higher is better.
pub trait EvaluationFunction<C: Command, S>: Send + Sync {
    /// Score of `state` reached at absolute `depth`.
    fn evaluate(&self, state: &S, depth: u32, failed: bool) -> f32;

    fn value(&self, node: &Node<C, S>) -> f32 {
        self.evaluate(node.state(), node.depth(), node.is_failed())
    }
}

/// Same score everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct Constant(pub f32);

impl<C: Command, S> EvaluationFunction<C, S> for Constant {
    fn evaluate(&self, _state: &S, _depth: u32, _failed: bool) -> f32 {
        self.0
    }
}

/// Deeper is better.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthEvaluation;

impl<C: Command, S> EvaluationFunction<C, S> for DepthEvaluation {
    fn evaluate(&self, _state: &S, depth: u32, _failed: bool) -> f32 {
        depth as f32
    }
}

/// Evaluation backed by a closure.
pub struct FnEvaluation<F>(pub F);

impl<C, S, F> EvaluationFunction<C, S> for FnEvaluation<F>
where
    C: Command,
    F: Fn(&S, u32, bool) -> f32 + Send + Sync,
{
    fn evaluate(&self, state: &S, depth: u32, failed: bool) -> f32 {
        (self.0)(state, depth, failed)
    }
}

/// Observer of the steps a worker takes.
///
/// Calls come from the worker's own thread in the middle of an iteration, so
/// implementations should return quickly.
pub trait DataSaver<C: Command, S>: Send {
    fn report_step(&mut self, state: &S, action: &Action<C>);

    fn report_iteration_end(&mut self, final_state: &S, failed: bool);

    /// The worker is done with this stage.
    fn finalize(&mut self) {}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSaver;

impl<C: Command, S> DataSaver<C, S> for NullSaver {
    fn report_step(&mut self, _state: &S, _action: &Action<C>) {}

    fn report_iteration_end(&mut self, _final_state: &S, _failed: bool) {}
}

/// What a [`MemorySaver`] has seen.
#[derive(Debug, Clone)]
pub struct SaverLog<C, S> {
    pub steps: Vec<(S, Action<C>)>,
    pub iterations: usize,
    pub failures: usize,
    pub finalized: usize,
}

impl<C, S> Default for SaverLog<C, S> {
    fn default() -> Self {
        SaverLog {
            steps: Vec::new(),
            iterations: 0,
            failures: 0,
            finalized: 0,
        }
    }
}

/// Records into a log shared by every clone.
pub struct MemorySaver<C, S> {
    log: Arc<Mutex<SaverLog<C, S>>>,
}

impl<C, S> MemorySaver<C, S> {
    pub fn new() -> Self {
        MemorySaver {
            log: Arc::new(Mutex::new(SaverLog::default())),
        }
    }

    pub fn log(&self) -> Arc<Mutex<SaverLog<C, S>>> {
        self.log.clone()
    }
}

impl<C, S> Default for MemorySaver<C, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, S> Clone for MemorySaver<C, S> {
    fn clone(&self) -> Self {
        MemorySaver {
            log: self.log.clone(),
        }
    }
}

impl<C: Command, S: Clone + Send> DataSaver<C, S> for MemorySaver<C, S> {
    fn report_step(&mut self, state: &S, action: &Action<C>) {
        self.log.lock().steps.push((state.clone(), action.clone()));
    }

    fn report_iteration_end(&mut self, _final_state: &S, failed: bool) {
        let mut log = self.log.lock();
        log.iterations += 1;
        if failed {
            log.failures += 1;
        }
    }

    fn finalize(&mut self) {
        self.log.lock().finalized += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_evaluation() {
        let eval = FnEvaluation(|s: &i32, depth: u32, failed: bool| {
            if failed {
                -1.0
            } else {
                *s as f32 + depth as f32
            }
        });
        assert_eq!(EvaluationFunction::<u8, i32>::evaluate(&eval, &3, 2, false), 5.0);
        assert_eq!(EvaluationFunction::<u8, i32>::evaluate(&eval, &3, 2, true), -1.0);
        assert_eq!(EvaluationFunction::<u8, i32>::evaluate(&DepthEvaluation, &0, 7, false), 7.0);
    }

    #[test]
    fn test_memory_saver_shares_log() {
        let mut a: MemorySaver<u8, i32> = MemorySaver::new();
        let mut b = a.clone();
        a.report_step(&1, &Action::new(0, 2));
        b.report_step(&2, &Action::new(1, 3));
        b.report_iteration_end(&2, true);
        a.finalize();
        let log = a.log();
        let log = log.lock();
        assert_eq!(log.steps.len(), 2);
        assert_eq!(log.iterations, 1);
        assert_eq!(log.failures, 1);
        assert_eq!(log.finalized, 1);
    }
}
