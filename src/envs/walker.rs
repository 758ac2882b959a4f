//! # Balancing Walker
//!
//! A one-dimensional body that drifts away from the origin unless pushed
//! back. An action holds a push for `duration` ticks; leaving the band
//! `[-limit, limit]` fails the step. Small enough to simulate millions of
//! ticks per second, unstable enough that most branches die.

use crate::actions::{Action, ActionList, Distribution, EqualDistribution, UniformNoRepeats};
use crate::environment::{EvaluationFunction, FnEvaluation, Simulator};
use std::sync::Arc;

/// Control input of the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Push {
    Coast,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkerState {
    pub position: f32,
    pub velocity: f32,
    pub tick: u32,
}

impl WalkerState {
    /// Slightly off balance so that coasting eventually fails.
    pub fn initial() -> Self {
        WalkerState {
            position: 0.05,
            velocity: 0.0,
            tick: 0,
        }
    }
}

/// Simulator for [`WalkerState`].
#[derive(Debug, Clone)]
pub struct WalkerSim {
    /// Acceleration of a push
    pub force: f32,
    /// Outward acceleration per unit of displacement
    pub instability: f32,
    pub limit: f32,
    pub dt: f32,
}

impl Default for WalkerSim {
    fn default() -> Self {
        WalkerSim {
            force: 1.5,
            instability: 2.0,
            limit: 1.0,
            dt: 0.05,
        }
    }
}

impl WalkerSim {
    /// Survival time minus distance from the origin; failures score zero.
    pub fn evaluation() -> Arc<dyn EvaluationFunction<Push, WalkerState>> {
        Arc::new(FnEvaluation(|s: &WalkerState, _depth: u32, failed: bool| {
            if failed {
                0.0
            } else {
                s.tick as f32 * 0.05 + (1.0 - s.position.abs())
            }
        }))
    }

    /// Pushes and coasts of 1 to `max_duration` ticks; the same input is never offered twice in a row.
    pub fn action_generator(max_duration: u32) -> UniformNoRepeats<Push> {
        let dist: Arc<dyn Distribution<Push>> = Arc::new(EqualDistribution);
        let lists = [Push::Coast, Push::Left, Push::Right]
            .into_iter()
            .map(|push| ActionList::from_actions((1..=max_duration).map(|d| Action::new(push, d)), dist.clone()))
            .collect();
        UniformNoRepeats::new(lists, dist)
    }
}

impl Simulator<Push, WalkerState> for WalkerSim {
    fn step(&mut self, state: &WalkerState, action: &Action<Push>) -> (WalkerState, bool) {
        let push = match action.command {
            Push::Coast => 0.0,
            Push::Left => -self.force,
            Push::Right => self.force,
        };
        let mut next = *state;
        for _ in 0..action.duration {
            next.velocity += self.dt * (push + self.instability * next.position);
            next.position += self.dt * next.velocity;
            next.tick += 1;
            if next.position.abs() > self.limit {
                return (next, true);
            }
        }
        (next, false)
    }

    fn box_clone(&self) -> Box<dyn Simulator<Push, WalkerState>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionContext, ActionGenerator};

    #[test]
    fn test_coasting_eventually_fails() {
        let mut sim = WalkerSim::default();
        let (state, failed) = sim.step(&WalkerState::initial(), &Action::new(Push::Coast, 500));
        assert!(failed);
        assert!(state.position.abs() > sim.limit);
        assert!(state.tick < 500);
    }

    #[test]
    fn test_step_is_deterministic() {
        let mut sim = WalkerSim::default();
        let action = Action::new(Push::Left, 3);
        let a = sim.step(&WalkerState::initial(), &action);
        let b = sim.step(&WalkerState::initial(), &action);
        assert_eq!(a, b);
        assert_eq!(a.0.tick, 3);
        assert!(!a.1);
    }

    #[test]
    fn test_generator_avoids_repeating_input() {
        let generator = WalkerSim::action_generator(4);
        assert_eq!(generator.all_possible_actions().len(), 12);
        let path = [Action::new(Push::Left, 2)];
        let offered = generator.potential_child_actions(&ActionContext::new(1, &path));
        assert_eq!(offered.len(), 8);
        assert!(offered.iter().all(|a| a.command != Push::Left));
    }
}
