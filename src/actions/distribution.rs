//! Sampling rules over a pool of candidate actions.

use super::{Action, Command, SearchRng};
use crate::error::{Result, SearchError};
use rand::Rng;
use rand_distr::Normal;
use std::fmt;

/// Uniform index draw over any non-empty pool.
pub fn rand_sample<'a, T>(pool: &'a [T], rng: &mut SearchRng) -> Result<&'a T> {
    if pool.is_empty() {
        return Err(SearchError::SamplingPoolEmpty);
    }
    Ok(&pool[rng.random_range(0..pool.len())])
}

/// A weighting over a pool of actions.
pub trait Distribution<C: Command>: Send + Sync + fmt::Debug {
    /// Index of the element drawn from `pool`. Fails on an empty pool.
    fn sample_index(&self, pool: &[Action<C>], rng: &mut SearchRng) -> Result<usize>;

    fn rand_on_distribution<'a>(
        &self,
        pool: &'a [Action<C>],
        rng: &mut SearchRng,
    ) -> Result<&'a Action<C>> {
        let idx = self.sample_index(pool, rng)?;
        Ok(&pool[idx])
    }

    /// Draws once from `first ++ second` and reports whether the draw landed in `first`.
    fn choose_a_set(
        &self,
        first: &[Action<C>],
        second: &[Action<C>],
        rng: &mut SearchRng,
    ) -> Result<bool> {
        let combined: Vec<Action<C>> = first.iter().chain(second.iter()).cloned().collect();
        let idx = self.sample_index(&combined, rng)?;
        Ok(idx < first.len())
    }
}

/// Every action equally likely.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualDistribution;

impl<C: Command> Distribution<C> for EqualDistribution {
    fn sample_index(&self, pool: &[Action<C>], rng: &mut SearchRng) -> Result<usize> {
        if pool.is_empty() {
            return Err(SearchError::SamplingPoolEmpty);
        }
        Ok(rng.random_range(0..pool.len()))
    }
}

/// Draws a duration from a Gaussian and snaps to the action with the nearest duration.
///
/// Ties go to the earliest action in the pool.
#[derive(Debug, Clone)]
pub struct NormalDistribution {
    mean: f64,
    std_dev: f64,
    normal: Normal<f64>,
}

impl NormalDistribution {
    pub fn new(mean: f64, std_dev: f64) -> Result<Self> {
        if !(std_dev >= 0.0) {
            return Err(SearchError::InvalidConfig(format!(
                "standard deviation must be non-negative, got {std_dev}"
            )));
        }
        let normal = Normal::new(mean, std_dev)
            .map_err(|e| SearchError::InvalidConfig(format!("normal distribution: {e}")))?;
        Ok(NormalDistribution {
            mean,
            std_dev,
            normal,
        })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }
}

impl<C: Command> Distribution<C> for NormalDistribution {
    fn sample_index(&self, pool: &[Action<C>], rng: &mut SearchRng) -> Result<usize> {
        if pool.is_empty() {
            return Err(SearchError::SamplingPoolEmpty);
        }
        let target = rng.sample(self.normal);
        let mut best = 0;
        let mut best_gap = f64::INFINITY;
        for (idx, action) in pool.iter().enumerate() {
            let gap = (action.duration as f64 - target).abs();
            if gap < best_gap {
                best = idx;
                best_gap = gap;
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn pool(n: u32) -> Vec<Action<u8>> {
        (0..n).map(|d| Action::new(0u8, d)).collect()
    }

    #[test]
    fn test_equal_hits_every_element() {
        let mut rng = SearchRng::seed_from_u64(5);
        let pool = pool(5);
        let mut hits = [0u32; 5];
        for _ in 0..5000 {
            let idx = EqualDistribution.sample_index(&pool, &mut rng).unwrap();
            hits[idx] += 1;
        }
        assert!(hits.iter().all(|&h| h > 0), "hits: {hits:?}");
    }

    #[test]
    fn test_empty_pool_is_an_error() {
        let mut rng = SearchRng::seed_from_u64(5);
        let empty: Vec<Action<u8>> = Vec::new();
        assert!(matches!(
            EqualDistribution.rand_on_distribution(&empty, &mut rng),
            Err(SearchError::SamplingPoolEmpty)
        ));
        assert!(matches!(rand_sample(&empty, &mut rng), Err(SearchError::SamplingPoolEmpty)));
        assert!(EqualDistribution.choose_a_set(&empty, &empty, &mut rng).is_err());
    }

    #[test]
    fn test_choose_a_set_respects_sizes() {
        let mut rng = SearchRng::seed_from_u64(11);
        let a = pool(1);
        let b = pool(9);
        let from_a = (0..4000)
            .filter(|_| EqualDistribution.choose_a_set(&a, &b, &mut rng).unwrap())
            .count();
        // Expect about 400.
        assert!((250..600).contains(&from_a), "from_a = {from_a}");
        let empty: Vec<Action<u8>> = Vec::new();
        assert!(EqualDistribution.choose_a_set(&a, &empty, &mut rng).unwrap());
        assert!(!EqualDistribution.choose_a_set(&empty, &b, &mut rng).unwrap());
    }

    #[test]
    fn test_normal_with_zero_spread_snaps_to_nearest() {
        let mut rng = SearchRng::seed_from_u64(3);
        let dist = NormalDistribution::new(6.4, 0.0).unwrap();
        let pool = vec![Action::new(1u8, 2), Action::new(1, 6), Action::new(1, 9)];
        for _ in 0..20 {
            assert_eq!(dist.rand_on_distribution(&pool, &mut rng).unwrap().duration, 6);
        }
    }

    #[test]
    fn test_normal_rejects_negative_spread() {
        assert!(NormalDistribution::new(0.0, -1.0).is_err());
    }
}
