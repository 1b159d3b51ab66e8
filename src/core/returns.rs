//! Monthly return sampling.
//!
//! Every trial owns its own generator, seeded from the run seed and the
//! trial index. The derived stream does not depend on the work-years
//! value being probed, so trial `i` replays the same market for every
//! probe of a search.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use super::error::SimError;
use super::types::MonthlyRates;

/// Source of one return sample per simulated month.
pub trait ReturnSource {
    fn next_return(&mut self) -> f64;
}

/// I.i.d. normal monthly returns over a seeded ChaCha stream.
pub struct NormalReturns {
    dist: Normal<f64>,
    rng: ChaCha8Rng,
}

impl NormalReturns {
    pub fn new(rates: MonthlyRates, seed: u64) -> Result<Self, SimError> {
        if !rates.mean.is_finite() || !rates.volatility.is_finite() || rates.volatility < 0.0 {
            return Err(SimError::InvalidConfiguration(format!(
                "monthly return distribution needs a finite mean and volatility >= 0, got mean {}, volatility {}",
                rates.mean, rates.volatility
            )));
        }
        let dist = Normal::new(rates.mean, rates.volatility).map_err(|e| {
            SimError::InvalidConfiguration(format!(
                "monthly return distribution (mean {}, volatility {}): {e}",
                rates.mean, rates.volatility
            ))
        })?;
        Ok(Self {
            dist,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }
}

impl ReturnSource for NormalReturns {
    fn next_return(&mut self) -> f64 {
        self.dist.sample(&mut self.rng)
    }
}

/// Same return every month.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct ConstantReturns(pub f64);

#[cfg(test)]
impl ReturnSource for ConstantReturns {
    fn next_return(&mut self) -> f64 {
        self.0
    }
}

/// Replays a fixed sequence, cycling when it runs out.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ScriptedReturns {
    values: Vec<f64>,
    cursor: usize,
}

#[cfg(test)]
impl ScriptedReturns {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, cursor: 0 }
    }

    pub fn drawn(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
impl ReturnSource for ScriptedReturns {
    fn next_return(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let v = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        v
    }
}

/// Separates the estimator's trial streams from the path recorder's.
pub const PATH_STREAM: u64 = 0x5041_5448;

pub fn derive_seed(base_seed: u64, stream: u64, trial_id: u32) -> u64 {
    let mixed = base_seed ^ (stream << 32) ^ trial_id as u64;
    splitmix64(mixed)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
