//! Box-constrained parameter domain and the initial exploration design.
//!
//! Every parameter dimension lives in a closed interval `[low, high]` fixed
//! for the session. The surrogate works in the unit cube, so the domain
//! also owns the mapping between the two spaces.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rng_util;

/// A closed box `[low_i, high_i]` per dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    bounds: Vec<(f64, f64)>,
}

impl Domain {
    /// Creates a domain from per-dimension `(low, high)` pairs.
    ///
    /// An empty list is allowed here (it is rejected later by the
    /// acquisition optimizer and by config validation).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if any interval has `low >= high`
    /// or a non-finite end.
    pub fn new(bounds: Vec<(f64, f64)>) -> Result<Self> {
        for &(low, high) in &bounds {
            if !(low.is_finite() && high.is_finite() && low < high) {
                return Err(Error::InvalidBounds { low, high });
            }
        }
        Ok(Self { bounds })
    }

    /// Number of dimensions.
    #[must_use]
    pub fn n_dims(&self) -> usize {
        self.bounds.len()
    }

    /// `true` if the domain has no dimensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// The per-dimension bounds.
    #[must_use]
    pub fn bounds(&self) -> &[(f64, f64)] {
        &self.bounds
    }

    /// `true` if `x` has the right length and every coordinate lies in its interval.
    #[must_use]
    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.bounds.len()
            && x.iter()
                .zip(&self.bounds)
                .all(|(&v, &(lo, hi))| (lo..=hi).contains(&v))
    }

    /// Clamp every coordinate of `x` into the domain.
    #[must_use]
    pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.bounds)
            .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
            .collect()
    }

    /// Map a point from the domain into the unit cube.
    #[must_use]
    pub fn normalize(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.bounds)
            .map(|(&v, &(lo, hi))| (v - lo) / (hi - lo))
            .collect()
    }

    /// Map a point from the unit cube back into the domain.
    #[must_use]
    pub fn denormalize(&self, u: &[f64]) -> Vec<f64> {
        u.iter()
            .zip(&self.bounds)
            .map(|(&v, &(lo, hi))| (lo + v * (hi - lo)).clamp(lo, hi))
            .collect()
    }

    /// Draw a point uniformly from the domain.
    pub(crate) fn sample_uniform(&self, rng: &mut fastrand::Rng) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|&(lo, hi)| rng_util::f64_range(rng, lo, hi))
            .collect()
    }

    pub(crate) fn check_point(&self, x: &[f64]) -> Result<()> {
        if x.len() == self.bounds.len() {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.bounds.len(),
                got: x.len(),
            })
        }
    }
}

/// How the exploration parameters are generated at session start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DesignStrategy {
    /// Independent uniform draws from the domain.
    Uniform {
        /// RNG seed; `None` draws a fresh seed.
        seed: Option<u64>,
    },
    /// Scrambled Sobol sequence (better space filling in low dimensions).
    #[cfg(feature = "sobol")]
    Sobol {
        /// Scrambling seed.
        seed: u32,
    },
}

impl Default for DesignStrategy {
    fn default() -> Self {
        Self::Uniform { seed: None }
    }
}

/// The list of parameters visited during exploration.
///
/// Fixed points, when given, replace the first generated entries; the
/// operator uses them to pin known-safe settings at the start of a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialDesign {
    /// Strategy for the generated points.
    pub strategy: DesignStrategy,
    /// Operator-chosen points visited first.
    pub fixed_points: Vec<Vec<f64>>,
}

impl InitialDesign {
    /// Generate `n_points` exploration parameters inside `domain`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if a fixed point has the wrong
    /// number of coordinates and [`Error::Configuration`] if it lies outside
    /// the domain.
    pub fn generate(&self, domain: &Domain, n_points: usize) -> Result<Vec<Vec<f64>>> {
        for p in &self.fixed_points {
            domain.check_point(p)?;
            if !domain.contains(p) {
                return Err(Error::Configuration(format!(
                    "initial point {p:?} lies outside the parameter range"
                )));
            }
        }

        let mut points = match &self.strategy {
            DesignStrategy::Uniform { seed } => {
                let mut rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
                (0..n_points)
                    .map(|_| domain.sample_uniform(&mut rng))
                    .collect::<Vec<_>>()
            }
            #[cfg(feature = "sobol")]
            DesignStrategy::Sobol { seed } => sobol_points(domain, n_points, *seed),
        };

        for (slot, fixed) in points.iter_mut().zip(&self.fixed_points) {
            slot.clone_from(fixed);
        }
        Ok(points)
    }
}

#[cfg(feature = "sobol")]
#[allow(clippy::cast_possible_truncation)]
fn sobol_points(domain: &Domain, n_points: usize, seed: u32) -> Vec<Vec<f64>> {
    (0..n_points)
        .map(|i| {
            let u: Vec<f64> = (0..domain.n_dims())
                .map(|d| f64::from(sobol_burley::sample(i as u32, d as u32, seed)))
                .collect();
            domain.denormalize(&u)
        })
        .collect()
}
