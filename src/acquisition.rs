//! Acquisition functions and their multi-start maximization.
//!
//! Costs are minimized, so "improvement" means a posterior value below the
//! incumbent (the smallest posterior mean over the training inputs).
//!
//! | Criterion | Formula |
//! |-----------|---------|
//! | [`Criterion::ExpectedImprovement`] | `mean_j max(best - (μ + σ z_j), 0)` over fixed-seed `z_j ~ N(0,1)` |
//! | [`Criterion::ProbabilityOfImprovement`] | `Φ((best - μ) / σ)` |
//!
//! # Algorithm
//!
//! 1. Draw `n_raw_samples` points uniformly from the unit cube.
//! 2. Keep the `n_restarts` best as seeds.
//! 3. Refine each seed by projected gradient ascent (central finite
//!    differences, backtracking step size).
//! 4. Return the best refined point, mapped back into the domain.
//!
//! All randomness comes from one RNG seeded per call, so repeated calls on
//! an unchanged model return the same candidate.

use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::gp::FittedModel;
use crate::rng_util;

/// Default number of raw candidates.
pub const DEFAULT_RAW_SAMPLES: usize = 2000;
/// Default number of refined seeds.
pub const DEFAULT_RESTARTS: usize = 20;
/// Default number of Monte-Carlo base samples for EI.
pub const DEFAULT_MC_SAMPLES: usize = 200;
/// Default seed for the raw-sample and MC draws.
pub const DEFAULT_SEED: u64 = 1234;

const FD_STEP: f64 = 1e-4;
const MIN_STEP: f64 = 1e-6;

/// Acquisition criterion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Monte-Carlo expected improvement.
    #[default]
    ExpectedImprovement,
    /// Analytic probability of improvement.
    ProbabilityOfImprovement,
}

/// The next parameter to try and its acquisition value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Candidate in parameter units, inside the domain.
    pub candidate: Vec<f64>,
    /// Acquisition value at the candidate (EI in cost units, PI as a probability).
    pub value: f64,
}

/// Multi-start acquisition maximizer.
///
/// # Examples
///
/// ```
/// use hil_optimizer::acquisition::AcquisitionOptimizer;
///
/// let optimizer = AcquisitionOptimizer::builder()
///     .n_raw_samples(500)
///     .n_restarts(5)
///     .seed(7)
///     .build()
///     .unwrap();
/// assert_eq!(optimizer.seed(), 7);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionOptimizer {
    n_restarts: usize,
    n_raw_samples: usize,
    n_mc_samples: usize,
    seed: u64,
    refine_steps: usize,
    initial_step: f64,
}

impl Default for AcquisitionOptimizer {
    fn default() -> Self {
        Self {
            n_restarts: DEFAULT_RESTARTS,
            n_raw_samples: DEFAULT_RAW_SAMPLES,
            n_mc_samples: DEFAULT_MC_SAMPLES,
            seed: DEFAULT_SEED,
            refine_steps: 50,
            initial_step: 0.05,
        }
    }
}

impl AcquisitionOptimizer {
    /// Creates a builder for configuring an `AcquisitionOptimizer`.
    #[must_use]
    pub fn builder() -> AcquisitionOptimizerBuilder {
        AcquisitionOptimizerBuilder::default()
    }

    /// The RNG seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of refined seeds.
    #[must_use]
    pub fn n_restarts(&self) -> usize {
        self.n_restarts
    }

    /// Number of raw candidates.
    #[must_use]
    pub fn n_raw_samples(&self) -> usize {
        self.n_raw_samples
    }

    /// Find the point of `domain` maximizing `criterion` under `model`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Acquisition`] if the domain is empty or does not
    /// match the domain the model was fitted on.
    pub fn propose(
        &self,
        model: &FittedModel,
        domain: &Domain,
        criterion: Criterion,
    ) -> Result<Proposal> {
        if domain.is_empty() {
            return Err(Error::Acquisition("parameter domain is empty".into()));
        }
        if model.domain() != domain {
            return Err(Error::Acquisition(
                "model was fitted on a different domain".into(),
            ));
        }

        let mut rng = fastrand::Rng::with_seed(self.seed);
        let acq = Acquisition::new(model, criterion, self.n_mc_samples, &mut rng);
        let d = domain.n_dims();

        let mut raw: Vec<(Vec<f64>, f64)> = (0..self.n_raw_samples)
            .map(|_| {
                let u: Vec<f64> = (0..d).map(|_| rng_util::f64_range(&mut rng, 0.0, 1.0)).collect();
                let v = acq.value(&u);
                (u, v)
            })
            .collect();
        raw.sort_by(|a, b| b.1.total_cmp(&a.1));
        raw.truncate(self.n_restarts);

        let mut best: Option<(Vec<f64>, f64)> = None;
        for (seed_point, seed_value) in raw {
            let (u, v) = self.refine(&acq, seed_point, seed_value);
            if best.as_ref().is_none_or(|(_, bv)| v > *bv) {
                best = Some((u, v));
            }
        }

        let (u, value) =
            best.ok_or_else(|| Error::Acquisition("no candidate points were evaluated".into()))?;
        let value = match criterion {
            Criterion::ExpectedImprovement => value * model.y_scale(),
            Criterion::ProbabilityOfImprovement => value,
        };
        Ok(Proposal {
            candidate: domain.denormalize(&u),
            value,
        })
    }

    /// Projected gradient ascent with a backtracking step.
    fn refine(&self, acq: &Acquisition<'_>, mut u: Vec<f64>, mut value: f64) -> (Vec<f64>, f64) {
        let mut step = self.initial_step;
        for _ in 0..self.refine_steps {
            let grad = acq.gradient(&u);
            let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if norm < 1e-12 {
                break;
            }
            loop {
                let trial: Vec<f64> = u
                    .iter()
                    .zip(&grad)
                    .map(|(&ui, &gi)| (ui + step * gi / norm).clamp(0.0, 1.0))
                    .collect();
                let trial_value = acq.value(&trial);
                if trial_value > value {
                    u = trial;
                    value = trial_value;
                    break;
                }
                step *= 0.5;
                if step < MIN_STEP {
                    return (u, value);
                }
            }
        }
        (u, value)
    }
}

/// Builder for configuring an [`AcquisitionOptimizer`].
///
/// Defaults: 2000 raw samples, 20 restarts, 200 MC samples, seed 1234.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionOptimizerBuilder {
    n_restarts: Option<usize>,
    n_raw_samples: Option<usize>,
    n_mc_samples: Option<usize>,
    seed: Option<u64>,
    refine_steps: Option<usize>,
}

impl AcquisitionOptimizerBuilder {
    /// Sets the number of seeds refined by gradient ascent.
    #[must_use]
    pub fn n_restarts(mut self, n: usize) -> Self {
        self.n_restarts = Some(n);
        self
    }

    /// Sets the number of uniformly drawn raw candidates.
    #[must_use]
    pub fn n_raw_samples(mut self, n: usize) -> Self {
        self.n_raw_samples = Some(n);
        self
    }

    /// Sets the number of Monte-Carlo base samples used by EI.
    #[must_use]
    pub fn n_mc_samples(mut self, n: usize) -> Self {
        self.n_mc_samples = Some(n);
        self
    }

    /// Sets the RNG seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the maximum number of ascent steps per seed.
    #[must_use]
    pub fn refine_steps(mut self, n: usize) -> Self {
        self.refine_steps = Some(n);
        self
    }

    /// Builds the optimizer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any sample count is zero.
    pub fn build(self) -> Result<AcquisitionOptimizer> {
        let defaults = AcquisitionOptimizer::default();
        let optimizer = AcquisitionOptimizer {
            n_restarts: self.n_restarts.unwrap_or(defaults.n_restarts),
            n_raw_samples: self.n_raw_samples.unwrap_or(defaults.n_raw_samples),
            n_mc_samples: self.n_mc_samples.unwrap_or(defaults.n_mc_samples),
            seed: self.seed.unwrap_or(defaults.seed),
            refine_steps: self.refine_steps.unwrap_or(defaults.refine_steps),
            initial_step: defaults.initial_step,
        };
        if optimizer.n_restarts == 0 || optimizer.n_raw_samples == 0 || optimizer.n_mc_samples == 0
        {
            return Err(Error::Configuration(
                "acquisition restarts, raw samples and MC samples must be positive".into(),
            ));
        }
        Ok(optimizer)
    }
}

/// A criterion bound to a fitted model (standardized scale, unit-cube inputs).
struct Acquisition<'a> {
    model: &'a FittedModel,
    criterion: Criterion,
    best: f64,
    base_samples: Vec<f64>,
}

impl<'a> Acquisition<'a> {
    fn new(
        model: &'a FittedModel,
        criterion: Criterion,
        n_mc: usize,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let base_samples = match criterion {
            Criterion::ExpectedImprovement => {
                (0..n_mc).map(|_| rng_util::standard_normal(rng)).collect()
            }
            Criterion::ProbabilityOfImprovement => Vec::new(),
        };
        Self {
            model,
            criterion,
            best: model.incumbent(),
            base_samples,
        }
    }

    fn value(&self, u: &[f64]) -> f64 {
        let (mean, var) = self.model.predict_normalized(u);
        let std = var.sqrt();
        match self.criterion {
            Criterion::ExpectedImprovement => {
                mc_expected_improvement(mean, std, self.best, &self.base_samples)
            }
            Criterion::ProbabilityOfImprovement => {
                probability_of_improvement(mean, std, self.best)
            }
        }
    }

    fn gradient(&self, u: &[f64]) -> Vec<f64> {
        let mut shifted = u.to_vec();
        (0..u.len())
            .map(|i| {
                let hi = (u[i] + FD_STEP).min(1.0);
                let lo = (u[i] - FD_STEP).max(0.0);
                shifted[i] = hi;
                let f_hi = self.value(&shifted);
                shifted[i] = lo;
                let f_lo = self.value(&shifted);
                shifted[i] = u[i];
                (f_hi - f_lo) / (hi - lo)
            })
            .collect()
    }
}

/// Monte-Carlo expected improvement for minimization.
#[allow(clippy::cast_precision_loss)]
fn mc_expected_improvement(mean: f64, std: f64, best: f64, base_samples: &[f64]) -> f64 {
    if base_samples.is_empty() {
        return (best - mean).max(0.0);
    }
    let total: f64 = base_samples
        .iter()
        .map(|z| (best - (mean + std * z)).max(0.0))
        .sum();
    total / base_samples.len() as f64
}

/// Analytic probability of improvement for minimization.
fn probability_of_improvement(mean: f64, std: f64, best: f64) -> f64 {
    if std < 1e-12 {
        return if mean < best { 1.0 } else { 0.0 };
    }
    norm_cdf((best - mean) / std)
}

/// Standard normal PDF.
fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF (Hart rational approximation).
fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let abs_x = x.abs();
    let t = 1.0 / (1.0 + 0.231_641_9 * abs_x);
    let t2 = t * t;
    let t3 = t2 * t;
    let t4 = t3 * t;
    let t5 = t4 * t;

    let poly = 0.319_381_530 * t - 0.356_563_782 * t2 + 1.781_477_937 * t3 - 1.821_255_978 * t4
        + 1.330_274_429 * t5;
    let cdf = 1.0 - norm_pdf(abs_x) * poly;

    if x >= 0.0 { cdf } else { 1.0 - cdf }
}
