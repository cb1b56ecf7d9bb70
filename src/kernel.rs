//! Covariance functions for the GP surrogate.
//!
//! Two kernel families are supported, both with one lengthscale per input
//! dimension (automatic relevance determination) and one output scale:
//!
//! | Family | Covariance |
//! |--------|------------|
//! | [`SquaredExponential`] | `σ² exp(-r²/2)` |
//! | [`Matern`] | `σ² (1 + √5 r + 5/3 r²) exp(-√5 r)` (ν = 5/2) |
//!
//! where `r = sqrt(Σ ((x1_i - x2_i) / l_i)²)`.
//!
//! Every hyperparameter is bounded to a closed [`Interval`]. Internally it is
//! stored as an unconstrained raw value mapped through a scaled sigmoid, so
//! gradient steps can never leave the interval. A kernel strategy remembers
//! its factory configuration: [`KernelStrategy::reset`] throws away whatever
//! the last fit learned and returns the factory state again.
//!
//! # Examples
//!
//! ```
//! use hil_optimizer::kernel::{KernelStrategy, SquaredExponential};
//!
//! let mut kernel = SquaredExponential::new(2, (0.0, 10.0), (0.0, 10.0)).unwrap();
//! let fresh = kernel.reset();
//! assert_eq!(fresh.lengthscales(), vec![5.0, 5.0]);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default interval for lengthscales and the output scale.
pub const DEFAULT_HYPER_BOUNDS: (f64, f64) = (0.0, 10.0);

/// Lengthscales are floored here to keep `r` finite when a bound starts at zero.
const MIN_LENGTHSCALE: f64 = 1e-6;

const SQRT_5: f64 = 2.236_067_977_499_79;

/// A closed, non-negative interval `[low, high]` with `low < high`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    low: f64,
    high: f64,
}

impl Interval {
    /// Creates a new interval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if the interval is empty, inverted,
    /// negative or non-finite.
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if low.is_finite() && high.is_finite() && low >= 0.0 && low < high {
            Ok(Self { low, high })
        } else {
            Err(Error::InvalidBounds { low, high })
        }
    }

    pub(crate) const fn new_unchecked(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Lower end.
    #[must_use]
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper end.
    #[must_use]
    pub fn high(&self) -> f64 {
        self.high
    }

    /// `true` if `v` lies inside the interval.
    #[must_use]
    pub fn contains(&self, v: f64) -> bool {
        (self.low..=self.high).contains(&v)
    }
}

impl TryFrom<(f64, f64)> for Interval {
    type Error = Error;

    fn try_from((low, high): (f64, f64)) -> Result<Self> {
        Self::new(low, high)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// A bounded hyperparameter: `value = low + (high - low) * sigmoid(raw)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameter {
    raw: f64,
    interval: Interval,
}

impl Hyperparameter {
    /// A hyperparameter at its factory state (the interval midpoint).
    #[must_use]
    pub fn new(interval: Interval) -> Self {
        Self { raw: 0.0, interval }
    }

    /// The constrained value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.interval.low + (self.interval.high - self.interval.low) * sigmoid(self.raw)
    }

    /// The unconstrained raw value the optimizer works on.
    #[must_use]
    pub fn raw(&self) -> f64 {
        self.raw
    }

    /// The interval this hyperparameter is bounded to.
    #[must_use]
    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub(crate) fn set_raw(&mut self, raw: f64) {
        self.raw = raw;
    }

    /// Set the constrained value; it is pulled strictly inside the interval.
    pub fn set_value(&mut self, value: f64) {
        let span = self.interval.high - self.interval.low;
        let p = ((value - self.interval.low) / span).clamp(1e-9, 1.0 - 1e-9);
        self.raw = (p / (1.0 - p)).ln();
    }

    /// `d value / d raw`.
    pub(crate) fn slope(&self) -> f64 {
        let s = sigmoid(self.raw);
        (self.interval.high - self.interval.low) * s * (1.0 - s)
    }
}

/// Base covariance family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelFamily {
    /// Squared exponential (RBF).
    #[default]
    SquaredExponential,
    /// Matérn with ν = 5/2.
    Matern,
}

impl KernelFamily {
    /// Build a kernel strategy of this family.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid bounds or `n_parms == 0`.
    pub fn strategy(
        self,
        n_parms: usize,
        lengthscale_bounds: (f64, f64),
        variance_bounds: (f64, f64),
    ) -> Result<Box<dyn KernelStrategy>> {
        Ok(match self {
            Self::SquaredExponential => Box::new(SquaredExponential::new(
                n_parms,
                lengthscale_bounds,
                variance_bounds,
            )?),
            Self::Matern => Box::new(Matern::new(n_parms, lengthscale_bounds, variance_bounds)?),
        })
    }
}

/// A complete covariance function: family plus bounded hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CovarianceConfig {
    family: KernelFamily,
    lengthscales: Vec<Hyperparameter>,
    outputscale: Hyperparameter,
}

/// Build a factory-state covariance configuration.
///
/// # Errors
///
/// Returns [`Error::InvalidBounds`] for an empty or inverted interval and
/// [`Error::Configuration`] if `n_parms` is zero.
pub fn configure(
    family: KernelFamily,
    n_parms: usize,
    lengthscale_bounds: (f64, f64),
    variance_bounds: (f64, f64),
) -> Result<CovarianceConfig> {
    if n_parms == 0 {
        return Err(Error::Configuration(
            "kernel needs at least one input dimension".into(),
        ));
    }
    let ls = Interval::try_from(lengthscale_bounds)?;
    let var = Interval::try_from(variance_bounds)?;
    Ok(CovarianceConfig {
        family,
        lengthscales: vec![Hyperparameter::new(ls); n_parms],
        outputscale: Hyperparameter::new(var),
    })
}

impl CovarianceConfig {
    /// The covariance family.
    #[must_use]
    pub fn family(&self) -> KernelFamily {
        self.family
    }

    /// Number of input dimensions.
    #[must_use]
    pub fn n_dims(&self) -> usize {
        self.lengthscales.len()
    }

    /// Current lengthscale values, one per dimension.
    #[must_use]
    pub fn lengthscales(&self) -> Vec<f64> {
        self.lengthscales.iter().map(Hyperparameter::value).collect()
    }

    /// Current output scale (signal variance).
    #[must_use]
    pub fn outputscale(&self) -> f64 {
        self.outputscale.value()
    }

    /// Mutable access to the lengthscale hyperparameters.
    pub fn lengthscale_params_mut(&mut self) -> &mut [Hyperparameter] {
        &mut self.lengthscales
    }

    /// Mutable access to the output-scale hyperparameter.
    pub fn outputscale_param_mut(&mut self) -> &mut Hyperparameter {
        &mut self.outputscale
    }

    /// Number of trainable hyperparameters (`n_dims + 1`).
    pub(crate) fn n_hyper(&self) -> usize {
        self.lengthscales.len() + 1
    }

    /// Raw hyperparameters in the order `[l_0, .., l_{d-1}, σ²]`.
    pub(crate) fn raw(&self) -> Vec<f64> {
        self.lengthscales
            .iter()
            .map(Hyperparameter::raw)
            .chain(core::iter::once(self.outputscale.raw()))
            .collect()
    }

    pub(crate) fn set_raw(&mut self, raw: &[f64]) {
        let d = self.lengthscales.len();
        for (h, &r) in self.lengthscales.iter_mut().zip(&raw[..d]) {
            h.set_raw(r);
        }
        self.outputscale.set_raw(raw[d]);
    }

    /// Evaluate `k(a, b)`.
    #[must_use]
    pub fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        let ls = self.lengthscales();
        let r_sq = scaled_sq_dist(a, b, &ls);
        self.outputscale() * self.shape(r_sq)
    }

    /// Evaluate `k(a, b)` and write `∂k/∂raw` for every hyperparameter into `grad`.
    pub(crate) fn eval_with_grad(&self, a: &[f64], b: &[f64], grad: &mut [f64]) -> f64 {
        let ls = self.lengthscales();
        let s = self.outputscale();
        let r_sq = scaled_sq_dist(a, b, &ls);
        let shape = self.shape(r_sq);

        // ∂k/∂l_i = s * g(r) * d_i² / l_i³, with g depending on the family.
        let g = match self.family {
            KernelFamily::SquaredExponential => shape,
            KernelFamily::Matern => {
                let r = r_sq.sqrt();
                5.0 / 3.0 * (1.0 + SQRT_5 * r) * (-SQRT_5 * r).exp()
            }
        };
        for (i, (h, &l)) in self.lengthscales.iter().zip(&ls).enumerate() {
            let d = a[i] - b[i];
            grad[i] = s * g * d * d / (l * l * l) * h.slope();
        }
        grad[ls.len()] = shape * self.outputscale.slope();
        s * shape
    }

    /// Unit-variance correlation as a function of the scaled squared distance.
    fn shape(&self, r_sq: f64) -> f64 {
        match self.family {
            KernelFamily::SquaredExponential => (-0.5 * r_sq).exp(),
            KernelFamily::Matern => {
                let r = r_sq.sqrt();
                (1.0 + SQRT_5 * r + 5.0 / 3.0 * r_sq) * (-SQRT_5 * r).exp()
            }
        }
    }
}

fn scaled_sq_dist(a: &[f64], b: &[f64], lengthscales: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .zip(lengthscales)
        .map(|((&x1, &x2), &l)| {
            let d = (x1 - x2) / l.max(MIN_LENGTHSCALE);
            d * d
        })
        .sum()
}

/// Produces and remembers the covariance configuration used by the surrogate.
///
/// The strategy holds two configurations: the factory state built from the
/// construction bounds, and the current state (possibly learned by a fit).
pub trait KernelStrategy: Send + Sync {
    /// The covariance family of this strategy.
    fn family(&self) -> KernelFamily;

    /// The current configuration (factory state or the last learned one).
    fn covariance(&self) -> &CovarianceConfig;

    /// Store hyperparameters learned by a fit so the next warm refit starts there.
    fn update(&mut self, learned: CovarianceConfig);

    /// Discard learned hyperparameters and return the factory configuration.
    fn reset(&mut self) -> CovarianceConfig;
}

#[derive(Clone, Debug)]
struct KernelState {
    factory: CovarianceConfig,
    current: CovarianceConfig,
}

impl KernelState {
    fn new(
        family: KernelFamily,
        n_parms: usize,
        lengthscale_bounds: (f64, f64),
        variance_bounds: (f64, f64),
    ) -> Result<Self> {
        let factory = configure(family, n_parms, lengthscale_bounds, variance_bounds)?;
        Ok(Self {
            current: factory.clone(),
            factory,
        })
    }

    fn update(&mut self, learned: CovarianceConfig) {
        if learned.family == self.factory.family && learned.n_dims() == self.factory.n_dims() {
            self.current = learned;
        }
    }

    fn reset(&mut self) -> CovarianceConfig {
        self.current = self.factory.clone();
        self.current.clone()
    }
}

/// Squared-exponential kernel strategy with ARD lengthscales.
#[derive(Clone, Debug)]
pub struct SquaredExponential {
    state: KernelState,
}

impl SquaredExponential {
    /// Creates a squared-exponential kernel over `n_parms` inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if either interval is empty or
    /// inverted, e.g. `(10.0, 0.0)`.
    pub fn new(
        n_parms: usize,
        lengthscale_bounds: (f64, f64),
        variance_bounds: (f64, f64),
    ) -> Result<Self> {
        Ok(Self {
            state: KernelState::new(
                KernelFamily::SquaredExponential,
                n_parms,
                lengthscale_bounds,
                variance_bounds,
            )?,
        })
    }

    /// Creates a kernel with the default `[0, 10]` bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `n_parms` is zero.
    pub fn with_default_bounds(n_parms: usize) -> Result<Self> {
        Self::new(n_parms, DEFAULT_HYPER_BOUNDS, DEFAULT_HYPER_BOUNDS)
    }
}

impl KernelStrategy for SquaredExponential {
    fn family(&self) -> KernelFamily {
        KernelFamily::SquaredExponential
    }

    fn covariance(&self) -> &CovarianceConfig {
        &self.state.current
    }

    fn update(&mut self, learned: CovarianceConfig) {
        self.state.update(learned);
    }

    fn reset(&mut self) -> CovarianceConfig {
        self.state.reset()
    }
}

/// Matérn 5/2 kernel strategy with ARD lengthscales.
#[derive(Clone, Debug)]
pub struct Matern {
    state: KernelState,
}

impl Matern {
    /// Creates a Matérn 5/2 kernel over `n_parms` inputs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if either interval is empty or inverted.
    pub fn new(
        n_parms: usize,
        lengthscale_bounds: (f64, f64),
        variance_bounds: (f64, f64),
    ) -> Result<Self> {
        Ok(Self {
            state: KernelState::new(
                KernelFamily::Matern,
                n_parms,
                lengthscale_bounds,
                variance_bounds,
            )?,
        })
    }

    /// Creates a kernel with the default `[0, 10]` bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `n_parms` is zero.
    pub fn with_default_bounds(n_parms: usize) -> Result<Self> {
        Self::new(n_parms, DEFAULT_HYPER_BOUNDS, DEFAULT_HYPER_BOUNDS)
    }
}

impl KernelStrategy for Matern {
    fn family(&self) -> KernelFamily {
        KernelFamily::Matern
    }

    fn covariance(&self) -> &CovarianceConfig {
        &self.state.current
    }

    fn update(&mut self, learned: CovarianceConfig) {
        self.state.update(learned);
    }

    fn reset(&mut self) -> CovarianceConfig {
        self.state.reset()
    }
}
