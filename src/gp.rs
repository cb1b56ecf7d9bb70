//! Gaussian Process surrogate model.
//!
//! The surrogate wraps a [`CovarianceConfig`], a [`GaussianLikelihood`] and
//! the observations it was fitted on.
//!
//! # Fitting
//!
//! 1. Inputs are mapped into the unit cube by the [`Domain`]; targets are
//!    standardized to zero mean and unit variance.
//! 2. The exact log marginal likelihood is maximized over the raw
//!    (unconstrained) kernel and noise hyperparameters with Adam, starting
//!    either from the supplied hyperparameters (warm start) or from the
//!    factory state (cold start).
//! 3. The best hyperparameters seen are used to build the final posterior
//!    through a Cholesky factorization of `K + σₙ²I`.
//!
//! A fit needs at least two observations; a diverging marginal likelihood
//! is reported as [`FitFailure::NonFinite`] rather than silently retried.

use nalgebra::{DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::{Error, FitFailure, Result};
use crate::kernel::CovarianceConfig;
use crate::likelihood::GaussianLikelihood;

/// Jitter levels tried, in order, when the kernel matrix is not positive definite.
const JITTER_LADDER: [f64; 4] = [0.0, 1e-8, 1e-6, 1e-4];

const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// Options for marginal-likelihood maximization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Maximum number of Adam iterations.
    pub max_iters: usize,
    /// Adam step size on the raw hyperparameters.
    pub learning_rate: f64,
    /// Stop once the relative change of the marginal likelihood falls below this.
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iters: 150,
            learning_rate: 0.1,
            tolerance: 1e-7,
        }
    }
}

/// An unfitted surrogate: kernel, likelihood and optimizer settings.
#[derive(Clone, Debug)]
pub struct SurrogateModel {
    /// The covariance function (starting point for the fit).
    pub covariance: CovarianceConfig,
    /// The noise model (starting point for the fit).
    pub likelihood: GaussianLikelihood,
    /// Marginal-likelihood optimizer settings.
    pub options: FitOptions,
}

impl SurrogateModel {
    /// Creates a surrogate with default fit options.
    #[must_use]
    pub fn new(covariance: CovarianceConfig, likelihood: GaussianLikelihood) -> Self {
        Self {
            covariance,
            likelihood,
            options: FitOptions::default(),
        }
    }

    /// Replace the fit options.
    #[must_use]
    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    /// Fit the GP to `N` observations `(x_i, y_i)`.
    ///
    /// With `warm_start = false` the hyperparameters start from their
    /// factory state; otherwise from the values held by `self`.
    ///
    /// # Errors
    ///
    /// - [`Error::Shape`] if `x` and `y` differ in length.
    /// - [`Error::DimensionMismatch`] if a row of `x` does not match the domain.
    /// - [`Error::Fit`] with [`FitFailure::InsufficientData`] when `N < 2`,
    ///   [`FitFailure::NonFinite`] when a target is not finite, the spread
    ///   of the targets overflows `f64`, or the optimization diverges, and
    ///   [`FitFailure::NotPositiveDefinite`] if no jitter level rescues the
    ///   factorization.
    pub fn fit(
        &self,
        domain: &Domain,
        x: &[Vec<f64>],
        y: &[f64],
        warm_start: bool,
    ) -> Result<FittedModel> {
        if x.len() != y.len() {
            return Err(Error::Shape {
                x_rows: x.len(),
                y_rows: y.len(),
            });
        }
        if y.len() < 2 {
            return Err(FitFailure::InsufficientData { n: y.len() }.into());
        }
        if self.covariance.n_dims() != domain.n_dims() {
            return Err(Error::DimensionMismatch {
                expected: domain.n_dims(),
                got: self.covariance.n_dims(),
            });
        }
        for row in x {
            domain.check_point(row)?;
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(FitFailure::NonFinite { iteration: 0 }.into());
        }

        let x_train: Vec<Vec<f64>> = x.iter().map(|row| domain.normalize(row)).collect();
        let (y_std_vec, y_mean, y_std) = standardize(y);
        if !y_std.is_finite() {
            return Err(FitFailure::NonFinite { iteration: 0 }.into());
        }

        let mut covariance = self.covariance.clone();
        let mut likelihood = self.likelihood.clone();
        let mut theta = covariance.raw();
        theta.push(likelihood.raw());
        if !warm_start {
            theta.iter_mut().for_each(|t| *t = 0.0);
        }

        let (theta, lml, n_iters) = maximize_marginal_likelihood(
            &mut covariance,
            &mut likelihood,
            &x_train,
            &y_std_vec,
            theta,
            &self.options,
        )?;
        apply_theta(&mut covariance, &mut likelihood, &theta);

        let cholesky = factorize(&covariance, &likelihood, &x_train)?;
        let alpha = cholesky.solve(&y_std_vec);

        trace_debug!(
            n = y.len(),
            n_iters,
            log_marginal_likelihood = lml,
            noise = likelihood.noise(),
            "GP fitted"
        );

        Ok(FittedModel {
            covariance,
            likelihood,
            domain: domain.clone(),
            x_train,
            y_mean,
            y_std,
            cholesky,
            alpha,
            log_marginal_likelihood: lml,
            n_iters,
        })
    }
}

/// Posterior at a single query point, in cost units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    /// Posterior mean of the latent cost.
    pub mean: f64,
    /// Posterior variance of the latent cost.
    pub variance: f64,
}

impl Prediction {
    /// Posterior standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance.max(0.0).sqrt()
    }

    /// `(lower, upper)` = mean ∓ two standard deviations.
    #[must_use]
    pub fn confidence_region(&self) -> (f64, f64) {
        let half = 2.0 * self.std_dev();
        (self.mean - half, self.mean + half)
    }
}

/// A GP conditioned on data, ready for posterior queries.
pub struct FittedModel {
    covariance: CovarianceConfig,
    likelihood: GaussianLikelihood,
    domain: Domain,
    /// Training inputs normalized to the unit cube.
    x_train: Vec<Vec<f64>>,
    y_mean: f64,
    y_std: f64,
    /// Cholesky factor of `K + σₙ²I`.
    cholesky: nalgebra::linalg::Cholesky<f64, Dyn>,
    /// `(K + σₙ²I)⁻¹ y` on the standardized scale.
    alpha: DVector<f64>,
    log_marginal_likelihood: f64,
    n_iters: usize,
}

impl core::fmt::Debug for FittedModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FittedModel")
            .field("covariance", &self.covariance)
            .field("likelihood", &self.likelihood)
            .field("n_train", &self.x_train.len())
            .field("log_marginal_likelihood", &self.log_marginal_likelihood)
            .finish_non_exhaustive()
    }
}

impl FittedModel {
    /// The learned covariance configuration.
    #[must_use]
    pub fn covariance(&self) -> &CovarianceConfig {
        &self.covariance
    }

    /// The learned noise model.
    #[must_use]
    pub fn likelihood(&self) -> &GaussianLikelihood {
        &self.likelihood
    }

    /// The domain the model was fitted over.
    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Number of training observations.
    #[must_use]
    pub fn n_train(&self) -> usize {
        self.x_train.len()
    }

    /// Log marginal likelihood of the standardized data at the learned hyperparameters.
    #[must_use]
    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }

    /// Number of optimizer iterations the fit used.
    #[must_use]
    pub fn n_iters(&self) -> usize {
        self.n_iters
    }

    /// Posterior mean and variance at `x` (parameter units).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `x` has the wrong length.
    pub fn predict(&self, x: &[f64]) -> Result<Prediction> {
        self.domain.check_point(x)?;
        let (mean, var) = self.predict_normalized(&self.domain.normalize(x));
        Ok(Prediction {
            mean: self.y_mean + self.y_std * mean,
            variance: var * self.y_std * self.y_std,
        })
    }

    /// Posterior predictions for several points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if any point has the wrong length.
    pub fn predict_many(&self, xs: &[Vec<f64>]) -> Result<Vec<Prediction>> {
        xs.iter().map(|x| self.predict(x)).collect()
    }

    /// Posterior `(mean, variance)` on the standardized scale at a unit-cube point.
    pub(crate) fn predict_normalized(&self, u: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_iterator(
            self.x_train.len(),
            self.x_train.iter().map(|xt| self.covariance.eval(u, xt)),
        );
        let mean = k_star.dot(&self.alpha);
        let v = self.cholesky.solve(&k_star);
        let var = (self.covariance.eval(u, u) - k_star.dot(&v)).max(0.0);
        (mean, var)
    }

    /// Factor mapping standardized-scale differences back to cost units.
    pub(crate) fn y_scale(&self) -> f64 {
        self.y_std
    }

    /// Smallest posterior mean over the training inputs (standardized scale).
    ///
    /// Used as the incumbent by the acquisition functions; it is robust to
    /// a single noisy low observation.
    pub(crate) fn incumbent(&self) -> f64 {
        self.x_train
            .iter()
            .map(|u| self.predict_normalized(u).0)
            .fold(f64::INFINITY, f64::min)
    }

    /// Serializable view of the learned state.
    #[must_use]
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            covariance: self.covariance.clone(),
            likelihood: self.likelihood.clone(),
            y_mean: self.y_mean,
            y_std: self.y_std,
            log_marginal_likelihood: self.log_marginal_likelihood,
            n_train: self.x_train.len(),
        }
    }
}

/// The hyperparameters and target scaling of a fitted model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Learned covariance configuration.
    pub covariance: CovarianceConfig,
    /// Learned noise model.
    pub likelihood: GaussianLikelihood,
    /// Mean subtracted from the targets.
    pub y_mean: f64,
    /// Scale the targets were divided by.
    pub y_std: f64,
    /// Log marginal likelihood at the learned hyperparameters.
    pub log_marginal_likelihood: f64,
    /// Number of training observations.
    pub n_train: usize,
}

/// Center and scale the targets.
///
/// Sums run on values divided by the largest magnitude, so targets near
/// `f64::MAX` stay finite. The returned scale is infinite only when the
/// spread itself is not representable.
#[allow(clippy::cast_precision_loss)]
fn standardize(y: &[f64]) -> (DVector<f64>, f64, f64) {
    let n = y.len() as f64;
    let magnitude = y.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if magnitude <= 0.0 {
        return (DVector::zeros(y.len()), 0.0, 1.0);
    }
    let unit: Vec<f64> = y.iter().map(|v| v / magnitude).collect();
    let unit_mean = unit.iter().sum::<f64>() / n;
    let unit_var =
        unit.iter().map(|u| (u - unit_mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    let unit_std = unit_var.sqrt();
    let (std, divisor) = if unit_std * magnitude > 1e-10 {
        (unit_std * magnitude, unit_std)
    } else {
        (1.0, magnitude.recip())
    };
    let out = DVector::from_iterator(y.len(), unit.iter().map(|u| (u - unit_mean) / divisor));
    (out, unit_mean * magnitude, std)
}

fn apply_theta(cov: &mut CovarianceConfig, lik: &mut GaussianLikelihood, theta: &[f64]) {
    let k = cov.n_hyper();
    cov.set_raw(&theta[..k]);
    lik.set_raw(theta[k]);
}

/// Factorize `K + σₙ²I`, climbing the jitter ladder on failure.
fn factorize(
    cov: &CovarianceConfig,
    lik: &GaussianLikelihood,
    x: &[Vec<f64>],
) -> Result<nalgebra::linalg::Cholesky<f64, Dyn>> {
    let n = x.len();
    let k = DMatrix::from_fn(n, n, |i, j| cov.eval(&x[i], &x[j]));
    cholesky_with_jitter(&k, lik.noise())
}

fn cholesky_with_jitter(
    k: &DMatrix<f64>,
    noise: f64,
) -> Result<nalgebra::linalg::Cholesky<f64, Dyn>> {
    for jitter in JITTER_LADDER {
        let mut kn = k.clone();
        for i in 0..kn.nrows() {
            kn[(i, i)] += noise + jitter;
        }
        if let Some(chol) = nalgebra::linalg::Cholesky::new(kn) {
            return Ok(chol);
        }
    }
    Err(FitFailure::NotPositiveDefinite.into())
}

/// Log marginal likelihood and its gradient w.r.t. `[kernel raw.., noise raw]`.
#[allow(clippy::cast_precision_loss)]
fn lml_and_grad(
    cov: &CovarianceConfig,
    lik: &GaussianLikelihood,
    x: &[Vec<f64>],
    y: &DVector<f64>,
) -> Result<(f64, Vec<f64>)> {
    let n = x.len();
    let n_k = cov.n_hyper();

    // dK/dθ_j for every kernel hyperparameter.
    let mut dk: Vec<DMatrix<f64>> = vec![DMatrix::zeros(n, n); n_k];
    let mut grad_buf = vec![0.0; n_k];
    let mut k = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..=i {
            let kij = cov.eval_with_grad(&x[i], &x[j], &mut grad_buf);
            k[(i, j)] = kij;
            k[(j, i)] = kij;
            for (m, g) in grad_buf.iter().enumerate() {
                dk[m][(i, j)] = *g;
                dk[m][(j, i)] = *g;
            }
        }
    }

    let chol = cholesky_with_jitter(&k, lik.noise())?;

    let alpha = chol.solve(y);
    let l = chol.l_dirty();
    let log_det_half: f64 = (0..n).map(|i| l[(i, i)].ln()).sum();
    let lml = -0.5 * y.dot(&alpha) - log_det_half - 0.5 * n as f64 * LN_2PI;

    // ∂lml/∂θ = ½ tr((ααᵀ - K⁻¹) ∂K/∂θ)
    let inner = &alpha * alpha.transpose() - chol.inverse();
    let mut grad: Vec<f64> = dk
        .iter()
        .map(|d| 0.5 * inner.component_mul(d).sum())
        .collect();
    grad.push(0.5 * inner.trace() * lik.slope());

    Ok((lml, grad))
}

/// Adam ascent on the raw hyperparameters. Returns the best `(θ, lml, iterations)`.
fn maximize_marginal_likelihood(
    cov: &mut CovarianceConfig,
    lik: &mut GaussianLikelihood,
    x: &[Vec<f64>],
    y: &DVector<f64>,
    mut theta: Vec<f64>,
    options: &FitOptions,
) -> Result<(Vec<f64>, f64, usize)> {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPS: f64 = 1e-8;

    let dim = theta.len();
    let mut m = vec![0.0; dim];
    let mut v = vec![0.0; dim];
    let mut best_theta = theta.clone();
    let mut best_lml = f64::NEG_INFINITY;
    let mut prev_lml = f64::NAN;
    let mut iters = 0;

    for t in 1..=options.max_iters.max(1) {
        iters = t;
        apply_theta(cov, lik, &theta);
        let (lml, grad) = lml_and_grad(cov, lik, x, y)?;
        if !lml.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return Err(FitFailure::NonFinite { iteration: t }.into());
        }
        if lml > best_lml {
            best_lml = lml;
            best_theta.clone_from(&theta);
        }
        if (lml - prev_lml).abs() <= options.tolerance * lml.abs().max(1.0) {
            break;
        }
        prev_lml = lml;

        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let (bc1, bc2) = (1.0 - BETA1.powi(t as i32), 1.0 - BETA2.powi(t as i32));
        for i in 0..dim {
            m[i] = BETA1 * m[i] + (1.0 - BETA1) * grad[i];
            v[i] = BETA2 * v[i] + (1.0 - BETA2) * grad[i] * grad[i];
            let m_hat = m[i] / bc1;
            let v_hat = v[i] / bc2;
            theta[i] += options.learning_rate * m_hat / (v_hat.sqrt() + EPS);
        }
    }

    Ok((best_theta, best_lml, iters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelFamily, configure};

    fn surrogate(family: KernelFamily) -> SurrogateModel {
        SurrogateModel::new(
            configure(family, 1, (0.0, 10.0), (0.0, 10.0)).unwrap(),
            GaussianLikelihood::new((0.005, 10.0)).unwrap(),
        )
    }

    fn toy_data() -> (Domain, Vec<Vec<f64>>, Vec<f64>) {
        let domain = Domain::new(vec![(0.0, 100.0)]).unwrap();
        let x: Vec<Vec<f64>> = [5.0, 20.0, 35.0, 50.0, 65.0, 80.0, 95.0]
            .iter()
            .map(|&v| vec![v])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| ((r[0] - 40.0) / 20.0).powi(2)).collect();
        (domain, x, y)
    }

    #[test]
    fn single_point_is_insufficient() {
        let domain = Domain::new(vec![(0.0, 1.0)]).unwrap();
        let err = surrogate(KernelFamily::SquaredExponential)
            .fit(&domain, &[vec![0.5]], &[1.0], false)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Fit(FitFailure::InsufficientData { n: 1 })
        ));
    }

    #[test]
    fn mismatched_lengths_are_a_shape_error() {
        let domain = Domain::new(vec![(0.0, 1.0)]).unwrap();
        let err = surrogate(KernelFamily::SquaredExponential)
            .fit(&domain, &[vec![0.5]], &[1.0, 2.0], false)
            .unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn non_finite_targets_are_a_fit_error() {
        let domain = Domain::new(vec![(0.0, 1.0)]).unwrap();
        let err = surrogate(KernelFamily::Matern)
            .fit(&domain, &[vec![0.1], vec![0.9]], &[1.0, f64::NAN], false)
            .unwrap_err();
        assert!(err.is_fit());
    }

    #[test]
    fn targets_near_the_float_limit_still_fit() {
        let domain = Domain::new(vec![(0.0, 1.0)]).unwrap();
        let y = [f64::MAX, 0.9 * f64::MAX, 0.95 * f64::MAX];
        let (z, mean, std) = standardize(&y);
        assert!(mean.is_finite() && std.is_finite());
        assert!(z.iter().all(|v| v.is_finite()));
        assert!(z.sum().abs() < 1e-9);

        let model = surrogate(KernelFamily::SquaredExponential)
            .fit(&domain, &[vec![0.1], vec![0.5], vec![0.9]], &y, false)
            .unwrap();
        assert!(model.snapshot().y_mean.is_finite());
    }

    #[test]
    fn unrepresentable_spread_is_a_fit_error() {
        let domain = Domain::new(vec![(0.0, 1.0)]).unwrap();
        let err = surrogate(KernelFamily::SquaredExponential)
            .fit(&domain, &[vec![0.1], vec![0.9]], &[f64::MAX, -f64::MAX], false)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Fit(FitFailure::NonFinite { iteration: 0 })
        ));
    }

    #[test]
    fn fit_improves_marginal_likelihood() {
        let (domain, x, y) = toy_data();
        let s = surrogate(KernelFamily::SquaredExponential);
        let model = s.fit(&domain, &x, &y, false).unwrap();

        let (y_std, _, _) = standardize(&y);
        let x_train: Vec<Vec<f64>> = x.iter().map(|r| domain.normalize(r)).collect();
        let (initial, _) = lml_and_grad(&s.covariance, &s.likelihood, &x_train, &y_std).unwrap();
        assert!(model.log_marginal_likelihood() >= initial);
        assert!(model.n_iters() >= 1);
    }

    #[test]
    fn posterior_interpolates_training_data() {
        let (domain, x, y) = toy_data();
        for family in [KernelFamily::SquaredExponential, KernelFamily::Matern] {
            let model = surrogate(family).fit(&domain, &x, &y, false).unwrap();
            for (xi, yi) in x.iter().zip(&y) {
                let p = model.predict(xi).unwrap();
                assert!(
                    (p.mean - yi).abs() < 1.0,
                    "{family:?} at {xi:?}: mean {} vs {yi}",
                    p.mean
                );
            }
        }
    }

    #[test]
    fn variance_grows_away_from_data() {
        let domain = Domain::new(vec![(0.0, 100.0)]).unwrap();
        let x = vec![vec![10.0], vec![15.0], vec![20.0]];
        let y = vec![1.0, 0.5, 1.2];
        let model = surrogate(KernelFamily::SquaredExponential)
            .fit(&domain, &x, &y, false)
            .unwrap();
        let near = model.predict(&[15.0]).unwrap();
        let far = model.predict(&[95.0]).unwrap();
        assert!(far.variance > near.variance);
        let (lo, hi) = far.confidence_region();
        assert!(lo < far.mean && far.mean < hi);
    }

    #[test]
    fn cold_fit_is_deterministic() {
        let (domain, x, y) = toy_data();
        let s = surrogate(KernelFamily::Matern);
        let a = s.fit(&domain, &x, &y, false).unwrap();
        let b = s.fit(&domain, &x, &y, false).unwrap();
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn cold_fit_ignores_supplied_hyperparameters() {
        let (domain, x, y) = toy_data();
        let base = surrogate(KernelFamily::SquaredExponential);
        let mut perturbed = base.clone();
        perturbed.covariance.lengthscale_params_mut()[0].set_value(0.01);
        let a = base.fit(&domain, &x, &y, false).unwrap();
        let b = perturbed.fit(&domain, &x, &y, false).unwrap();
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn learned_hyperparameters_respect_bounds() {
        let (domain, x, y) = toy_data();
        let model = surrogate(KernelFamily::SquaredExponential)
            .fit(&domain, &x, &y, false)
            .unwrap();
        let ls = model.covariance().lengthscales()[0];
        assert!(ls > 0.0 && ls < 10.0);
        let noise = model.likelihood().noise();
        assert!((0.005..=10.0).contains(&noise));
    }

    #[test]
    fn predict_rejects_wrong_dimension() {
        let (domain, x, y) = toy_data();
        let model = surrogate(KernelFamily::SquaredExponential)
            .fit(&domain, &x, &y, false)
            .unwrap();
        assert!(model.predict(&[1.0, 2.0]).unwrap_err().is_shape());
    }
}
