//! One Bayesian-optimization step: fit → acquire → checkpoint.
//!
//! The [`Engine`] owns the kernel strategy and the noise likelihood for the
//! whole session. Each call to [`Engine::run`] refits a GP to the complete
//! observation history, maximizes the acquisition criterion over the
//! domain, writes a checkpoint and returns the next parameter.
//!
//! `reload_hyper` selects how the fit starts:
//!
//! - `false`: the kernel is reset and the likelihood rebuilt from its
//!   bounds (cold refit). Two cold calls on the same data return the same
//!   proposal.
//! - `true`: the hyperparameters learned by the previous step are the
//!   starting point (warm refit).
//!
//! # Examples
//!
//! ```no_run
//! use hil_optimizer::engine::{Engine, EngineConfig};
//!
//! let config = EngineConfig::builder()
//!     .range(vec![(0.0, 100.0)])
//!     .model_save_path("tmp_data/")
//!     .build()
//!     .unwrap();
//! let mut engine = Engine::new(config).unwrap();
//!
//! let x = vec![vec![10.0], vec![20.0], vec![30.0]];
//! let y = vec![-5.0, -3.0, -7.0];
//! let next = engine.run(&x, &y, false).unwrap();
//! assert!((0.0..=100.0).contains(&next[0]));
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::acquisition::{AcquisitionOptimizer, Criterion, Proposal};
use crate::domain::Domain;
use crate::error::{Error, Result};
use crate::gp::{FitOptions, FittedModel, Prediction, SurrogateModel};
use crate::kernel::{DEFAULT_HYPER_BOUNDS, KernelFamily, KernelStrategy};
use crate::likelihood::{DEFAULT_NOISE_BOUNDS, GaussianLikelihood};
use crate::storage::{Checkpoint, CheckpointStore};

/// Default checkpoint root.
pub const DEFAULT_MODEL_SAVE_PATH: &str = "tmp_data/";

/// Immutable engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-dimension `(low, high)` parameter bounds.
    pub range: Vec<(f64, f64)>,
    /// Bounds on the Gaussian noise variance (standardized scale).
    pub noise_range: (f64, f64),
    /// Kernel family.
    pub kernel: KernelFamily,
    /// Bounds on every lengthscale.
    pub lengthscale_bounds: (f64, f64),
    /// Bounds on the output scale.
    pub variance_bounds: (f64, f64),
    /// Acquisition criterion.
    pub criterion: Criterion,
    /// Acquisition optimizer settings.
    pub acquisition: AcquisitionOptimizer,
    /// Marginal-likelihood optimizer settings.
    pub fit: FitOptions,
    /// Checkpoint root; `None` disables checkpoints.
    pub model_save_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Creates a builder for configuring an `EngineConfig`.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Number of parameter dimensions.
    #[must_use]
    pub fn n_parms(&self) -> usize {
        self.range.len()
    }

    fn validate(&self) -> Result<()> {
        if self.range.is_empty() {
            return Err(Error::Configuration(
                "at least one parameter dimension is required".into(),
            ));
        }
        Domain::new(self.range.clone())?;
        GaussianLikelihood::new(self.noise_range)?;
        self.kernel
            .strategy(self.range.len(), self.lengthscale_bounds, self.variance_bounds)?;
        Ok(())
    }
}

/// Builder for configuring an [`EngineConfig`].
///
/// Defaults: one dimension on `[0, 1]`, noise `[0.005, 10]`, squared
/// exponential kernel with `[0, 10]` bounds, expected improvement,
/// checkpoints under `tmp_data/`.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    range: Option<Vec<(f64, f64)>>,
    noise_range: Option<(f64, f64)>,
    kernel: Option<KernelFamily>,
    lengthscale_bounds: Option<(f64, f64)>,
    variance_bounds: Option<(f64, f64)>,
    criterion: Option<Criterion>,
    acquisition: Option<AcquisitionOptimizer>,
    fit: Option<FitOptions>,
    model_save_path: Option<Option<PathBuf>>,
}

impl EngineConfigBuilder {
    /// Sets the per-dimension parameter bounds.
    #[must_use]
    pub fn range(mut self, range: Vec<(f64, f64)>) -> Self {
        self.range = Some(range);
        self
    }

    /// Sets the noise-variance bounds.
    #[must_use]
    pub fn noise_range(mut self, low: f64, high: f64) -> Self {
        self.noise_range = Some((low, high));
        self
    }

    /// Sets the kernel family.
    #[must_use]
    pub fn kernel(mut self, kernel: KernelFamily) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Sets the lengthscale and output-scale bounds.
    #[must_use]
    pub fn kernel_bounds(mut self, lengthscale: (f64, f64), variance: (f64, f64)) -> Self {
        self.lengthscale_bounds = Some(lengthscale);
        self.variance_bounds = Some(variance);
        self
    }

    /// Sets the acquisition criterion.
    #[must_use]
    pub fn criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = Some(criterion);
        self
    }

    /// Sets the acquisition optimizer.
    #[must_use]
    pub fn acquisition(mut self, acquisition: AcquisitionOptimizer) -> Self {
        self.acquisition = Some(acquisition);
        self
    }

    /// Sets the marginal-likelihood optimizer options.
    #[must_use]
    pub fn fit_options(mut self, fit: FitOptions) -> Self {
        self.fit = Some(fit);
        self
    }

    /// Sets the checkpoint root directory.
    #[must_use]
    pub fn model_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_save_path = Some(Some(path.into()));
        self
    }

    /// Disables checkpoint writes.
    #[must_use]
    pub fn without_checkpoints(mut self) -> Self {
        self.model_save_path = Some(None);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty range or any invalid
    /// bound interval.
    pub fn build(self) -> Result<EngineConfig> {
        let config = EngineConfig {
            range: self.range.unwrap_or_else(|| vec![(0.0, 1.0)]),
            noise_range: self.noise_range.unwrap_or(DEFAULT_NOISE_BOUNDS),
            kernel: self.kernel.unwrap_or_default(),
            lengthscale_bounds: self.lengthscale_bounds.unwrap_or(DEFAULT_HYPER_BOUNDS),
            variance_bounds: self.variance_bounds.unwrap_or(DEFAULT_HYPER_BOUNDS),
            criterion: self.criterion.unwrap_or_default(),
            acquisition: self.acquisition.unwrap_or_default(),
            fit: self.fit.unwrap_or_default(),
            model_save_path: self
                .model_save_path
                .unwrap_or_else(|| Some(PathBuf::from(DEFAULT_MODEL_SAVE_PATH))),
        };
        config.validate()?;
        Ok(config)
    }
}

/// The Bayesian-optimization engine of a session.
pub struct Engine {
    config: EngineConfig,
    domain: Domain,
    kernel: Box<dyn KernelStrategy>,
    likelihood: GaussianLikelihood,
    store: Option<CheckpointStore>,
    last_model: Option<FittedModel>,
    last_proposal: Option<Proposal>,
    last_checkpoint: Option<Result<PathBuf>>,
}

impl Engine {
    /// Creates an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration is invalid.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let domain = Domain::new(config.range.clone())?;
        let kernel =
            config
                .kernel
                .strategy(config.n_parms(), config.lengthscale_bounds, config.variance_bounds)?;
        let likelihood = GaussianLikelihood::new(config.noise_range)?;
        let store = config.model_save_path.clone().map(CheckpointStore::new);
        Ok(Self {
            config,
            domain,
            kernel,
            likelihood,
            store,
            last_model: None,
            last_proposal: None,
            last_checkpoint: None,
        })
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The parameter domain.
    #[must_use]
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// The kernel strategy (current hyperparameters included).
    #[must_use]
    pub fn kernel(&self) -> &dyn KernelStrategy {
        self.kernel.as_ref()
    }

    /// The current noise model.
    #[must_use]
    pub fn likelihood(&self) -> &GaussianLikelihood {
        &self.likelihood
    }

    /// The checkpoint store, if checkpoints are enabled.
    #[must_use]
    pub fn checkpoint_store(&self) -> Option<&CheckpointStore> {
        self.store.as_ref()
    }

    /// Run one optimization step on the full history and return the next parameter.
    ///
    /// # Errors
    ///
    /// - [`Error::Shape`] if `x` and `y` differ in length or are empty.
    /// - [`Error::DimensionMismatch`] if a row of `x` does not match the domain.
    /// - [`Error::Fit`] if the GP cannot be fitted; the last model and
    ///   proposal are kept.
    /// - [`Error::Acquisition`] if the criterion cannot be maximized.
    ///
    /// A failed checkpoint write is not an error; see
    /// [`last_checkpoint`](Self::last_checkpoint).
    pub fn run(&mut self, x: &[Vec<f64>], y: &[f64], reload_hyper: bool) -> Result<Vec<f64>> {
        self.step(x, y, reload_hyper).map(|p| p.candidate)
    }

    /// Like [`run`](Self::run) but returns the full [`Proposal`].
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub fn step(&mut self, x: &[Vec<f64>], y: &[f64], reload_hyper: bool) -> Result<Proposal> {
        self.advance(x, y, reload_hyper, true)
    }

    /// Refit and propose without writing a checkpoint.
    ///
    /// Used when the history already has its checkpoint, as after a resume.
    pub(crate) fn run_unsaved(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        reload_hyper: bool,
    ) -> Result<Vec<f64>> {
        self.advance(x, y, reload_hyper, false)
            .map(|p| p.candidate)
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn advance(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        reload_hyper: bool,
        persist: bool,
    ) -> Result<Proposal> {
        if x.len() != y.len() || x.is_empty() {
            return Err(Error::Shape {
                x_rows: x.len(),
                y_rows: y.len(),
            });
        }

        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("bo_step", n = x.len(), reload_hyper).entered();

        let (covariance, likelihood) = if reload_hyper {
            (self.kernel.covariance().clone(), self.likelihood.clone())
        } else {
            (self.kernel.reset(), self.likelihood.rebuilt())
        };

        let model = SurrogateModel::new(covariance, likelihood)
            .with_options(self.config.fit.clone())
            .fit(&self.domain, x, y, reload_hyper)?;
        self.kernel.update(model.covariance().clone());
        self.likelihood = model.likelihood().clone();

        let proposal =
            self.config
                .acquisition
                .propose(&model, &self.domain, self.config.criterion)?;

        trace_info!(
            n = x.len(),
            value = proposal.value,
            fit_iters = model.n_iters(),
            log_marginal_likelihood = model.log_marginal_likelihood(),
            "proposal ready"
        );

        if persist && let Some(store) = &self.store {
            let checkpoint = Checkpoint {
                iteration: x.len(),
                model: model.snapshot(),
                x: x.to_vec(),
                y: y.to_vec(),
            };
            let saved = store.save(&checkpoint);
            match &saved {
                Ok(dir) => {
                    trace_debug!(dir = %dir.display(), "checkpoint written");
                }
                Err(err) => {
                    trace_warn!(error = %err, "checkpoint write failed");
                }
            }
            self.last_checkpoint = Some(saved);
        }

        self.last_model = Some(model);
        self.last_proposal = Some(proposal.clone());
        Ok(proposal)
    }

    /// The model fitted by the last successful step.
    #[must_use]
    pub fn last_model(&self) -> Option<&FittedModel> {
        self.last_model.as_ref()
    }

    /// The proposal returned by the last successful step.
    #[must_use]
    pub fn last_proposal(&self) -> Option<&Proposal> {
        self.last_proposal.as_ref()
    }

    /// Outcome of the last checkpoint write: the directory, or why it failed.
    #[must_use]
    pub fn last_checkpoint(&self) -> Option<&Result<PathBuf>> {
        self.last_checkpoint.as_ref()
    }

    /// Posterior at `x` under the last fitted model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Acquisition`] if no step has run yet and
    /// [`Error::DimensionMismatch`] for a wrongly sized point.
    pub fn predict(&self, x: &[f64]) -> Result<Prediction> {
        self.last_model
            .as_ref()
            .ok_or_else(|| Error::Acquisition("model has not been fit".into()))?
            .predict(x)
    }

    /// Load the hyperparameters saved in `checkpoint` so the next warm
    /// step starts from them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the checkpoint was written for a
    /// different kernel family or dimension.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let saved = &checkpoint.model.covariance;
        if saved.family() != self.kernel.family() || saved.n_dims() != self.domain.n_dims() {
            return Err(Error::Configuration(format!(
                "checkpoint holds a {:?} kernel over {} dimensions, engine expects {:?} over {}",
                saved.family(),
                saved.n_dims(),
                self.kernel.family(),
                self.domain.n_dims()
            )));
        }
        self.kernel.update(saved.clone());
        self.likelihood = checkpoint.model.likelihood.clone();
        trace_info!(iteration = checkpoint.iteration, "engine restored from checkpoint");
        Ok(())
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("kernel", &self.kernel.family())
            .field("likelihood", &self.likelihood)
            .field("last_proposal", &self.last_proposal)
            .finish_non_exhaustive()
    }
}
