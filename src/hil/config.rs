use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acquisition::{AcquisitionOptimizer, Criterion};
use crate::domain::{DesignStrategy, InitialDesign};
use crate::engine::EngineConfig;
use crate::error::{Error, Result};
use crate::gp::FitOptions;
use crate::kernel::KernelFamily;

/// Default cost channel name.
pub const DEFAULT_COST_CHANNEL: &str = "Met_cost";
/// Default announcement channel name.
pub const DEFAULT_ANNOUNCE_CHANNEL: &str = "Change_parm";

/// Immutable settings of a human-in-the-loop session.
///
/// Build one with [`HilConfig::builder`]; `build()` validates every field,
/// so a constructed config is always consistent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HilConfig {
    /// Model, acquisition and checkpoint settings (includes the parameter range).
    pub engine: EngineConfig,
    /// Observations collected before the first GP fit.
    pub n_exploration: usize,
    /// Total observations after which the session is done.
    pub n_steps: usize,
    /// Number of exploration parameters generated at start.
    pub n_start_points: usize,
    /// How the exploration parameters are generated.
    pub initial_design: InitialDesign,
    /// Name of the channel carrying the cost.
    pub cost_channel_name: String,
    /// Unread cost samples kept by the inlet.
    pub cost_buffer_len: usize,
    /// Name of the channel parameter changes are announced on.
    pub announce_channel_name: String,
    /// Seconds a window must span before it can be judged.
    pub dwell_time: f64,
    /// A window must hold more than this many samples before it can be judged.
    pub window_min_size: usize,
    /// The window cost is the mean of its last `window_tail` samples.
    pub window_tail: usize,
    /// Sleep between control-loop ticks.
    pub poll_interval: Duration,
}

impl HilConfig {
    /// Creates a builder for configuring a `HilConfig`.
    #[must_use]
    pub fn builder() -> HilConfigBuilder {
        HilConfigBuilder::default()
    }

    /// Number of parameter dimensions.
    #[must_use]
    pub fn n_parms(&self) -> usize {
        self.engine.n_parms()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.n_exploration < 2 {
            return Err(Error::Configuration(format!(
                "n_exploration must be at least 2 to fit the first model, got {}",
                self.n_exploration
            )));
        }
        if self.n_exploration > self.n_steps {
            return Err(Error::Configuration(format!(
                "n_exploration ({}) must not exceed n_steps ({})",
                self.n_exploration, self.n_steps
            )));
        }
        if self.n_start_points < self.n_exploration {
            return Err(Error::Configuration(format!(
                "n_start_points ({}) must cover n_exploration ({})",
                self.n_start_points, self.n_exploration
            )));
        }
        if self.initial_design.fixed_points.len() > self.n_start_points {
            return Err(Error::Configuration(
                "more fixed initial points than start points".into(),
            ));
        }
        if self.window_tail == 0 {
            return Err(Error::Configuration("window_tail must be positive".into()));
        }
        if !(self.dwell_time.is_finite() && self.dwell_time >= 0.0) {
            return Err(Error::Configuration(format!(
                "dwell_time must be a non-negative number of seconds, got {}",
                self.dwell_time
            )));
        }
        if self.cost_buffer_len == 0 {
            return Err(Error::Configuration(
                "cost_buffer_len must be positive".into(),
            ));
        }
        if self.cost_channel_name.is_empty() || self.announce_channel_name.is_empty() {
            return Err(Error::Configuration("channel names must not be empty".into()));
        }
        Ok(())
    }
}

/// Builder for configuring a [`HilConfig`].
///
/// Defaults: three exploration points out of ten steps, a 120 s dwell time,
/// windows of more than five samples judged on their last five, a 1 s poll
/// interval, cost read from `Met_cost` and announcements on `Change_parm`.
///
/// # Examples
///
/// ```
/// use hil_optimizer::hil::HilConfig;
///
/// let config = HilConfig::builder()
///     .range(vec![(0.0, 100.0)])
///     .n_exploration(3)
///     .n_steps(12)
///     .fixed_initial_points(vec![vec![35.0], vec![75.0], vec![10.0]])
///     .dwell_time(30.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.n_start_points, 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HilConfigBuilder {
    engine: EngineConfigParts,
    n_exploration: Option<usize>,
    n_steps: Option<usize>,
    n_start_points: Option<usize>,
    design_strategy: Option<DesignStrategy>,
    fixed_points: Vec<Vec<f64>>,
    cost_channel_name: Option<String>,
    cost_buffer_len: Option<usize>,
    announce_channel_name: Option<String>,
    dwell_time: Option<f64>,
    window_min_size: Option<usize>,
    window_tail: Option<usize>,
    poll_interval: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
struct EngineConfigParts {
    range: Option<Vec<(f64, f64)>>,
    noise_range: Option<(f64, f64)>,
    kernel: Option<KernelFamily>,
    kernel_bounds: Option<((f64, f64), (f64, f64))>,
    criterion: Option<Criterion>,
    acquisition: Option<AcquisitionOptimizer>,
    fit: Option<FitOptions>,
    model_save_path: Option<Option<std::path::PathBuf>>,
}

impl HilConfigBuilder {
    /// Sets the per-dimension parameter range; its length is `n_parms`.
    #[must_use]
    pub fn range(mut self, range: Vec<(f64, f64)>) -> Self {
        self.engine.range = Some(range);
        self
    }

    /// Sets the noise-variance bounds.
    #[must_use]
    pub fn noise_range(mut self, low: f64, high: f64) -> Self {
        self.engine.noise_range = Some((low, high));
        self
    }

    /// Sets the kernel family.
    #[must_use]
    pub fn kernel(mut self, kernel: KernelFamily) -> Self {
        self.engine.kernel = Some(kernel);
        self
    }

    /// Sets the lengthscale and output-scale bounds.
    #[must_use]
    pub fn kernel_bounds(mut self, lengthscale: (f64, f64), variance: (f64, f64)) -> Self {
        self.engine.kernel_bounds = Some((lengthscale, variance));
        self
    }

    /// Sets the acquisition criterion.
    #[must_use]
    pub fn criterion(mut self, criterion: Criterion) -> Self {
        self.engine.criterion = Some(criterion);
        self
    }

    /// Sets the acquisition optimizer.
    #[must_use]
    pub fn acquisition(mut self, acquisition: AcquisitionOptimizer) -> Self {
        self.engine.acquisition = Some(acquisition);
        self
    }

    /// Sets the marginal-likelihood optimizer options.
    #[must_use]
    pub fn fit_options(mut self, fit: FitOptions) -> Self {
        self.engine.fit = Some(fit);
        self
    }

    /// Sets the checkpoint root directory.
    #[must_use]
    pub fn model_save_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.engine.model_save_path = Some(Some(path.into()));
        self
    }

    /// Disables checkpoint writes.
    #[must_use]
    pub fn without_checkpoints(mut self) -> Self {
        self.engine.model_save_path = Some(None);
        self
    }

    /// Sets the number of exploration observations.
    #[must_use]
    pub fn n_exploration(mut self, n: usize) -> Self {
        self.n_exploration = Some(n);
        self
    }

    /// Sets the total number of observations.
    #[must_use]
    pub fn n_steps(mut self, n: usize) -> Self {
        self.n_steps = Some(n);
        self
    }

    /// Sets the number of generated exploration parameters (defaults to `n_exploration`).
    #[must_use]
    pub fn n_start_points(mut self, n: usize) -> Self {
        self.n_start_points = Some(n);
        self
    }

    /// Sets how exploration parameters are generated.
    #[must_use]
    pub fn design_strategy(mut self, strategy: DesignStrategy) -> Self {
        self.design_strategy = Some(strategy);
        self
    }

    /// Pins the first exploration parameters.
    #[must_use]
    pub fn fixed_initial_points(mut self, points: Vec<Vec<f64>>) -> Self {
        self.fixed_points = points;
        self
    }

    /// Sets the cost channel name.
    #[must_use]
    pub fn cost_channel_name(mut self, name: impl Into<String>) -> Self {
        self.cost_channel_name = Some(name.into());
        self
    }

    /// Sets how many unread cost samples the inlet keeps.
    #[must_use]
    pub fn cost_buffer_len(mut self, n: usize) -> Self {
        self.cost_buffer_len = Some(n);
        self
    }

    /// Sets the announcement channel name.
    #[must_use]
    pub fn announce_channel_name(mut self, name: impl Into<String>) -> Self {
        self.announce_channel_name = Some(name.into());
        self
    }

    /// Sets the minimum window span in seconds.
    #[must_use]
    pub fn dwell_time(mut self, seconds: f64) -> Self {
        self.dwell_time = Some(seconds);
        self
    }

    /// Sets the sample count a window must exceed.
    #[must_use]
    pub fn window_min_size(mut self, n: usize) -> Self {
        self.window_min_size = Some(n);
        self
    }

    /// Sets how many trailing samples the window cost averages.
    #[must_use]
    pub fn window_tail(mut self, n: usize) -> Self {
        self.window_tail = Some(n);
        self
    }

    /// Sets the sleep between ticks.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any rule is violated: invalid
    /// bounds, `n_exploration < 2`, `n_exploration > n_steps`,
    /// `n_start_points < n_exploration`, a fixed point outside the range,
    /// `window_tail == 0` or a negative dwell time.
    pub fn build(self) -> Result<HilConfig> {
        let parts = self.engine;
        let mut engine = EngineConfig::builder();
        if let Some(range) = parts.range {
            engine = engine.range(range);
        }
        if let Some((low, high)) = parts.noise_range {
            engine = engine.noise_range(low, high);
        }
        if let Some(kernel) = parts.kernel {
            engine = engine.kernel(kernel);
        }
        if let Some((ls, var)) = parts.kernel_bounds {
            engine = engine.kernel_bounds(ls, var);
        }
        if let Some(criterion) = parts.criterion {
            engine = engine.criterion(criterion);
        }
        if let Some(acquisition) = parts.acquisition {
            engine = engine.acquisition(acquisition);
        }
        if let Some(fit) = parts.fit {
            engine = engine.fit_options(fit);
        }
        match parts.model_save_path {
            Some(Some(path)) => engine = engine.model_save_path(path),
            Some(None) => engine = engine.without_checkpoints(),
            None => {}
        }
        let engine = engine.build()?;

        let n_exploration = self.n_exploration.unwrap_or(3);
        let config = HilConfig {
            engine,
            n_exploration,
            n_steps: self.n_steps.unwrap_or(10),
            n_start_points: self.n_start_points.unwrap_or(n_exploration),
            initial_design: InitialDesign {
                strategy: self.design_strategy.unwrap_or_default(),
                fixed_points: self.fixed_points,
            },
            cost_channel_name: self
                .cost_channel_name
                .unwrap_or_else(|| DEFAULT_COST_CHANNEL.to_owned()),
            cost_buffer_len: self.cost_buffer_len.unwrap_or(2),
            announce_channel_name: self
                .announce_channel_name
                .unwrap_or_else(|| DEFAULT_ANNOUNCE_CHANNEL.to_owned()),
            dwell_time: self.dwell_time.unwrap_or(120.0),
            window_min_size: self.window_min_size.unwrap_or(5),
            window_tail: self.window_tail.unwrap_or(5),
            poll_interval: self.poll_interval.unwrap_or(Duration::from_secs(1)),
        };
        config.validate()?;

        let domain = crate::domain::Domain::new(config.engine.range.clone())?;
        for p in &config.initial_design.fixed_points {
            domain.check_point(p)?;
            if !domain.contains(p) {
                return Err(Error::Configuration(format!(
                    "initial point {p:?} lies outside the parameter range"
                )));
            }
        }
        Ok(config)
    }
}
