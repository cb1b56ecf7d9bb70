use core::fmt;

/// Errors returned by the optimizer, the surrogate model and the
/// human-in-the-loop session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the lower bound is greater than (or equal to) the upper bound.
    #[error("invalid bounds: low ({low}) must be less than high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when a configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Returned when the requested cost channel is not being published.
    #[error("cost channel '{name}' not found (cost-like channels: {candidates:?})")]
    ChannelNotFound {
        /// The channel name that was requested.
        name: String,
        /// Advertised channels whose name looks like a cost stream.
        candidates: Vec<String>,
    },

    /// Returned when the Gaussian Process could not be fitted.
    #[error("GP fit failed: {0}")]
    Fit(FitFailure),

    /// Returned when the acquisition function cannot be optimized.
    #[error("acquisition failed: {0}")]
    Acquisition(String),

    /// Returned when the observation arrays disagree in length.
    #[error("shape mismatch: x has {x_rows} rows but y has {y_rows}")]
    Shape {
        /// Number of parameter rows.
        x_rows: usize,
        /// Number of cost rows.
        y_rows: usize,
    },

    /// Returned when a point has the wrong number of coordinates.
    #[error("dimension mismatch: expected {expected} coordinates, got {got}")]
    DimensionMismatch {
        /// The expected number of coordinates.
        expected: usize,
        /// The actual number of coordinates.
        got: usize,
    },

    /// Returned when the operator prompt cannot be read or written.
    #[error("operator prompt failed: {0}")]
    Prompt(String),

    /// Returned when a checkpoint or journal operation fails.
    #[error("storage error: {0}")]
    Storage(String),

    /// Returned when an async task fails.
    #[cfg(feature = "async")]
    #[error("async task error: {0}")]
    TaskError(String),
}

impl Error {
    /// `true` for errors raised while validating bounds or configuration.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidBounds { .. } | Self::Configuration(_))
    }

    /// `true` for shape and dimension mismatches.
    #[must_use]
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. } | Self::DimensionMismatch { .. })
    }

    /// `true` if the error came from fitting the surrogate.
    ///
    /// Fit failures are per-tick: the session keeps running and retries.
    #[must_use]
    pub fn is_fit(&self) -> bool {
        matches!(self, Self::Fit(_))
    }
}

/// Why a Gaussian Process fit failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitFailure {
    /// Fewer than two observations; kernel hyperparameters are undetermined.
    InsufficientData {
        /// Number of observations that were supplied.
        n: usize,
    },
    /// The marginal likelihood or its gradient became NaN or infinite.
    NonFinite {
        /// Optimizer iteration at which divergence was detected.
        iteration: usize,
    },
    /// The kernel matrix stayed indefinite even with maximal jitter.
    NotPositiveDefinite,
}

impl fmt::Display for FitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData { n } => {
                write!(f, "need at least 2 observations, got {n}")
            }
            Self::NonFinite { iteration } => {
                write!(f, "marginal likelihood diverged at iteration {iteration}")
            }
            Self::NotPositiveDefinite => write!(f, "kernel matrix is not positive definite"),
        }
    }
}

impl From<FitFailure> for Error {
    fn from(failure: FitFailure) -> Self {
        Error::Fit(failure)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
