//! Gaussian observation-noise model with a bounded noise variance.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kernel::{Hyperparameter, Interval};

/// Default noise-variance interval.
pub const DEFAULT_NOISE_BOUNDS: (f64, f64) = (0.005, 10.0);

/// Homoscedastic Gaussian likelihood, `y = f(x) + ε`, `ε ~ N(0, σₙ²)`.
///
/// The noise variance is a bounded hyperparameter learned together with
/// the kernel. It is expressed on the standardized target scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianLikelihood {
    noise: Hyperparameter,
}

impl GaussianLikelihood {
    /// Creates a likelihood with noise variance bounded to `bounds`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`](crate::Error::InvalidBounds) for an
    /// empty, inverted or negative interval.
    pub fn new(bounds: (f64, f64)) -> Result<Self> {
        Ok(Self {
            noise: Hyperparameter::new(Interval::try_from(bounds)?),
        })
    }

    /// Current noise variance.
    #[must_use]
    pub fn noise(&self) -> f64 {
        self.noise.value()
    }

    /// The noise bounds.
    #[must_use]
    pub fn bounds(&self) -> Interval {
        self.noise.interval()
    }

    /// Mutable access to the noise hyperparameter.
    pub fn noise_param_mut(&mut self) -> &mut Hyperparameter {
        &mut self.noise
    }

    pub(crate) fn raw(&self) -> f64 {
        self.noise.raw()
    }

    pub(crate) fn set_raw(&mut self, raw: f64) {
        self.noise.set_raw(raw);
    }

    /// `d σₙ² / d raw`.
    pub(crate) fn slope(&self) -> f64 {
        self.noise.slope()
    }

    /// A fresh likelihood with the same bounds and factory noise.
    #[must_use]
    pub fn rebuilt(&self) -> Self {
        Self {
            noise: Hyperparameter::new(self.noise.interval()),
        }
    }
}

impl Default for GaussianLikelihood {
    fn default() -> Self {
        Self {
            noise: Hyperparameter::new(Interval::new_unchecked(
                DEFAULT_NOISE_BOUNDS.0,
                DEFAULT_NOISE_BOUNDS.1,
            )),
        }
    }
}
