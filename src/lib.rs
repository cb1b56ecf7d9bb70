#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Human-in-the-loop Bayesian optimization of a physiological cost.
//!
//! A session proposes a control parameter, collects a window of cost
//! samples from a streaming collaborator, lets an operator accept or reject
//! the window, and uses a Gaussian Process surrogate to pick the next
//! parameter that minimizes the cost.
//!
//! # Getting Started
//!
//! Drive a whole session with a replayed cost stream and a scripted
//! operator:
//!
//! ```
//! use hil_optimizer::prelude::*;
//!
//! let config = HilConfig::builder()
//!     .range(vec![(0.0, 100.0)])
//!     .n_exploration(3)
//!     .n_steps(3)
//!     .dwell_time(0.0)
//!     .window_min_size(1)
//!     .without_checkpoints()
//!     .poll_interval(core::time::Duration::ZERO)
//!     .build()
//!     .unwrap();
//!
//! // Maximize-oriented readings; the session negates them once.
//! let cost = ReplayCostSource::from_values([5.0, 5.0, 3.0, 3.0, 7.0, 7.0], 0.0, 1.0);
//! let mut session = HilSession::new(
//!     config,
//!     cost,
//!     ScriptedDecisions::accept_all(),
//!     RecordingAnnouncer::new(),
//! )
//! .unwrap();
//!
//! let summary = session.run().unwrap();
//! assert_eq!(summary.history.len(), 3);
//! assert!(summary.final_proposal.is_some());
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`HilSession`](hil::HilSession) | The control loop: warm-up, exploration, confirmation, optimization. |
//! | [`Engine`](engine::Engine) | One fit → acquire → checkpoint step on the full history. |
//! | [`SurrogateModel`](gp::SurrogateModel) | Exact GP with bounded hyperparameters fitted by marginal likelihood. |
//! | [`KernelStrategy`](kernel::KernelStrategy) | Squared-exponential or Matérn 5/2 covariance with a factory reset. |
//! | [`AcquisitionOptimizer`](acquisition::AcquisitionOptimizer) | Multi-start maximization of EI or PI. |
//! | [`CostSource`](cost::CostSource) | Non-blocking reads of `(value, timestamp)` cost samples. |
//! | [`HumanDecision`](human::HumanDecision) | The operator's go-ahead and accept/reject verdicts. |
//! | [`CheckpointStore`](storage::CheckpointStore) | `iter_<n>/model.json` + `data.csv` per engine step. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `async` | `HilSession::run_async` on tokio | off |
//! | `journal` | `ObservationJournal`: a JSONL log of accepted observations with file locking | off |
//! | `sobol` | `DesignStrategy::Sobol` initial design | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at phase changes, decisions and engine steps | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

pub mod acquisition;
pub mod cost;
pub mod domain;
pub mod engine;
mod error;
pub mod gp;
pub mod hil;
pub mod human;
pub mod kernel;
pub mod likelihood;
mod rng_util;
pub mod storage;
pub mod stream;

pub use error::{Error, FitFailure, Result};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use hil_optimizer::prelude::*;
/// ```
pub mod prelude {
    pub use crate::acquisition::{AcquisitionOptimizer, Criterion, Proposal};
    pub use crate::cost::{ChannelCostSource, CostSample, CostSource, ReplayCostSource};
    pub use crate::domain::{DesignStrategy, Domain, InitialDesign};
    pub use crate::engine::{Engine, EngineConfig};
    pub use crate::error::{Error, FitFailure, Result};
    pub use crate::gp::{FittedModel, Prediction, SurrogateModel};
    pub use crate::hil::{
        Announcer, ChannelAnnouncer, HilConfig, HilSession, Observation, Phase,
        RecordingAnnouncer, SessionEvent, SessionSummary, TickOutcome,
    };
    pub use crate::human::{ConsoleDecision, Decision, HumanDecision, ScriptedDecisions};
    pub use crate::kernel::{KernelFamily, KernelStrategy, Matern, SquaredExponential};
    pub use crate::likelihood::GaussianLikelihood;
    #[cfg(feature = "journal")]
    pub use crate::storage::ObservationJournal;
    pub use crate::storage::{Checkpoint, CheckpointStore};
    pub use crate::stream::StreamHub;
}
