//! On-disk persistence for a session.
//!
//! # Available backends
//!
//! | Backend | Description | Feature flag |
//! |---------|-------------|-------------|
//! | [`CheckpointStore`] | One `iter_<n>/` directory per engine step with `model.json` and `data.csv` | always |
//! | `ObservationJournal` | JSONL file of accepted observations with `fs2` file locking | `journal` |
//!
//! Checkpoints are append-only: a directory is written once per iteration
//! and never deleted, so the directory tree is the history of the session.

mod checkpoint;
#[cfg(feature = "journal")]
mod journal;

pub use checkpoint::{Checkpoint, CheckpointStore};
#[cfg(feature = "journal")]
pub use journal::ObservationJournal;
use serde::{Deserialize, Serialize};

/// One accepted `(parameter, cost)` pair.
///
/// The cost is on the minimization scale (already negated at ingestion).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// The parameter the cost was measured under.
    pub parameter: Vec<f64>,
    /// The accepted window cost.
    pub cost: f64,
}
