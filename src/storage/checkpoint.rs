//! Per-iteration checkpoints: `iter_<n>/model.json` + `iter_<n>/data.csv`.

use core::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::gp::ModelSnapshot;

const MODEL_FILE: &str = "model.json";
const DATA_FILE: &str = "data.csv";
const DIR_PREFIX: &str = "iter_";

/// Model hyperparameters plus the full observation history at iteration `n`.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    /// Number of observations the model was fitted on.
    pub iteration: usize,
    /// Learned hyperparameters and target scaling.
    pub model: ModelSnapshot,
    /// Parameter history, one row per observation.
    pub x: Vec<Vec<f64>>,
    /// Cost history (minimization scale).
    pub y: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct ModelFile {
    iteration: usize,
    model: ModelSnapshot,
}

impl Checkpoint {
    /// Write this checkpoint into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the directory or a file cannot be written.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| Error::Storage(e.to_string()))?;

        let blob = ModelFile {
            iteration: self.iteration,
            model: self.model.clone(),
        };
        let json =
            serde_json::to_string_pretty(&blob).map_err(|e| Error::Storage(e.to_string()))?;
        fs::write(dir.join(MODEL_FILE), json).map_err(|e| Error::Storage(e.to_string()))?;

        fs::write(dir.join(DATA_FILE), self.to_csv()).map_err(|e| Error::Storage(e.to_string()))
    }

    /// Read a checkpoint directory written by [`write_to`](Self::write_to).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if a file is missing or malformed,
    /// [`Error::DimensionMismatch`] if a CSV row disagrees with the model
    /// dimension and [`Error::Shape`] if the row count is not the iteration.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let json =
            fs::read_to_string(dir.join(MODEL_FILE)).map_err(|e| Error::Storage(e.to_string()))?;
        let blob: ModelFile =
            serde_json::from_str(&json).map_err(|e| Error::Storage(e.to_string()))?;

        let csv =
            fs::read_to_string(dir.join(DATA_FILE)).map_err(|e| Error::Storage(e.to_string()))?;
        let n_dims = blob.model.covariance.n_dims();
        let (x, y) = parse_csv(&csv, n_dims)?;
        if x.len() != blob.iteration {
            return Err(Error::Shape {
                x_rows: x.len(),
                y_rows: blob.iteration,
            });
        }

        Ok(Self {
            iteration: blob.iteration,
            model: blob.model,
            x,
            y,
        })
    }

    /// The history as plain `x_1,..,x_D,y` rows.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for (row, y) in self.x.iter().zip(&self.y) {
            for v in row {
                let _ = write!(out, "{v},");
            }
            let _ = writeln!(out, "{y}");
        }
        out
    }
}

fn parse_csv(csv: &str, n_dims: usize) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (line_no, line) in csv.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let values = line
            .split(',')
            .map(|field| field.trim().parse::<f64>())
            .collect::<core::result::Result<Vec<f64>, _>>()
            .map_err(|e| Error::Storage(format!("data.csv line {}: {e}", line_no + 1)))?;
        if values.len() != n_dims + 1 {
            return Err(Error::DimensionMismatch {
                expected: n_dims + 1,
                got: values.len(),
            });
        }
        let (row, cost) = values.split_at(n_dims);
        x.push(row.to_vec());
        y.push(cost[0]);
    }
    Ok((x, y))
}

/// A session-scoped directory of checkpoints.
///
/// # Examples
///
/// ```no_run
/// use hil_optimizer::storage::CheckpointStore;
///
/// let store = CheckpointStore::new("tmp_data/");
/// if let Some(latest) = store.latest().unwrap() {
///     println!("resuming at iteration {}", latest.iteration);
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    /// Creates a store rooted at `root`. Nothing is touched on disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory that holds the checkpoint for `iteration`.
    #[must_use]
    pub fn dir_for(&self, iteration: usize) -> PathBuf {
        self.root.join(format!("{DIR_PREFIX}{iteration}"))
    }

    /// Persist `checkpoint` under `iter_<iteration>/` and return that directory.
    ///
    /// Checkpoints are never rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if `iter_<iteration>/` already exists or
    /// writing fails.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let dir = self.dir_for(checkpoint.iteration);
        if dir.exists() {
            return Err(Error::Storage(format!(
                "checkpoint {} already exists",
                dir.display()
            )));
        }
        checkpoint.write_to(&dir)?;
        Ok(dir)
    }

    /// Iterations with a checkpoint directory, ascending.
    ///
    /// A missing root is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the root exists but cannot be listed.
    pub fn iterations(&self) -> Result<Vec<usize>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Storage(e.to_string())),
        };

        let mut iterations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Storage(e.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(n) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(DIR_PREFIX))
                .and_then(|n| n.parse::<usize>().ok())
            {
                iterations.push(n);
            }
        }
        iterations.sort_unstable();
        Ok(iterations)
    }

    /// Load the checkpoint with the highest iteration, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if listing or loading fails.
    pub fn latest(&self) -> Result<Option<Checkpoint>> {
        match self.iterations()?.last() {
            Some(&n) => Checkpoint::load(self.dir_for(n)).map(Some),
            None => Ok(None),
        }
    }
}
