//! JSONL journal of accepted observations.
//!
//! The journal follows its file like a tail: it remembers the byte offset
//! it has read up to, and both [`refresh`](ObservationJournal::refresh) and
//! [`append`](ObservationJournal::append) first pick up whatever other
//! writers added past that offset. A trailing line without its newline is
//! left for the next read.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;

use super::Observation;
use crate::error::{Error, Result};

/// An append-only file of accepted observations, one JSON object per line.
///
/// Writes hold an exclusive file lock and reads a shared one, so a
/// plotting process can follow the file while the session runs.
///
/// # Examples
///
/// ```no_run
/// use hil_optimizer::storage::{Observation, ObservationJournal};
///
/// let journal = ObservationJournal::open("session.jsonl").unwrap();
/// journal
///     .append(&Observation { parameter: vec![35.0], cost: -4.2 })
///     .unwrap();
/// ```
pub struct ObservationJournal {
    path: PathBuf,
    tail: Mutex<Tail>,
}

/// What has been read from the file so far.
#[derive(Default)]
struct Tail {
    records: Vec<Observation>,
    offset: u64,
}

/// Holds an `fs2` lock on a file until dropped.
struct Held<'a>(&'a File);

impl<'a> Held<'a> {
    fn exclusive(file: &'a File) -> Result<Self> {
        file.lock_exclusive().map_err(storage)?;
        Ok(Self(file))
    }

    fn shared(file: &'a File) -> Result<Self> {
        file.lock_shared().map_err(storage)?;
        Ok(Self(file))
    }
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

impl ObservationJournal {
    /// Open a journal at `path`, loading any records already in it.
    ///
    /// A missing file is an empty journal; it is created on the first
    /// [`append`](Self::append).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let journal = Self {
            path: path.as_ref().to_path_buf(),
            tail: Mutex::new(Tail::default()),
        };
        journal.refresh()?;
        Ok(journal)
    }

    /// The journal file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one observation.
    ///
    /// Records other writers added since the last read are loaded first,
    /// so the in-memory copy keeps the file's order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be read or written. The
    /// new observation is not recorded in memory in that case.
    pub fn append(&self, observation: &Observation) -> Result<()> {
        let mut line = serde_json::to_string(observation).map_err(storage)?;
        line.push('\n');

        let mut tail = self.tail.lock();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(storage)?;
        let held = Held::exclusive(&file)?;

        self.catch_up(&file, &mut tail)?;
        let mut writer = &file;
        writer.write_all(line.as_bytes()).map_err(storage)?;
        writer.flush().map_err(storage)?;
        tail.offset = writer.stream_position().map_err(storage)?;
        drop(held);

        tail.records.push(observation.clone());
        Ok(())
    }

    /// Load records appended by another writer.
    ///
    /// Returns `true` if any were found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be read or a complete
    /// line does not parse.
    pub fn refresh(&self) -> Result<bool> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(storage(e)),
        };
        let mut tail = self.tail.lock();
        let held = Held::shared(&file)?;
        let added = self.catch_up(&file, &mut tail)?;
        drop(held);
        Ok(added > 0)
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<Observation> {
        self.tail.lock().records.clone()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tail.lock().records.len()
    }

    /// `true` if the journal holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tail.lock().records.is_empty()
    }

    /// Parse complete lines past `tail.offset`; returns how many records
    /// were added.
    fn catch_up(&self, file: &File, tail: &mut Tail) -> Result<usize> {
        let mut handle = file;
        handle.seek(SeekFrom::Start(tail.offset)).map_err(storage)?;
        let mut reader = BufReader::new(handle);
        let mut line = String::new();
        let mut added = 0;
        loop {
            line.clear();
            let read = reader.read_line(&mut line).map_err(storage)?;
            if read == 0 || !line.ends_with('\n') {
                return Ok(added);
            }
            let text = line.trim();
            if !text.is_empty() {
                let record = serde_json::from_str(text).map_err(|e| {
                    Error::Storage(format!(
                        "{} at byte {}: {e}",
                        self.path.display(),
                        tail.offset
                    ))
                })?;
                tail.records.push(record);
                added += 1;
            }
            tail.offset += read as u64;
        }
    }
}

impl core::fmt::Debug for ObservationJournal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let tail = self.tail.lock();
        f.debug_struct("ObservationJournal")
            .field("path", &self.path)
            .field("len", &tail.records.len())
            .field("offset", &tail.offset)
            .finish()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn storage(e: impl ToString) -> Error {
    Error::Storage(e.to_string())
}
