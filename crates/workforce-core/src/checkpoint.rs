//! Year checkpoints.
//!
//! A checkpoint captures everything a completed year committed: the year's
//! event partition, the accumulator records, the snapshot and a SHA-256
//! digest of each, plus the fingerprint of the configuration that produced
//! them. A checkpoint whose digests do not match its contents, or whose
//! fingerprint differs from the running configuration, is not trusted.
//!
//! Stores write a checkpoint as a whole or not at all. The file store
//! writes to a temporary file and renames it into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use workforce_events::Snapshot;
use workforce_events::digest::canonical_digest;
use workforce_types::{AccumulatorRecord, EmployeeId, Event};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by checkpoint capture, verification or storage.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Filesystem access failed.
    #[error("checkpoint I/O failed for {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A checkpoint file could not be parsed.
    #[error("checkpoint {path} is not valid JSON: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// Serialization failed while computing a digest or encoding.
    #[error("checkpoint serialization failed: {message}")]
    Serialization {
        /// Underlying serializer message.
        message: String,
    },

    /// A stored digest does not match the stored contents.
    #[error("checkpoint {year}: {what} digest mismatch")]
    DigestMismatch {
        /// Checkpoint year.
        year: i32,
        /// Which section failed.
        what: &'static str,
    },

    /// The checkpoint was produced by a different configuration.
    #[error("checkpoint {year} was produced by configuration {found}, running {expected}")]
    FingerprintMismatch {
        /// Checkpoint year.
        year: i32,
        /// Fingerprint of the running configuration.
        expected: String,
        /// Fingerprint stored in the checkpoint.
        found: String,
    },

    /// A store returned a checkpoint for a different year.
    #[error("requested checkpoint {requested}, store returned {found}")]
    YearMismatch {
        /// Year asked for.
        requested: i32,
        /// Year in the returned checkpoint.
        found: i32,
    },
}

impl CheckpointError {
    /// Whether the failure is transient storage trouble.
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

fn digest_of<T: Serialize + ?Sized>(value: &T) -> Result<String, CheckpointError> {
    canonical_digest(value).map_err(|e| CheckpointError::Serialization {
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Durable record of one completed year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCheckpoint {
    /// Completed year.
    pub year: i32,
    /// Fingerprint of the configuration that produced the year.
    pub config_fingerprint: String,
    /// The year's event partition in sequence order.
    pub events: Vec<Event>,
    /// Accumulator records for the year in identifier order.
    pub accumulator: Vec<AccumulatorRecord>,
    /// End-of-year snapshot.
    pub snapshot: Snapshot,
    /// Digest of `events`.
    pub events_digest: String,
    /// Digest of `accumulator`.
    pub accumulator_digest: String,
    /// Digest of `snapshot`.
    pub snapshot_digest: String,
}

impl YearCheckpoint {
    /// Capture a completed year and digest its contents.
    pub fn capture(
        year: i32,
        config_fingerprint: String,
        events: Vec<Event>,
        records: &BTreeMap<EmployeeId, AccumulatorRecord>,
        snapshot: Snapshot,
    ) -> Result<Self, CheckpointError> {
        let accumulator: Vec<AccumulatorRecord> = records.values().cloned().collect();
        Ok(Self {
            year,
            config_fingerprint,
            events_digest: digest_of(events.as_slice())?,
            accumulator_digest: digest_of(accumulator.as_slice())?,
            snapshot_digest: digest_of(&snapshot)?,
            events,
            accumulator,
            snapshot,
        })
    }

    /// Recompute every digest and compare the fingerprint.
    pub fn verify(&self, expected_fingerprint: &str) -> Result<(), CheckpointError> {
        if self.config_fingerprint != expected_fingerprint {
            return Err(CheckpointError::FingerprintMismatch {
                year: self.year,
                expected: expected_fingerprint.to_owned(),
                found: self.config_fingerprint.clone(),
            });
        }
        let mismatch = |what| CheckpointError::DigestMismatch {
            year: self.year,
            what,
        };
        if digest_of(self.events.as_slice())? != self.events_digest {
            return Err(mismatch("events"));
        }
        if digest_of(self.accumulator.as_slice())? != self.accumulator_digest {
            return Err(mismatch("accumulator"));
        }
        if digest_of(&self.snapshot)? != self.snapshot_digest {
            return Err(mismatch("snapshot"));
        }
        let foreign_event = self.events.iter().any(|e| e.simulation_year != self.year);
        if self.snapshot.year != self.year || foreign_event {
            return Err(mismatch("year"));
        }
        Ok(())
    }

    /// Accumulator records keyed by employee.
    pub fn records(&self) -> BTreeMap<EmployeeId, AccumulatorRecord> {
        self.accumulator
            .iter()
            .map(|record| (record.employee_id.clone(), record.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Durable storage for year checkpoints.
pub trait CheckpointStore: Send {
    /// Store a checkpoint, replacing any earlier one for the same year.
    fn save(&mut self, checkpoint: &YearCheckpoint) -> Result<(), CheckpointError>;

    /// Load the checkpoint for `year`, if one exists.
    fn load(&self, year: i32) -> Result<Option<YearCheckpoint>, CheckpointError>;

    /// Years with a stored checkpoint, ascending.
    fn years(&self) -> Result<Vec<i32>, CheckpointError>;
}

/// In-memory checkpoint store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: BTreeMap<i32, YearCheckpoint>,
}

impl MemoryCheckpointStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self {
            checkpoints: BTreeMap::new(),
        }
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&mut self, checkpoint: &YearCheckpoint) -> Result<(), CheckpointError> {
        self.checkpoints.insert(checkpoint.year, checkpoint.clone());
        Ok(())
    }

    fn load(&self, year: i32) -> Result<Option<YearCheckpoint>, CheckpointError> {
        Ok(self.checkpoints.get(&year).cloned())
    }

    fn years(&self) -> Result<Vec<i32>, CheckpointError> {
        Ok(self.checkpoints.keys().copied().collect())
    }
}

/// Checkpoint store writing one JSON file per year.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a checkpoint directory.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|source| CheckpointError::Io {
            path: directory.clone(),
            source,
        })?;
        Ok(Self { directory })
    }

    /// Directory holding the checkpoint files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the checkpoint file for `year`.
    pub fn path_for(&self, year: i32) -> PathBuf {
        self.directory.join(format!("year-{year}.json"))
    }
}

fn year_from_file_name(name: &str) -> Option<i32> {
    name.strip_prefix("year-")?.strip_suffix(".json")?.parse().ok()
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&mut self, checkpoint: &YearCheckpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(checkpoint.year);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(checkpoint).map_err(|e| CheckpointError::Serialization {
            message: e.to_string(),
        })?;
        std::fs::write(&tmp, bytes).map_err(|source| CheckpointError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| CheckpointError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(year = checkpoint.year, path = %path.display(), "checkpoint written");
        Ok(())
    }

    fn load(&self, year: i32) -> Result<Option<YearCheckpoint>, CheckpointError> {
        let path = self.path_for(year);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CheckpointError::Io { path, source }),
        };
        let checkpoint: YearCheckpoint = serde_json::from_slice(&bytes)
            .map_err(|source| CheckpointError::Json {
                path: path.clone(),
                source,
            })?;
        if checkpoint.year != year {
            return Err(CheckpointError::YearMismatch {
                requested: year,
                found: checkpoint.year,
            });
        }
        Ok(Some(checkpoint))
    }

    fn years(&self) -> Result<Vec<i32>, CheckpointError> {
        let entries = std::fs::read_dir(&self.directory).map_err(|source| CheckpointError::Io {
            path: self.directory.clone(),
            source,
        })?;
        let mut years = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CheckpointError::Io {
                path: self.directory.clone(),
                source,
            })?;
            if let Some(year) = entry.file_name().to_str().and_then(year_from_file_name) {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }
}
