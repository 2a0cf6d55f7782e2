//! Cache state store
//!
//! Owns the two files a cache run lives in: the pending-work list (a JSON
//! array replaced atomically at init) and the metadata log (JSON Lines,
//! append-only). Status is derived from these files on every query, so a
//! run survives process restarts without any in-memory bookkeeping.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::CacheError;
use crate::extract::FieldMap;
use crate::remote::{MediaType, RemoteFile};

/// File holding the JSON array of files still to be processed
pub(crate) const PENDING_FILE: &str = "pending.json";
/// JSON Lines file accumulating one metadata record per processed file
pub(crate) const METADATA_FILE: &str = "metadata.jsonl";

/// Key inside `exifData` that marks a failed item
const ERROR_KEY: &str = "error";

/// One processed file in the metadata log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub path: String,
    pub media_type: MediaType,
    /// Extracted fields, or `{"error": ...}` when processing failed
    #[serde(default)]
    pub exif_data: FieldMap,
}

impl MetadataRecord {
    pub fn new(path: &str, media_type: MediaType, exif_data: FieldMap) -> Self {
        Self {
            path: path.to_string(),
            media_type,
            exif_data,
        }
    }

    /// Record for a file that could not be processed; the reason lands in
    /// the field map so the log keeps one line per attempted item.
    pub fn failed(path: &str, media_type: MediaType, message: &str) -> Self {
        let mut exif_data = FieldMap::new();
        exif_data.insert(ERROR_KEY.to_string(), message.into());
        Self {
            path: path.to_string(),
            media_type,
            exif_data,
        }
    }

    /// The recorded failure message, if this item failed
    pub fn error(&self) -> Option<&str> {
        self.exif_data.get(ERROR_KEY).and_then(Value::as_str)
    }
}

/// Overall run state derived from which files exist and how full they are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Idle,
    Caching,
    Finishing,
}

/// Snapshot of run progress
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub state: CacheState,
    pub processed: usize,
    pub total: usize,
}

/// Result of loading the pending-work list
#[derive(Debug)]
pub enum PendingList {
    /// No run in progress
    Missing,
    /// A legacy-format list that must be discarded before any new work
    Obsolete,
    /// The ordered work items of the current run
    Ready(Vec<RemoteFile>),
}

/// Durable store rooted at a single cache directory
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open a store rooted at the given directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Platform cache directory fallback used when no root is configured
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("gallery-cache")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pending_path(&self) -> PathBuf {
        self.root.join(PENDING_FILE)
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Atomically replace the pending-work list.
    ///
    /// Written to a temp file in the same directory first, so a crash
    /// mid-write never leaves a truncated list behind.
    pub fn write_pending(&self, files: &[RemoteFile]) -> Result<(), CacheError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&serde_json::to_vec(files)?)?;
        tmp.persist(self.pending_path()).map_err(|e| e.error)?;
        debug!(count = files.len(), "Wrote pending list");
        Ok(())
    }

    /// Load the pending-work list, distinguishing a missing file from one
    /// in the legacy format (a plain array of path strings).
    pub fn load_pending(&self) -> Result<PendingList, CacheError> {
        let text = match fs::read_to_string(self.pending_path()) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PendingList::Missing),
            Err(e) => return Err(e.into()),
        };

        let value: Value = serde_json::from_str(&text)?;
        if let Value::Array(items) = &value {
            if matches!(items.first(), Some(Value::String(_))) {
                return Ok(PendingList::Obsolete);
            }
        }

        let files: Vec<RemoteFile> = serde_json::from_value(value)?;
        Ok(PendingList::Ready(files))
    }

    /// Whether a run is in progress
    pub fn pending_exists(&self) -> bool {
        self.pending_path().exists()
    }

    /// Delete the pending list. Returns false when it was already gone.
    pub fn delete_pending(&self) -> Result<bool, CacheError> {
        match fs::remove_file(self.pending_path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete both artifacts, leaving the store idle and empty
    pub fn clear(&self) -> Result<(), CacheError> {
        self.delete_pending()?;
        match fs::remove_file(self.metadata_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Start an empty metadata log, truncating any previous one
    pub fn truncate_metadata(&self) -> Result<(), CacheError> {
        File::create(self.metadata_path())?;
        Ok(())
    }

    /// Whether a metadata log exists at all
    pub fn metadata_exists(&self) -> bool {
        self.metadata_path().exists()
    }

    /// Open the metadata log for appending, held for the span of one batch
    pub fn open_log(&self) -> Result<MetadataLog, CacheError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.metadata_path())?;
        Ok(MetadataLog { file })
    }

    /// Number of records in the metadata log. A line count, not a parse:
    /// malformed lines still count as attempted work.
    pub fn count_records(&self) -> Result<usize, CacheError> {
        let file = match File::open(self.metadata_path()) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        for line in BufReader::new(file).lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Derive the run status from the two files.
    ///
    /// The total is counted from the raw pending array so a legacy-format
    /// list still reports how much work it held.
    pub fn status(&self) -> Result<CacheStatus, CacheError> {
        let total = match fs::read_to_string(self.pending_path()) {
            Ok(text) => {
                let value: Value = serde_json::from_str(&text)?;
                Some(value.as_array().map(Vec::len).unwrap_or(0))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        match total {
            Some(total) => {
                let processed = self.count_records()?;
                let state = if total > 0 && processed >= total {
                    CacheState::Finishing
                } else {
                    CacheState::Caching
                };
                Ok(CacheStatus {
                    state,
                    processed,
                    total,
                })
            }
            None if self.metadata_exists() => {
                let processed = self.count_records()?;
                Ok(CacheStatus {
                    state: CacheState::Idle,
                    processed,
                    total: processed,
                })
            }
            None => Ok(CacheStatus {
                state: CacheState::Idle,
                processed: 0,
                total: 0,
            }),
        }
    }

    /// Read the browsable records out of the metadata log.
    ///
    /// Each line parses independently. Lines that fail to parse, carry no
    /// path, recorded an error, or hold an empty field map for non-video
    /// media are skipped rather than surfaced.
    pub fn read_records(&self) -> Result<Vec<MetadataRecord>, CacheError> {
        let file = match File::open(self.metadata_path()) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: MetadataRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable metadata line");
                    continue;
                }
            };
            if record.path.is_empty() || record.error().is_some() {
                continue;
            }
            if record.media_type != MediaType::Video && record.exif_data.is_empty() {
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }
}

/// Append handle over the metadata log
pub struct MetadataLog {
    file: File,
}

impl MetadataLog {
    /// Append one record as a JSON line. The write hits the file before
    /// returning, so a crash mid-batch loses at most the current item.
    pub fn append(&mut self, record: &MetadataRecord) -> Result<(), CacheError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        Ok(())
    }
}
