//! Batch orchestration
//!
//! Drives a cache run in bounded slices so each call finishes well inside
//! a request handler's timeout. The caller carries the offset between
//! calls; all other state lives in the store.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::store::{CacheStatus, CacheStore, MetadataRecord, PendingList};
use super::CacheError;
use crate::extract::{self, FieldMap};
use crate::remote::{MediaSource, MediaType, RemoteFile};

/// Work items processed per batch call
const BATCH_SIZE: usize = 5;
/// Download ceiling for video files
const MAX_VIDEO_BYTES: u64 = 500 * 1024 * 1024;
/// Download ceiling for everything else
const MAX_IMAGE_BYTES: u64 = 50 * 1024 * 1024;

/// Recorded for items whose size exceeds their ceiling
const OVERSIZED_MESSAGE: &str = "File skipped, too large.";
/// Recorded for items that failed to download or extract
const UNSUPPORTED_MESSAGE: &str = "File is not a supported image or could not be downloaded.";
/// Reply when a legacy pending list forces a reset
const OBSOLETE_MESSAGE: &str = "Cached file list uses an outdated format. Run init again.";

/// What an init call did
#[derive(Debug, Serialize)]
pub struct InitOutcome {
    pub status: &'static str,
    pub total: usize,
}

/// Statuses a batch call can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Idle,
    Caching,
    Complete,
}

/// What one batch call did
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub processed: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchOutcome {
    fn idle() -> Self {
        Self {
            status: BatchStatus::Idle,
            processed: 0,
            total: 0,
            message: None,
        }
    }

    fn idle_with(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::idle()
        }
    }

    fn complete(total: usize) -> Self {
        Self {
            status: BatchStatus::Complete,
            processed: total,
            total,
            message: None,
        }
    }
}

/// What a cancel call did
#[derive(Debug, Serialize)]
pub struct CancelOutcome {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Orchestrates cache runs over a media source
pub struct CacheManager {
    store: CacheStore,
}

impl CacheManager {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Start a new run: enumerate the remote folder, persist the work list
    /// and truncate the log. Whatever a previous run left behind is
    /// discarded first, so a failed listing still leaves the store clean.
    pub async fn init(
        &self,
        source: &dyn MediaSource,
        folder: &str,
    ) -> Result<InitOutcome, CacheError> {
        self.store.clear()?;

        let mut files = source
            .list_files(folder)
            .await
            .map_err(CacheError::Listing)?;
        // Processing order is the reverse of discovery order; consumers
        // depend on it
        files.reverse();

        self.store.write_pending(&files)?;
        self.store.truncate_metadata()?;

        info!(folder = folder, total = files.len(), "Cache run initialized");
        Ok(InitOutcome {
            status: "initialized",
            total: files.len(),
        })
    }

    /// Process one bounded slice of the pending list.
    ///
    /// The offset names where the slice starts. Calling past the end (or
    /// on an empty list) finalizes the run by dropping the pending list,
    /// which makes the terminal call safe to repeat.
    pub async fn process_batch(
        &self,
        source: &dyn MediaSource,
        offset: usize,
    ) -> Result<BatchOutcome, CacheError> {
        let pending = match self.store.load_pending()? {
            PendingList::Missing => {
                debug!("No pending list, nothing to do");
                return Ok(BatchOutcome::idle());
            }
            PendingList::Obsolete => {
                warn!("Pending list uses a legacy format, resetting cache");
                self.store.clear()?;
                return Ok(BatchOutcome::idle_with(OBSOLETE_MESSAGE));
            }
            PendingList::Ready(files) => files,
        };

        let total = pending.len();
        if total == 0 || offset >= total {
            self.store.delete_pending()?;
            info!(total = total, "Cache run complete");
            return Ok(BatchOutcome::complete(total));
        }

        let end = (offset + BATCH_SIZE).min(total);
        let mut log = self.store.open_log()?;

        for file in &pending[offset..end] {
            let record = self.process_item(source, file).await;
            if let Some(message) = record.error() {
                warn!(path = %file.path, message = message, "Recorded item failure");
            }
            log.append(&record)?;
        }

        if end >= total {
            self.store.delete_pending()?;
            info!(total = total, "Cache run complete");
            return Ok(BatchOutcome::complete(total));
        }

        debug!(processed = end, total = total, "Batch processed");
        Ok(BatchOutcome {
            status: BatchStatus::Caching,
            processed: end,
            total,
            message: None,
        })
    }

    /// Run one item through classify, ceiling check, fetch and extract.
    /// Failures land in the record, never in the return type, so one bad
    /// file cannot stall the run.
    async fn process_item(&self, source: &dyn MediaSource, file: &RemoteFile) -> MetadataRecord {
        let media_type = file.media_type();
        let ceiling = match media_type {
            MediaType::Video => MAX_VIDEO_BYTES,
            MediaType::Image => MAX_IMAGE_BYTES,
        };
        if file.size > ceiling {
            debug!(path = %file.path, size = file.size, "Skipping oversized file");
            return MetadataRecord::failed(&file.path, media_type, OVERSIZED_MESSAGE);
        }

        let data = match source.fetch_file(&file.path).await {
            Ok(data) => data,
            Err(e) => {
                debug!(path = %file.path, error = %e, "Download failed");
                return MetadataRecord::failed(&file.path, media_type, UNSUPPORTED_MESSAGE);
            }
        };

        let fields = match media_type {
            // Videos are indexed by presence alone
            MediaType::Video => FieldMap::new(),
            MediaType::Image => match file.extension().as_str() {
                "jpg" | "jpeg" => extract::exif::extract(&data),
                "png" => match extract::png::read_dimensions(&data) {
                    Some((width, height)) => {
                        let mut fields = FieldMap::new();
                        fields.insert("Width".to_string(), width.into());
                        fields.insert("Height".to_string(), height.into());
                        fields
                    }
                    None => {
                        return MetadataRecord::failed(
                            &file.path,
                            media_type,
                            UNSUPPORTED_MESSAGE,
                        )
                    }
                },
                _ => return MetadataRecord::failed(&file.path, media_type, UNSUPPORTED_MESSAGE),
            },
        };

        MetadataRecord::new(&file.path, media_type, fields)
    }

    /// Report run progress without touching anything
    pub fn status(&self) -> Result<CacheStatus, CacheError> {
        self.store.status()
    }

    /// Stop the current run. Records already written stay browsable.
    pub fn cancel(&self) -> Result<CancelOutcome, CacheError> {
        if self.store.delete_pending()? {
            info!("Cache run cancelled");
            Ok(CancelOutcome {
                status: "cancelled",
                message: None,
            })
        } else {
            Ok(CancelOutcome {
                status: "idle",
                message: Some("No cache run in progress."),
            })
        }
    }
}
