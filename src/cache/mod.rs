//! Durable cache state and batch orchestration
//!
//! The pending-work list and the metadata log are the only coordination
//! state a run has; the orchestrator derives everything else from them.

pub mod manager;
pub mod store;

pub use manager::CacheManager;
pub use store::CacheStore;

use crate::remote::RemoteError;

/// Failures scoped to a whole cache operation.
///
/// Anything scoped to a single file is recorded inline in that file's
/// metadata record instead of surfacing here.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Could not enumerate remote files: {0}")]
    Listing(#[source] RemoteError),

    #[error("Cache storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Cache state unreadable: {0}")]
    Corrupted(#[from] serde_json::Error),
}
