//! Remote gallery server access
//!
//! The caching pipeline talks to the remote server through the MediaSource
//! trait; DavClient is the WebDAV implementation.

pub mod client;
pub mod errors;
pub mod types;

pub use client::DavClient;
pub use errors::RemoteError;
pub use types::{MediaType, RemoteFile};

use async_trait::async_trait;

/// Remote file operations the caching pipeline depends on
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Recursively enumerate media files under `folder`
    async fn list_files(&self, folder: &str) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Download the raw bytes of one remote file
    async fn fetch_file(&self, path: &str) -> Result<Vec<u8>, RemoteError>;

    /// Write bytes back to the remote server
    async fn put_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteError>;
}
