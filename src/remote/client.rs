//! WebDAV Client
//!
//! Authenticated access to the remote gallery server: recursive media
//! listing, file download, and file write-back over plain WebDAV verbs.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info};

use super::errors::RemoteError;
use super::types::{parse_multistatus, DavEntry, RemoteFile};
use super::MediaSource;

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Property request sent with every PROPFIND
const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getcontenttype/>
  </d:prop>
</d:propfind>"#;

/// WebDAV client for the remote gallery server
#[derive(Clone)]
pub struct DavClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Server URL up to and including the DAV root (no trailing slash)
    base_url: String,
    /// Path component of `base_url`, stripped from hrefs to relativize them
    base_path: String,
    /// Credentials for HTTP Basic auth
    username: String,
    password: String,
}

impl DavClient {
    /// Create a client for the given DAV root
    ///
    /// # Arguments
    /// * `base_url` - Server URL including the DAV root path,
    ///   e.g. `https://cloud.example.net/remote.php/dav/files/alice`
    /// * `username` / `password` - HTTP Basic credentials
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, RemoteError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let base_path = base_url
            .find("://")
            .map(|scheme| scheme + 3)
            .and_then(|host_start| {
                base_url[host_start..]
                    .find('/')
                    .map(|slash| base_url[host_start + slash..].to_string())
            })
            .unwrap_or_default();

        Ok(Self {
            http_client,
            base_url,
            base_path,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Build the Basic auth header value from the stored credentials
    fn auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        format!("Basic {}", encoded)
    }

    /// Build the request URL for a path relative to the DAV root
    fn url_for(&self, path: &str) -> String {
        let mut url = self.base_url.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    /// Relativize a multistatus href against the DAV root
    fn relative_path(&self, href: &str) -> String {
        // Some servers return absolute URLs in href
        let path = match href.find("://") {
            Some(scheme) => match href[scheme + 3..].find('/') {
                Some(slash) => &href[scheme + 3 + slash..],
                None => "",
            },
            None => href,
        };

        path.strip_prefix(&self.base_path)
            .unwrap_or(path)
            .trim_matches('/')
            .to_string()
    }

    /// Issue a Depth: 1 PROPFIND for one folder
    async fn propfind(&self, path: &str) -> Result<Vec<DavEntry>, RemoteError> {
        let url = self.url_for(path);
        debug!(url = %url, "PROPFIND");

        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        let response = self
            .http_client
            .request(method, &url)
            .header("Authorization", self.auth_header())
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status, &body));
        }

        let body = response.text().await?;
        parse_multistatus(&body)
    }

    /// Fold one folder's listing into the walk state: unvisited subfolders
    /// are queued, media files are collected
    fn absorb_entries(
        &self,
        dir: &str,
        entries: Vec<DavEntry>,
        visited: &mut HashSet<String>,
        queue: &mut VecDeque<String>,
        files: &mut Vec<RemoteFile>,
    ) {
        for entry in entries {
            let path = self.relative_path(&entry.href);
            // A folder's listing includes the folder itself
            if path.is_empty() || path == dir {
                continue;
            }
            if entry.is_collection {
                // Servers can emit hrefs pointing back up the tree;
                // each folder is listed at most once
                if visited.insert(path.clone()) {
                    queue.push_back(path);
                }
            } else if entry.content_type.starts_with("image/")
                || entry.content_type.starts_with("video/")
            {
                files.push(RemoteFile {
                    path,
                    size: entry.content_length,
                    content_type: entry.content_type,
                });
            }
        }
    }
}

#[async_trait]
impl MediaSource for DavClient {
    /// Walk the folder tree with one Depth: 1 PROPFIND per folder,
    /// keeping entries whose declared content type is image or video
    async fn list_files(&self, folder: &str) -> Result<Vec<RemoteFile>, RemoteError> {
        info!(folder = folder, "Listing remote media files");

        let start = folder.trim_matches('/').to_string();
        let mut files = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(start.clone());
        queue.push_back(start);

        while let Some(dir) = queue.pop_front() {
            let entries = self.propfind(&dir).await?;
            self.absorb_entries(&dir, entries, &mut visited, &mut queue, &mut files);
        }

        info!(folder = folder, count = files.len(), "Listed remote media files");
        Ok(files)
    }

    async fn fetch_file(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let url = self.url_for(path);
        debug!(path = path, url = %url, "Downloading remote file");

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            if status == 404 {
                return Err(RemoteError::NotFound(path.to_string()));
            }
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status, &body));
        }

        let bytes = response.bytes().await?;
        debug!(path = path, size = bytes.len(), "Downloaded remote file");
        Ok(bytes.to_vec())
    }

    async fn put_file(&self, path: &str, data: &[u8]) -> Result<(), RemoteError> {
        let url = self.url_for(path);
        info!(path = path, size = data.len(), "Uploading file to remote server");

        let response = self
            .http_client
            .put(&url)
            .header("Authorization", self.auth_header())
            .header("Content-Length", data.len())
            .body(data.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(status, &body));
        }

        info!(path = path, "File uploaded to remote server");
        Ok(())
    }
}
