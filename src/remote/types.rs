//! Remote file types and multistatus parsing
//!
//! Defines the file entries the lister produces and the parsing of WebDAV
//! PROPFIND responses into them.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use super::errors::RemoteError;

/// Extensions always classified as video, regardless of declared content type
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "webm"];

/// Media classification used for size ceilings and extraction dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

/// A media file discovered on the remote server
///
/// The serialized form is one pending-list entry on disk:
/// `{"path": "...", "size": 123, "contentType": "image/jpeg"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Path relative to the listing root
    pub path: String,
    /// File size in bytes as reported by the server
    pub size: u64,
    /// Declared MIME type (empty when the server omits the property)
    #[serde(default)]
    pub content_type: String,
}

impl RemoteFile {
    /// Lowercased file extension, empty when the path has none
    pub fn extension(&self) -> String {
        self.path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Classify by extension first, then by the declared content type
    pub fn media_type(&self) -> MediaType {
        if VIDEO_EXTENSIONS.contains(&self.extension().as_str())
            || self.content_type.starts_with("video/")
        {
            MediaType::Video
        } else {
            MediaType::Image
        }
    }
}

/// One resource parsed out of a PROPFIND multistatus response
#[derive(Debug, Clone, PartialEq)]
pub struct DavEntry {
    /// Percent-decoded href as sent by the server
    pub href: String,
    /// Declared MIME type, empty when the property is absent
    pub content_type: String,
    /// Value of getcontentlength, 0 when absent
    pub content_length: u64,
    /// Whether the resourcetype marks a collection
    pub is_collection: bool,
}

/// Parse a PROPFIND multistatus body into resource entries.
///
/// Matches on local element names, so any namespace prefix the server
/// chooses (`d:`, `D:`, none) is accepted.
pub fn parse_multistatus(xml: &str) -> Result<Vec<DavEntry>, RemoteError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();

    let mut href = String::new();
    let mut content_type = String::new();
    let mut content_length: u64 = 0;
    let mut is_collection = false;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "response" => {
                        href.clear();
                        content_type.clear();
                        content_length = 0;
                        is_collection = false;
                        current_tag = None;
                    }
                    "collection" => {
                        is_collection = true;
                    }
                    _ => {
                        current_tag = Some(name);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                // Servers usually emit <d:collection/> as an empty element
                if e.local_name().as_ref() == b"collection" {
                    is_collection = true;
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(tag) = &current_tag {
                    let text = e
                        .unescape()
                        .map_err(|err| RemoteError::InvalidResponse(err.to_string()))?
                        .into_owned();
                    match tag.as_str() {
                        "href" => {
                            href = urlencoding::decode(&text)
                                .map(|decoded| decoded.into_owned())
                                .unwrap_or(text);
                        }
                        "getcontenttype" => {
                            content_type = text;
                        }
                        "getcontentlength" => {
                            content_length = text.trim().parse().unwrap_or(0);
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"response" {
                    if !href.is_empty() {
                        entries.push(DavEntry {
                            href: std::mem::take(&mut href),
                            content_type: std::mem::take(&mut content_type),
                            content_length,
                            is_collection,
                        });
                    }
                } else {
                    current_tag = None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(RemoteError::InvalidResponse(e.to_string())),
        }

        buf.clear();
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content_type: &str) -> RemoteFile {
        RemoteFile {
            path: path.to_string(),
            size: 1000,
            content_type: content_type.to_string(),
        }
    }

    #[test]
    fn test_serialize_pending_entry() {
        let entry = file("photos/alice.jpg", "image/jpeg");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""path":"photos/alice.jpg""#));
        assert!(json.contains(r#""contentType":"image/jpeg""#));
        assert!(json.contains(r#""size":1000"#));
    }

    #[test]
    fn test_deserialize_pending_entry() {
        let json = r#"{"path": "photos/bob.png", "size": 67890, "contentType": "image/png"}"#;
        let entry: RemoteFile = serde_json::from_str(json).unwrap();
        assert_eq!(entry.path, "photos/bob.png");
        assert_eq!(entry.size, 67890);
        assert_eq!(entry.content_type, "image/png");
    }

    #[test]
    fn test_deserialize_missing_content_type() {
        let json = r#"{"path": "photos/clip.mp4", "size": 5}"#;
        let entry: RemoteFile = serde_json::from_str(json).unwrap();
        assert_eq!(entry.content_type, "");
    }

    #[test]
    fn test_extension() {
        assert_eq!(file("photos/alice.JPG", "").extension(), "jpg");
        assert_eq!(file("photos/archive.tar.gz", "").extension(), "gz");
        assert_eq!(file("photos/noext", "").extension(), "");
        assert_eq!(file("clip.webm", "").extension(), "webm");
    }

    #[test]
    fn test_media_type_by_extension() {
        assert_eq!(file("a/b.mp4", "").media_type(), MediaType::Video);
        assert_eq!(file("a/b.MOV", "").media_type(), MediaType::Video);
        assert_eq!(file("a/b.jpg", "").media_type(), MediaType::Image);
        assert_eq!(file("a/b.png", "").media_type(), MediaType::Image);
    }

    #[test]
    fn test_media_type_by_content_type() {
        // Extension unknown, declared type decides
        assert_eq!(file("a/clip.bin", "video/quicktime").media_type(), MediaType::Video);
        assert_eq!(file("a/pic.bin", "image/jpeg").media_type(), MediaType::Image);
    }

    #[test]
    fn test_media_type_serialization() {
        assert_eq!(serde_json::to_string(&MediaType::Image).unwrap(), r#""image""#);
        assert_eq!(serde_json::to_string(&MediaType::Video).unwrap(), r#""video""#);
    }

    #[test]
    fn test_parse_multistatus() {
        // A realistic Depth: 1 response: the folder itself, a subfolder, a photo
        let xml = r#"<?xml version="1.0"?>
            <d:multistatus xmlns:d="DAV:">
              <d:response>
                <d:href>/remote.php/dav/files/alice/Photos/</d:href>
                <d:propstat>
                  <d:prop>
                    <d:resourcetype><d:collection/></d:resourcetype>
                  </d:prop>
                  <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
              </d:response>
              <d:response>
                <d:href>/remote.php/dav/files/alice/Photos/2021/</d:href>
                <d:propstat>
                  <d:prop>
                    <d:resourcetype><d:collection/></d:resourcetype>
                  </d:prop>
                  <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
              </d:response>
              <d:response>
                <d:href>/remote.php/dav/files/alice/Photos/harbour%20sunset.jpg</d:href>
                <d:propstat>
                  <d:prop>
                    <d:resourcetype/>
                    <d:getcontentlength>123456</d:getcontentlength>
                    <d:getcontenttype>image/jpeg</d:getcontenttype>
                  </d:prop>
                  <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
              </d:response>
            </d:multistatus>"#;

        let entries = parse_multistatus(xml).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].href, "/remote.php/dav/files/alice/Photos/");
        assert!(entries[0].is_collection);

        assert!(entries[1].is_collection);

        assert_eq!(entries[2].href, "/remote.php/dav/files/alice/Photos/harbour sunset.jpg");
        assert!(!entries[2].is_collection);
        assert_eq!(entries[2].content_length, 123456);
        assert_eq!(entries[2].content_type, "image/jpeg");
    }

    #[test]
    fn test_parse_multistatus_uppercase_prefix() {
        // Some servers use D: and spell out the collection element
        let xml = r#"<D:multistatus xmlns:D="DAV:">
              <D:response>
                <D:href>/dav/pics/cat.png</D:href>
                <D:propstat>
                  <D:prop>
                    <D:resourcetype></D:resourcetype>
                    <D:getcontentlength>42</D:getcontentlength>
                    <D:getcontenttype>image/png</D:getcontenttype>
                  </D:prop>
                  <D:status>HTTP/1.1 200 OK</D:status>
                </D:propstat>
              </D:response>
            </D:multistatus>"#;

        let entries = parse_multistatus(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].href, "/dav/pics/cat.png");
        assert_eq!(entries[0].content_length, 42);
        assert!(!entries[0].is_collection);
    }

    #[test]
    fn test_parse_multistatus_entity_in_href() {
        // Ampersands in resource names arrive XML-escaped inside the href,
        // on top of the usual percent-encoding
        let xml = r#"<d:multistatus xmlns:d="DAV:">
              <d:response>
                <d:href>/dav/pics/tom%20&amp;%20jerry.jpg</d:href>
                <d:propstat>
                  <d:prop>
                    <d:resourcetype/>
                    <d:getcontentlength>9000</d:getcontentlength>
                    <d:getcontenttype>image/jpeg</d:getcontenttype>
                  </d:prop>
                  <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
              </d:response>
            </d:multistatus>"#;

        let entries = parse_multistatus(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].href, "/dav/pics/tom & jerry.jpg");
        assert_eq!(entries[0].content_type, "image/jpeg");
    }

    #[test]
    fn test_parse_multistatus_missing_props() {
        // A 404 propstat block with empty property elements must not
        // clobber values from the 200 block
        let xml = r#"<d:multistatus xmlns:d="DAV:">
              <d:response>
                <d:href>/dav/pics/dog.jpg</d:href>
                <d:propstat>
                  <d:prop>
                    <d:getcontentlength>77</d:getcontentlength>
                  </d:prop>
                  <d:status>HTTP/1.1 200 OK</d:status>
                </d:propstat>
                <d:propstat>
                  <d:prop>
                    <d:getcontenttype/>
                  </d:prop>
                  <d:status>HTTP/1.1 404 Not Found</d:status>
                </d:propstat>
              </d:response>
            </d:multistatus>"#;

        let entries = parse_multistatus(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content_length, 77);
        assert_eq!(entries[0].content_type, "");
    }

    #[test]
    fn test_parse_multistatus_empty() {
        let entries = parse_multistatus(r#"<d:multistatus xmlns:d="DAV:"></d:multistatus>"#).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_parse_multistatus_mismatched_tags() {
        assert!(parse_multistatus("<d:multistatus><x:response></d:multistatus>").is_err());
    }
}
