//! Media metadata extraction
//!
//! Per-format extraction of the fields persisted to the metadata log:
//! EXIF directories for JPEG, header dimensions for PNG.

pub mod exif;
pub mod png;

use serde_json::{Map, Value};

/// Open field map persisted as a record's exifData
pub type FieldMap = Map<String, Value>;
