//! JPEG EXIF extraction
//!
//! Reads the EXIF directories of a JPEG and produces the open field map
//! persisted to the metadata log. Extraction is best effort: a missing
//! tag leaves its field absent, and a file without EXIF yields an empty
//! map rather than an error.

use exif::{Exif, Field, In, Reader, Tag, Value};
use serde_json::json;
use std::io::Cursor;

use super::FieldMap;

/// Extract gallery metadata fields from JPEG bytes
pub fn extract(data: &[u8]) -> FieldMap {
    let mut fields = FieldMap::new();

    let mut cursor = Cursor::new(data);
    let exif = match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(_) => return fields,
    };

    for (tag, key) in [
        (Tag::ImageDescription, "ImageDescription"),
        (Tag::Make, "Make"),
        (Tag::Model, "Model"),
        (Tag::Software, "Software"),
        (Tag::DateTime, "DateTime"),
    ] {
        if let Some(text) = ascii_value(&exif, tag) {
            fields.insert(key.to_string(), text.into());
        }
    }

    if let Some(n) = uint_value(&exif, Tag::Orientation) {
        fields.insert("Orientation".to_string(), n.into());
    }
    if let Some(n) = uint_value(&exif, Tag::ImageWidth) {
        fields.insert("Width".to_string(), n.into());
    }
    if let Some(n) = uint_value(&exif, Tag::ImageLength) {
        fields.insert("Height".to_string(), n.into());
    }

    if let Some(value) = exposure_time(&exif) {
        fields.insert("ExposureTime".to_string(), value);
    }
    if let Some(f) = rational_value(&exif, Tag::FNumber) {
        fields.insert("Aperture".to_string(), format!("f/{}", round1(f)).into());
    }
    if let Some(f) = rational_value(&exif, Tag::FocalLength) {
        fields.insert("FocalLength".to_string(), format!("{} mm", round1(f)).into());
    }
    if let Some(n) = uint_value(&exif, Tag::PhotographicSensitivity) {
        fields.insert("ISO".to_string(), n.into());
    }
    if let Some(n) = uint_value(&exif, Tag::Flash) {
        fields.insert("Flash".to_string(), n.into());
    }
    if let Some(text) = user_comment(&exif) {
        fields.insert("UserComment".to_string(), text.into());
    }
    if let Some(text) = ascii_value(&exif, Tag::DateTimeOriginal) {
        fields.insert("DateTimeOriginal".to_string(), text.into());
    }

    // Pixel dimensions from the capture directory win over the primary ones
    if let Some(n) = uint_value(&exif, Tag::PixelXDimension) {
        fields.insert("Width".to_string(), n.into());
    }
    if let Some(n) = uint_value(&exif, Tag::PixelYDimension) {
        fields.insert("Height".to_string(), n.into());
    }

    if let Some((latitude, longitude)) = gps_coordinates(&exif) {
        fields.insert(
            "GPS".to_string(),
            json!({ "Latitude": latitude, "Longitude": longitude }),
        );
    }

    fields
}

/// First string of an ASCII tag, trimmed; None when absent or empty
fn ascii_value(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) if !parts.is_empty() => {
            let text = String::from_utf8_lossy(&parts[0]);
            let text = text.trim_matches(char::from(0)).trim();
            if text.is_empty() {
                None
            } else {
                Some(text.to_string())
            }
        }
        _ => None,
    }
}

/// First element of a SHORT or LONG tag
fn uint_value(exif: &Exif, tag: Tag) -> Option<u64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Short(v) if !v.is_empty() => Some(u64::from(v[0])),
        Value::Long(v) if !v.is_empty() => Some(u64::from(v[0])),
        _ => None,
    }
}

/// First rational of a tag as f64; None on a zero denominator
fn rational_value(exif: &Exif, tag: Tag) -> Option<f64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Rational(v) if !v.is_empty() && v[0].denom != 0 => Some(v[0].to_f64()),
        _ => None,
    }
}

/// Exposure time with the reciprocal formatting rule: values under one
/// second render as "1/N s", everything else as a one-decimal figure.
/// A non-rational stored value passes through as displayed.
fn exposure_time(exif: &Exif) -> Option<serde_json::Value> {
    let field = exif.get_field(Tag::ExposureTime, In::PRIMARY)?;
    match &field.value {
        Value::Rational(v) if !v.is_empty() => {
            let r = v[0];
            if r.num == 0 || r.denom == 0 {
                return None;
            }
            let seconds = r.to_f64();
            let text = if seconds < 1.0 {
                format!("1/{} s", (f64::from(r.denom) / f64::from(r.num)).round())
            } else {
                format!("{} s", round1(seconds))
            };
            Some(text.into())
        }
        Value::Rational(_) => None,
        _ => Some(field.display_value().to_string().into()),
    }
}

/// UserComment with its character-code prefix stripped
fn user_comment(exif: &Exif) -> Option<String> {
    let field = exif.get_field(Tag::UserComment, In::PRIMARY)?;
    let bytes = match &field.value {
        Value::Undefined(bytes, _) => bytes.as_slice(),
        Value::Ascii(parts) if !parts.is_empty() => parts[0].as_slice(),
        _ => return None,
    };

    let stripped = [&b"ASCII\0\0\0"[..], &b"UNICODE\0"[..], &b"JIS\0\0\0\0\0"[..]]
        .iter()
        .find_map(|prefix| bytes.strip_prefix(*prefix))
        .unwrap_or(bytes);

    let text = String::from_utf8_lossy(stripped);
    let text = text.trim_matches(char::from(0)).trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// GPS position as signed decimal degrees; None unless both coordinates
/// are fully present and valid (a one-sided position is never emitted)
fn gps_coordinates(exif: &Exif) -> Option<(f64, f64)> {
    let latitude = dms_to_decimal(exif.get_field(Tag::GPSLatitude, In::PRIMARY)?)?;
    let longitude = dms_to_decimal(exif.get_field(Tag::GPSLongitude, In::PRIMARY)?)?;

    let south = ascii_value(exif, Tag::GPSLatitudeRef)
        .map(|r| r.starts_with('S'))
        .unwrap_or(false);
    let west = ascii_value(exif, Tag::GPSLongitudeRef)
        .map(|r| r.starts_with('W'))
        .unwrap_or(false);

    Some((
        if south { -latitude } else { latitude },
        if west { -longitude } else { longitude },
    ))
}

/// Degrees/minutes/seconds rationals to decimal degrees
fn dms_to_decimal(field: &Field) -> Option<f64> {
    match &field.value {
        Value::Rational(v) if v.len() >= 3 => {
            if v[..3].iter().any(|r| r.denom == 0) {
                return None;
            }
            Some(v[0].to_f64() + v[1].to_f64() / 60.0 + v[2].to_f64() / 3600.0)
        }
        _ => None,
    }
}

/// Round to one decimal place
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
