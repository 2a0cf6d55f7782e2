//! PNG header inspection
//!
//! Pulls image dimensions out of the fixed-layout IHDR chunk without
//! decoding the image.

/// PNG file signature
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Read (width, height) from PNG bytes.
///
/// The IHDR chunk is required to come first, so the dimensions sit at
/// fixed offsets. Returns None for anything that is not a plausible PNG.
pub fn read_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || data[..8] != PNG_SIGNATURE || &data[12..16] != b"IHDR" {
        return None;
    }

    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    if width == 0 || height == 0 {
        return None;
    }

    Some((width, height))
}
