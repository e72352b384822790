//! ICO container writer.
//!
//! An ICO file here is a single-image icon directory wrapping a PNG
//! payload: ICONDIR (6 bytes), one ICONDIRENTRY (16 bytes), then the PNG.
//! Images larger than 256 pixels on either axis cannot be represented.

use crate::constants::ICO_MAX_DIMENSION;

use super::EngineError;

/// Offset of the image data: 6-byte ICONDIR + 16-byte ICONDIRENTRY.
const ICO_DATA_OFFSET: u32 = 22;

/// ICONDIRENTRY dimension byte; 0 encodes the maximum of 256.
pub fn encode_ico_dimension(size: u32) -> u8 {
    if size >= ICO_MAX_DIMENSION {
        0
    } else {
        size as u8
    }
}

/// Assemble the ICO container around an already-encoded PNG.
pub fn write_ico(
    width: u32,
    height: u32,
    has_alpha: bool,
    png: &[u8],
) -> Result<Vec<u8>, EngineError> {
    if width > ICO_MAX_DIMENSION || height > ICO_MAX_DIMENSION {
        return Err(EngineError::encode(
            "ico",
            format!(
                "image {}x{} exceeds the ICO limit of {} pixels per side",
                width, height, ICO_MAX_DIMENSION
            ),
        ));
    }

    let mut out = Vec::with_capacity(ICO_DATA_OFFSET as usize + png.len());

    // ICONDIR: reserved, type 1 (icon), one entry.
    out.extend_from_slice(&[0, 0, 1, 0, 1, 0]);

    // ICONDIRENTRY.
    out.push(encode_ico_dimension(width));
    out.push(encode_ico_dimension(height));
    out.push(0); // palette size: truecolor
    out.push(0); // reserved
    out.extend_from_slice(&[1, 0]); // color planes
    if has_alpha {
        out.extend_from_slice(&[32, 0]);
    } else {
        out.extend_from_slice(&[24, 0]);
    }
    out.extend_from_slice(&(png.len() as u32).to_le_bytes());
    out.extend_from_slice(&ICO_DATA_OFFSET.to_le_bytes());

    out.extend_from_slice(png);
    Ok(out)
}
