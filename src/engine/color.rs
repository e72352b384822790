//! sRGB ↔ linear-light conversion.
//!
//! Blur and sharpen operate on linear values; everything else composites
//! in sRGB. The u8 → f32 direction is table-driven since it is hit for
//! every pixel of every filtered image.

/// sRGB electro-optical transfer function for one channel in `[0, 1]`.
pub fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Inverse transfer function for one channel in `[0, 1]`.
pub fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.0031308 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Lookup table for the u8 sRGB → linear f32 direction.
pub fn srgb_decode_table() -> [f32; 256] {
    let mut table = [0.0f32; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = srgb_to_linear(i as f32 / 255.0);
    }
    table
}

/// Encode a linear f32 channel back into a u8 sRGB value.
pub fn encode_srgb_u8(v: f32) -> u8 {
    (linear_to_srgb(v.clamp(0.0, 1.0)) * 255.0).round() as u8
}
