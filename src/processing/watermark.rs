//! Watermark placement and compositing.
//!
//! The watermark asset is decoded fresh for every request (cheap, and it
//! keeps request state out of the shared asset), scaled relative to the
//! image width, placed by gravity, and alpha-composited in sRGB.

use crate::assets::Assets;
use crate::engine::{EngineError, RasterImage};
use crate::options::WatermarkOptions;

use super::gravity_position;

/// Apply the configured watermark onto `img` per the request options.
pub fn apply_watermark(
    img: &mut RasterImage,
    assets: &Assets,
    options: &WatermarkOptions,
    global_opacity: f64,
) -> Result<(), EngineError> {
    let Some(asset) = assets.watermark() else {
        return Ok(());
    };

    let mut wm = RasterImage::load(&asset.data, asset.format, 1, 1.0)?;

    if options.scale > 0.0 {
        let target_w = ((img.width() as f64 * options.scale).round() as u32).max(1);
        let ratio = wm.height() as f64 / wm.width() as f64;
        let target_h = ((target_w as f64 * ratio).round() as u32).max(1);
        wm.resize_to(target_w, target_h)?;
    }

    let (x, y) = gravity_position(
        img.width(),
        img.height(),
        wm.width(),
        wm.height(),
        &options.gravity,
    );

    img.compose_at(&wm, x, y, options.opacity * global_opacity);
    Ok(())
}
