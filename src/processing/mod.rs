//! Pipeline driver.
//!
//! One request's raster work is a fixed sequence of optional operations
//! over a single [`RasterImage`] handle: trim, auto-rotate, crop, resize,
//! rotate, flatten, linear-light filters, fill crop, extend, padding,
//! watermark, cast, save. The deadline and cancellation are re-checked
//! between operations; individual operations are not interruptible.

pub mod watermark;

use crate::assets::Assets;
use crate::config::Config;
use crate::context::RequestContext;
use crate::engine::codec::SaveParams;
use crate::engine::sink::ImageSink;
use crate::engine::{self, EngineError, RasterImage};
use crate::error::ProxyError;
use crate::fetch::ImageData;
use crate::imagetype::ImageType;
use crate::options::{Gravity, GravityType, ProcessingOptions, ResizingType};

/// Largest shrink-on-load factor applied to JPEG sources.
const MAX_SHRINK: u32 = 8;

/// Run the full pipeline: decode `source`, apply `po`, encode into `sink`.
///
/// The output format must already be resolved by the orchestrator; an
/// unresolved format falls back to JPEG.
pub fn process_image(
    source: &ImageData,
    po: &ProcessingOptions,
    conf: &Config,
    assets: &Assets,
    ctx: &RequestContext,
    sink: &mut dyn ImageSink,
) -> Result<(), ProxyError> {
    let out_format = if po.format == ImageType::Unknown {
        ImageType::Jpeg
    } else {
        po.format
    };

    let target_w = scale_dimension(po.width, po.dpr);
    let target_h = scale_dimension(po.height, po.dpr);

    let (shrink, prescale) = load_reduction(source, target_w, target_h);

    ctx.check()?;
    let mut img =
        RasterImage::load(&source.data, source.format, shrink, prescale).map_err(engine_err)?;

    if po.trim.enabled {
        ctx.check()?;
        img.trim(&po.trim).map_err(engine_err)?;
    }

    if po.auto_rotate {
        ctx.check()?;
        img.auto_rotate();
    }

    if po.crop.width > 0 || po.crop.height > 0 {
        ctx.check()?;
        apply_crop(&mut img, po)?;
    }

    ctx.check()?;
    let fill_box = apply_resize(&mut img, po, target_w, target_h)?;

    if po.rotate != 0 {
        ctx.check()?;
        img.rotate(po.rotate);
    }

    if po.flatten || !out_format.supports_alpha() {
        ctx.check()?;
        img.flatten(po.background);
    }

    if po.blur > 0.0 || po.sharpen > 0.0 {
        ctx.check()?;
        img.linearize();
        img.gaussian_blur(po.blur);
        img.sharpen(po.sharpen);
        img.to_srgb();
    }

    if matches!(po.resizing_type, ResizingType::Fill | ResizingType::FillDown) {
        if let Some((box_w, box_h)) = fill_box {
            ctx.check()?;
            apply_fill_crop(&mut img, po, box_w, box_h)?;
        }
    }

    if po.extend.enabled
        && target_w > 0
        && target_h > 0
        && (img.width() < target_w || img.height() < target_h)
    {
        ctx.check()?;
        let canvas_w = target_w.max(img.width());
        let canvas_h = target_h.max(img.height());
        let (x, y) = gravity_position(
            canvas_w,
            canvas_h,
            img.width(),
            img.height(),
            &po.extend.gravity,
        );
        let bg = if out_format.supports_alpha() {
            None
        } else {
            Some(po.background)
        };
        img.embed(canvas_w, canvas_h, x, y, bg).map_err(engine_err)?;
    }

    if po.padding.is_set() {
        ctx.check()?;
        let canvas_w = img.width() + po.padding.left + po.padding.right;
        let canvas_h = img.height() + po.padding.top + po.padding.bottom;
        let bg = if out_format.supports_alpha() {
            None
        } else {
            Some(po.background)
        };
        img.embed(
            canvas_w,
            canvas_h,
            po.padding.left as i64,
            po.padding.top as i64,
            bg,
        )
        .map_err(engine_err)?;
    }

    if po.watermark.enabled {
        ctx.check()?;
        watermark::apply_watermark(&mut img, assets, &po.watermark, assets.watermark_opacity())
            .map_err(engine_err)?;
    }

    ctx.check()?;
    img.cast_uchar();

    ctx.check()?;
    let params = SaveParams::new(po.quality, po.max_bytes, po.strip_metadata, &conf.encoding);
    img.save(sink, out_format, &params).map_err(engine_err)?;

    Ok(())
}

/// Place an `inner`-sized box inside an `area` by gravity. Offsets push
/// inward from the anchored edges; focus-point coordinates are relative.
pub fn gravity_position(
    area_w: u32,
    area_h: u32,
    inner_w: u32,
    inner_h: u32,
    gravity: &Gravity,
) -> (i64, i64) {
    let spare_w = area_w as i64 - inner_w as i64;
    let spare_h = area_h as i64 - inner_h as i64;

    if gravity.gravity_type == GravityType::FocusPoint {
        return (
            (gravity.x * spare_w as f64) as i64,
            (gravity.y * spare_h as f64) as i64,
        );
    }

    let off_x = gravity.x as i64;
    let off_y = gravity.y as i64;

    let x = match gravity.gravity_type {
        GravityType::West | GravityType::NorthWest | GravityType::SouthWest => off_x,
        GravityType::East | GravityType::NorthEast | GravityType::SouthEast => {
            spare_w - off_x
        }
        _ => spare_w / 2 + off_x,
    };
    let y = match gravity.gravity_type {
        GravityType::North | GravityType::NorthEast | GravityType::NorthWest => off_y,
        GravityType::South | GravityType::SouthEast | GravityType::SouthWest => {
            spare_h - off_y
        }
        _ => spare_h / 2 + off_y,
    };
    (x, y)
}

fn scale_dimension(dim: u32, dpr: f64) -> u32 {
    if dim == 0 {
        0
    } else {
        ((dim as f64 * dpr).round() as u32).max(1)
    }
}

/// Shrink-on-load hints: a power-of-two decode shrink for JPEG and a
/// pre-decode scale for WebP, both derived from the least-constrained axis
/// so that fill crops still have enough pixels.
fn load_reduction(source: &ImageData, target_w: u32, target_h: u32) -> (u32, f64) {
    if target_w == 0 && target_h == 0 {
        return (1, 1.0);
    }
    let Some((src_w, src_h)) = engine::probe_dimensions(&source.data) else {
        return (1, 1.0);
    };

    let mut ratio = f64::MAX;
    if target_w > 0 {
        ratio = ratio.min(src_w as f64 / target_w as f64);
    }
    if target_h > 0 {
        ratio = ratio.min(src_h as f64 / target_h as f64);
    }
    if ratio < 2.0 {
        return (1, 1.0);
    }

    match source.format {
        ImageType::Jpeg => {
            let mut shrink = 1;
            while shrink * 2 <= MAX_SHRINK && f64::from(shrink * 2) <= ratio {
                shrink *= 2;
            }
            (shrink, 1.0)
        }
        ImageType::WebP => (1, 1.0 / ratio),
        _ => (1, 1.0),
    }
}

/// Explicit crop, relative to pre-resize pixels.
fn apply_crop(img: &mut RasterImage, po: &ProcessingOptions) -> Result<(), ProxyError> {
    let (img_w, img_h) = img.dimensions();
    let crop_w = if po.crop.width == 0 {
        img_w
    } else {
        po.crop.width.min(img_w)
    };
    let crop_h = if po.crop.height == 0 {
        img_h
    } else {
        po.crop.height.min(img_h)
    };

    let gravity = po.crop.gravity.unwrap_or(po.gravity);
    if gravity.gravity_type == GravityType::Smart {
        return img.smart_crop(crop_w, crop_h).map_err(engine_err);
    }

    let (x, y) = gravity_position(img_w, img_h, crop_w, crop_h, &gravity);
    img.crop(x.max(0) as u32, y.max(0) as u32, crop_w, crop_h)
        .map_err(engine_err)
}

/// Scale per the resizing type. Returns the box the fill crop should cut
/// to afterwards (fill-down may shrink it).
fn apply_resize(
    img: &mut RasterImage,
    po: &ProcessingOptions,
    target_w: u32,
    target_h: u32,
) -> Result<Option<(u32, u32)>, ProxyError> {
    if target_w == 0 && target_h == 0 {
        return Ok(None);
    }

    let (src_w, src_h) = img.dimensions();
    let (src_wf, src_hf) = (src_w as f64, src_h as f64);

    if po.resizing_type == ResizingType::Force {
        let dst_w = if target_w > 0 { target_w } else { src_w };
        let dst_h = if target_h > 0 { target_h } else { src_h };
        if !po.enlarge && (dst_w > src_w || dst_h > src_h) {
            // Force without enlargement caps each axis at the source.
            img.resize_to(dst_w.min(src_w), dst_h.min(src_h))
                .map_err(engine_err)?;
        } else {
            img.resize_to(dst_w, dst_h).map_err(engine_err)?;
        }
        return Ok(None);
    }

    let wr = (target_w > 0).then(|| target_w as f64 / src_wf);
    let hr = (target_h > 0).then(|| target_h as f64 / src_hf);

    let use_fill = match po.resizing_type {
        ResizingType::Fill | ResizingType::FillDown => true,
        ResizingType::Auto => {
            // Matching orientations fill, mismatched fit.
            target_w > 0 && target_h > 0 && (src_w >= src_h) == (target_w >= target_h)
        }
        _ => false,
    };

    let mut scale = match (wr, hr) {
        (Some(wr), Some(hr)) => {
            if use_fill {
                wr.max(hr)
            } else {
                wr.min(hr)
            }
        }
        (Some(wr), None) => wr,
        (None, Some(hr)) => hr,
        (None, None) => unreachable!("at least one target dimension is set"),
    };

    let mut box_w = target_w;
    let mut box_h = target_h;

    if scale > 1.0 && !po.enlarge {
        if po.resizing_type == ResizingType::FillDown {
            // The box shrinks instead of the image upscaling.
            box_w = ((target_w as f64 / scale) as u32).max(1);
            box_h = ((target_h as f64 / scale) as u32).max(1);
        }
        scale = 1.0;
    }

    if scale != 1.0 {
        let dst_w = ((src_wf * scale).round() as u32).max(1);
        let dst_h = ((src_hf * scale).round() as u32).max(1);
        img.resize_to(dst_w, dst_h).map_err(engine_err)?;
    }

    if use_fill && target_w > 0 && target_h > 0 {
        Ok(Some((box_w, box_h)))
    } else {
        Ok(None)
    }
}

/// Final crop to the fill box, content-aware when gravity says so.
fn apply_fill_crop(
    img: &mut RasterImage,
    po: &ProcessingOptions,
    box_w: u32,
    box_h: u32,
) -> Result<(), ProxyError> {
    let (img_w, img_h) = img.dimensions();
    let crop_w = box_w.min(img_w);
    let crop_h = box_h.min(img_h);
    if crop_w == img_w && crop_h == img_h {
        return Ok(());
    }

    if po.gravity.gravity_type == GravityType::Smart {
        return img.smart_crop(crop_w, crop_h).map_err(engine_err);
    }
    let (x, y) = gravity_position(img_w, img_h, crop_w, crop_h, &po.gravity);
    img.crop(x.max(0) as u32, y.max(0) as u32, crop_w, crop_h)
        .map_err(engine_err)
}

fn engine_err(e: EngineError) -> ProxyError {
    ProxyError::processing(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_dimension() {
        assert_eq!(scale_dimension(0, 2.0), 0);
        assert_eq!(scale_dimension(100, 2.0), 200);
        assert_eq!(scale_dimension(100, 1.5), 150);
        assert_eq!(scale_dimension(1, 0.1), 1);
    }

    #[test]
    fn test_gravity_position_truncates_focus_point() {
        let gravity = Gravity {
            gravity_type: GravityType::FocusPoint,
            x: 0.75,
            y: 0.75,
        };
        let (x, y) = gravity_position(100, 100, 10, 10, &gravity);
        assert_eq!((x, y), (67, 67));
    }
}
