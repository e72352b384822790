//! Raster engine.
//!
//! [`RasterImage`] is the single mutable image handle the pipeline driver
//! threads through its operation sequence. Decoding and encoding go through
//! the `image` crate, resampling through `fast_image_resize`. The engine is
//! synchronous; the driver runs it on a blocking thread.

pub mod codec;
pub mod color;
pub mod ico;
pub mod orientation;
pub mod sink;

use std::fmt;
use std::io::Cursor;
use std::num::NonZeroU32;

use fast_image_resize as fir;
use image::io::Reader as ImageReader;
use image::{imageops, DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};

use crate::imagetype::ImageType;
use crate::options::{RgbColor, TrimOptions};

use self::orientation::OrientationTransform;

/// Engine-level failure. The driver wraps these into processing errors.
#[derive(Debug, Clone)]
pub enum EngineError {
    Decode { message: String },
    Encode { format: String, message: String },
    Unsupported { format: ImageType, save: bool },
    Operation { message: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Decode { message } => write!(f, "decode failed: {}", message),
            EngineError::Encode { format, message } => {
                write!(f, "encoding to {} failed: {}", format, message)
            }
            EngineError::Unsupported { format, save } => write!(
                f,
                "{} is not supported for {}",
                format.ext(),
                if *save { "saving" } else { "loading" }
            ),
            EngineError::Operation { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    pub fn decode(message: impl Into<String>) -> Self {
        EngineError::Decode {
            message: message.into(),
        }
    }

    pub fn encode(format: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Encode {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        EngineError::Operation {
            message: message.into(),
        }
    }
}

fn to_image_format(format: ImageType) -> Option<ImageFormat> {
    match format {
        ImageType::Jpeg => Some(ImageFormat::Jpeg),
        ImageType::Png => Some(ImageFormat::Png),
        ImageType::WebP => Some(ImageFormat::WebP),
        ImageType::Gif => Some(ImageFormat::Gif),
        ImageType::Bmp => Some(ImageFormat::Bmp),
        ImageType::Tiff => Some(ImageFormat::Tiff),
        ImageType::Ico => Some(ImageFormat::Ico),
        _ => None,
    }
}

/// Read image dimensions from the header without a full decode. Used for
/// the shrink-on-load hint.
pub fn probe_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// The mutable image handle.
#[derive(Debug)]
pub struct RasterImage {
    img: DynamicImage,
    orientation: OrientationTransform,
    /// Set while pixel values are linear light.
    linear: bool,
}

impl RasterImage {
    /// Decode source bytes.
    ///
    /// `shrink` (JPEG) and `scale` (WebP) are pre-decode reduction hints
    /// computed from the target size; the codecs here decode at full size,
    /// so the reduction is applied immediately after decoding, which keeps
    /// the rest of the pipeline working on small images.
    pub fn load(
        data: &[u8],
        format: ImageType,
        shrink: u32,
        scale: f64,
    ) -> Result<RasterImage, EngineError> {
        if !format.load_support() {
            return Err(EngineError::Unsupported {
                format,
                save: false,
            });
        }
        let image_format = to_image_format(format)
            .ok_or(EngineError::Unsupported {
                format,
                save: false,
            })?;

        let img = image::load_from_memory_with_format(data, image_format)
            .map_err(|e| EngineError::decode(e.to_string()))?;

        let orientation = orientation::transform_for(orientation::read_orientation(data));

        let mut raster = RasterImage {
            img,
            orientation,
            linear: false,
        };

        if shrink > 1 {
            let (w, h) = raster.dimensions();
            raster.resize_to((w / shrink).max(1), (h / shrink).max(1))?;
        } else if scale > 0.0 && scale < 1.0 {
            let (w, h) = raster.dimensions();
            let sw = ((w as f64 * scale).round() as u32).max(1);
            let sh = ((h as f64 * scale).round() as u32).max(1);
            raster.resize_to(sw, sh)?;
        }

        Ok(raster)
    }

    /// Wrap an already-decoded image (watermark re-decode path).
    pub fn from_dynamic(img: DynamicImage) -> RasterImage {
        RasterImage {
            img,
            orientation: OrientationTransform::IDENTITY,
            linear: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.img.dimensions()
    }

    pub fn has_alpha(&self) -> bool {
        self.img.color().has_alpha()
    }

    /// Apply the EXIF orientation read at load time, then forget it.
    pub fn auto_rotate(&mut self) {
        let transform = self.orientation;
        self.orientation = OrientationTransform::IDENTITY;
        if transform.is_identity() {
            return;
        }
        match transform.quarter_turns {
            1 => self.img = self.img.rotate90(),
            2 => self.img = self.img.rotate180(),
            3 => self.img = self.img.rotate270(),
            _ => {}
        }
        if transform.flip_x {
            self.flip_horizontal();
        }
    }

    /// Rotate by a multiple of 90 degrees (clockwise for positive angles).
    pub fn rotate(&mut self, angle: i32) {
        match angle.rem_euclid(360) {
            90 => self.img = self.img.rotate90(),
            180 => self.img = self.img.rotate180(),
            270 => self.img = self.img.rotate270(),
            _ => {}
        }
    }

    pub fn flip_horizontal(&mut self) {
        self.img = self.img.fliph();
    }

    /// Extract a sub-rectangle. Out-of-range rectangles are clamped to the
    /// image; a rectangle that clamps to nothing is an error.
    pub fn crop(&mut self, left: u32, top: u32, width: u32, height: u32) -> Result<(), EngineError> {
        let (img_w, img_h) = self.dimensions();
        if left >= img_w || top >= img_h {
            return Err(EngineError::operation("crop offset is outside the image"));
        }
        let width = width.min(img_w - left);
        let height = height.min(img_h - top);
        if width == 0 || height == 0 {
            return Err(EngineError::operation("crop rectangle is empty"));
        }
        self.img = self.img.crop_imm(left, top, width, height);
        Ok(())
    }

    /// Content-aware crop: choose the window with the highest detail.
    ///
    /// Detail is approximated by per-channel variance sampled over a
    /// coarse grid of candidate windows.
    pub fn smart_crop(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        let (img_w, img_h) = self.dimensions();
        let width = width.min(img_w);
        let height = height.min(img_h);
        if width == 0 || height == 0 {
            return Err(EngineError::operation("smart crop target is empty"));
        }

        let rgba = self.img.to_rgba8();
        let max_x = img_w - width;
        let max_y = img_h - height;
        let step_x = (max_x / 5).max(1);
        let step_y = (max_y / 5).max(1);

        let mut best = (max_x / 2, max_y / 2);
        let mut best_score = -1.0f64;
        let mut y = 0;
        while y <= max_y {
            let mut x = 0;
            while x <= max_x {
                let score = region_variance(&rgba, x, y, width, height);
                if score > best_score {
                    best_score = score;
                    best = (x, y);
                }
                x += step_x;
            }
            y += step_y;
        }

        self.crop(best.0, best.1, width, height)
    }

    /// Cut uniform borders.
    ///
    /// Expects materialized pixels (which `load` guarantees): the border
    /// scan reads the buffer several times. The reference color is the
    /// explicit one when given, the averaged corner color in smart mode,
    /// and the top-left pixel otherwise.
    pub fn trim(&mut self, options: &TrimOptions) -> Result<(), EngineError> {
        let rgba = self.img.to_rgba8();
        let (img_w, img_h) = rgba.dimensions();

        let reference = if let Some(color) = options.color {
            [color.r, color.g, color.b]
        } else if options.smart {
            corner_average(&rgba)
        } else {
            let p = rgba.get_pixel(0, 0);
            [p[0], p[1], p[2]]
        };

        let is_content = |p: &Rgba<u8>| -> bool {
            let dr = (p[0] as f64 - reference[0] as f64).abs();
            let dg = (p[1] as f64 - reference[1] as f64).abs();
            let db = (p[2] as f64 - reference[2] as f64).abs();
            dr.max(dg).max(db) > options.threshold
        };

        let mut min_x = img_w;
        let mut max_x = 0u32;
        let mut min_y = img_h;
        let mut max_y = 0u32;
        for (x, y, pixel) in rgba.enumerate_pixels() {
            if is_content(pixel) {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }

        if min_x > max_x || min_y > max_y {
            // Uniform image: nothing to trim.
            return Ok(());
        }

        let (mut left, mut right) = (min_x, img_w - 1 - max_x);
        let (mut top, mut bottom) = (min_y, img_h - 1 - max_y);
        if options.equal_hor {
            let margin = left.min(right);
            left = margin;
            right = margin;
        }
        if options.equal_ver {
            let margin = top.min(bottom);
            top = margin;
            bottom = margin;
        }

        self.crop(left, top, img_w - left - right, img_h - top - bottom)
    }

    /// Resample to exactly `width`×`height` with Lanczos3. Images with an
    /// alpha channel are premultiplied for the resample and unpremultiplied
    /// after.
    pub fn resize_to(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        let (src_w, src_h) = self.dimensions();
        if (src_w, src_h) == (width, height) {
            return Ok(());
        }

        let src_w = NonZeroU32::new(src_w)
            .ok_or_else(|| EngineError::operation("source width is zero"))?;
        let src_h = NonZeroU32::new(src_h)
            .ok_or_else(|| EngineError::operation("source height is zero"))?;
        let dst_w =
            NonZeroU32::new(width).ok_or_else(|| EngineError::operation("target width is zero"))?;
        let dst_h = NonZeroU32::new(height)
            .ok_or_else(|| EngineError::operation("target height is zero"))?;

        let had_alpha = self.has_alpha();

        let mut src = fir::Image::from_vec_u8(
            src_w,
            src_h,
            self.img.to_rgba8().into_raw(),
            fir::PixelType::U8x4,
        )
        .map_err(|e| EngineError::operation(format!("resize source: {:?}", e)))?;

        let mul_div = fir::MulDiv::default();
        if had_alpha {
            mul_div
                .multiply_alpha_inplace(&mut src.view_mut())
                .map_err(|e| EngineError::operation(format!("premultiply: {:?}", e)))?;
        }

        let mut dst = fir::Image::new(dst_w, dst_h, fir::PixelType::U8x4);
        let mut resizer = fir::Resizer::new(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
        resizer
            .resize(&src.view(), &mut dst.view_mut())
            .map_err(|e| EngineError::operation(format!("resize: {:?}", e)))?;

        if had_alpha {
            mul_div
                .divide_alpha_inplace(&mut dst.view_mut())
                .map_err(|e| EngineError::operation(format!("unpremultiply: {:?}", e)))?;
        }

        let buffer = RgbaImage::from_raw(width, height, dst.into_vec())
            .ok_or_else(|| EngineError::operation("resize produced a short buffer"))?;
        self.img = if had_alpha {
            DynamicImage::ImageRgba8(buffer)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(buffer).to_rgb8())
        };
        Ok(())
    }

    /// Composite onto a solid background and drop the alpha channel.
    pub fn flatten(&mut self, bg: RgbColor) {
        if !self.has_alpha() {
            return;
        }
        let rgba = self.img.to_rgba8();
        let mut out = image::RgbImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let alpha = pixel[3] as u32;
            let blend = |fg: u8, bg: u8| -> u8 {
                ((fg as u32 * alpha + bg as u32 * (255 - alpha)) / 255) as u8
            };
            out.put_pixel(
                x,
                y,
                image::Rgb([
                    blend(pixel[0], bg.r),
                    blend(pixel[1], bg.g),
                    blend(pixel[2], bg.b),
                ]),
            );
        }
        self.img = DynamicImage::ImageRgb8(out);
    }

    pub fn ensure_alpha(&mut self) {
        if !self.has_alpha() {
            self.img = DynamicImage::ImageRgba8(self.img.to_rgba8());
        }
    }

    /// Place the image on a `width`×`height` canvas at (`off_x`, `off_y`).
    /// `bg` of `None` pads with transparency (adding alpha if needed).
    pub fn embed(
        &mut self,
        width: u32,
        height: u32,
        off_x: i64,
        off_y: i64,
        bg: Option<RgbColor>,
    ) -> Result<(), EngineError> {
        if width == 0 || height == 0 {
            return Err(EngineError::operation("embed canvas is empty"));
        }
        let fill = match bg {
            Some(color) => Rgba([color.r, color.g, color.b, 255]),
            None => Rgba([0, 0, 0, 0]),
        };
        let mut canvas = RgbaImage::from_pixel(width, height, fill);
        let src = self.img.to_rgba8();
        imageops::overlay(&mut canvas, &src, off_x, off_y);
        self.img = if bg.is_some() && !self.has_alpha() {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
        } else {
            DynamicImage::ImageRgba8(canvas)
        };
        Ok(())
    }

    /// Convert pixel values to linear light (f32 per channel).
    pub fn linearize(&mut self) {
        if self.linear {
            return;
        }
        let table = color::srgb_decode_table();
        let rgba = self.img.to_rgba8();
        let mut out = image::Rgba32FImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            out.put_pixel(
                x,
                y,
                Rgba([
                    table[pixel[0] as usize],
                    table[pixel[1] as usize],
                    table[pixel[2] as usize],
                    pixel[3] as f32 / 255.0,
                ]),
            );
        }
        self.img = DynamicImage::ImageRgba32F(out);
        self.linear = true;
    }

    /// Convert linear-light values back to 8-bit sRGB.
    pub fn to_srgb(&mut self) {
        if !self.linear {
            return;
        }
        let float = self.img.to_rgba32f();
        let mut out = RgbaImage::new(float.width(), float.height());
        for (x, y, pixel) in float.enumerate_pixels() {
            out.put_pixel(
                x,
                y,
                Rgba([
                    color::encode_srgb_u8(pixel[0]),
                    color::encode_srgb_u8(pixel[1]),
                    color::encode_srgb_u8(pixel[2]),
                    (pixel[3].clamp(0.0, 1.0) * 255.0).round() as u8,
                ]),
            );
        }
        self.img = DynamicImage::ImageRgba8(out);
        self.linear = false;
    }

    pub fn gaussian_blur(&mut self, sigma: f32) {
        if sigma > 0.0 {
            self.img = self.img.blur(sigma);
        }
    }

    pub fn sharpen(&mut self, sigma: f32) {
        if sigma > 0.0 {
            self.img = self.img.unsharpen(sigma, 1);
        }
    }

    /// Reduce to 8 bits per channel (keeping alpha only when present).
    pub fn cast_uchar(&mut self) {
        self.to_srgb();
        let has_alpha = self.has_alpha();
        let already_8bit = matches!(
            (&self.img, has_alpha),
            (DynamicImage::ImageRgba8(_), true) | (DynamicImage::ImageRgb8(_), false)
        );
        if !already_8bit {
            self.img = if has_alpha {
                DynamicImage::ImageRgba8(self.img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(self.img.to_rgb8())
            };
        }
    }

    /// Alpha-blend `overlay` onto this image at (`x`, `y`), scaling the
    /// overlay's alpha by `opacity`.
    pub fn compose_at(&mut self, overlay: &RasterImage, x: i64, y: i64, opacity: f64) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity == 0.0 {
            return;
        }
        let mut base = self.img.to_rgba8();
        let over = overlay.img.to_rgba8();
        let (base_w, base_h) = base.dimensions();

        for (ox, oy, pixel) in over.enumerate_pixels() {
            let tx = x + ox as i64;
            let ty = y + oy as i64;
            if tx < 0 || ty < 0 || tx >= base_w as i64 || ty >= base_h as i64 {
                continue;
            }
            let alpha = pixel[3] as f64 / 255.0 * opacity;
            if alpha <= 0.0 {
                continue;
            }
            let dst = base.get_pixel_mut(tx as u32, ty as u32);
            for c in 0..3 {
                dst[c] =
                    (pixel[c] as f64 * alpha + dst[c] as f64 * (1.0 - alpha)).round() as u8;
            }
            dst[3] = dst[3].max((alpha * 255.0).round() as u8);
        }

        let had_alpha = self.has_alpha();
        self.img = if had_alpha {
            DynamicImage::ImageRgba8(base)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(base).to_rgb8())
        };
    }

    /// Encode into `sink` as `format`.
    pub fn save(
        &self,
        sink: &mut dyn sink::ImageSink,
        format: ImageType,
        params: &codec::SaveParams,
    ) -> Result<(), EngineError> {
        codec::save(&self.img, sink, format, params)
    }

    #[cfg(test)]
    pub(crate) fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        self.img.to_rgba8().get_pixel(x, y).to_owned()
    }
}

/// Per-channel variance over a sampled window; a cheap detail proxy for
/// smart cropping.
fn region_variance(img: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> f64 {
    const SAMPLE_STEP: u32 = 4;
    let mut sum = [0u64; 3];
    let mut sum_sq = [0u64; 3];
    let mut count = 0u64;

    let mut py = y;
    while py < (y + height).min(img.height()) {
        let mut px = x;
        while px < (x + width).min(img.width()) {
            let pixel = img.get_pixel(px, py);
            for c in 0..3 {
                let v = pixel[c] as u64;
                sum[c] += v;
                sum_sq[c] += v * v;
            }
            count += 1;
            px += SAMPLE_STEP;
        }
        py += SAMPLE_STEP;
    }

    if count == 0 {
        return 0.0;
    }
    (0..3)
        .map(|c| {
            let mean = sum[c] as f64 / count as f64;
            sum_sq[c] as f64 / count as f64 - mean * mean
        })
        .sum()
}

/// Average of the four corner pixels, the smart-trim background estimate.
fn corner_average(img: &RgbaImage) -> [u8; 3] {
    let (w, h) = img.dimensions();
    let corners = [
        img.get_pixel(0, 0),
        img.get_pixel(w - 1, 0),
        img.get_pixel(0, h - 1),
        img.get_pixel(w - 1, h - 1),
    ];
    let mut avg = [0u32; 3];
    for p in corners {
        for c in 0..3 {
            avg[c] += p[c] as u32;
        }
    }
    [(avg[0] / 4) as u8, (avg[1] / 4) as u8, (avg[2] / 4) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TrimOptions;

    fn checkerboard(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_load_png() {
        let data = checkerboard(4, 4);
        let img = RasterImage::load(&data, ImageType::Png, 1, 1.0).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
    }

    #[test]
    fn test_load_rejects_unsupported() {
        let err = RasterImage::load(b"...", ImageType::Heic, 1, 1.0).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported { save: false, .. }));
    }

    #[test]
    fn test_load_with_shrink() {
        let data = checkerboard(16, 16);
        let img = RasterImage::load(&data, ImageType::Png, 4, 1.0).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
    }

    #[test]
    fn test_resize_to() {
        let data = checkerboard(16, 8);
        let mut img = RasterImage::load(&data, ImageType::Png, 1, 1.0).unwrap();
        img.resize_to(8, 4).unwrap();
        assert_eq!(img.dimensions(), (8, 4));
    }

    #[test]
    fn test_rotate_swaps_dimensions() {
        let data = checkerboard(8, 4);
        let mut img = RasterImage::load(&data, ImageType::Png, 1, 1.0).unwrap();
        img.rotate(90);
        assert_eq!(img.dimensions(), (4, 8));
        img.rotate(-90);
        assert_eq!(img.dimensions(), (8, 4));
    }

    #[test]
    fn test_crop_clamps_to_image() {
        let data = checkerboard(8, 8);
        let mut img = RasterImage::load(&data, ImageType::Png, 1, 1.0).unwrap();
        img.crop(4, 4, 100, 100).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
        assert!(img.crop(10, 0, 1, 1).is_err());
    }

    #[test]
    fn test_flatten_removes_alpha() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 127]));
        let mut raster = RasterImage::from_dynamic(DynamicImage::ImageRgba8(img));
        assert!(raster.has_alpha());
        raster.flatten(RgbColor::WHITE);
        assert!(!raster.has_alpha());
        // Half-transparent red over white gives a light red.
        let p = raster.pixel(0, 0);
        assert!(p[0] > 200 && p[1] > 100 && p[1] < 160);
    }

    #[test]
    fn test_trim_cuts_uniform_border() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        for y in 3..7 {
            for x in 2..8 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let mut raster = RasterImage::from_dynamic(DynamicImage::ImageRgba8(img));
        raster
            .trim(&TrimOptions {
                enabled: true,
                threshold: 10.0,
                color: Some(RgbColor::WHITE),
                ..TrimOptions::default()
            })
            .unwrap();
        assert_eq!(raster.dimensions(), (6, 4));
    }

    #[test]
    fn test_trim_uniform_image_is_noop() {
        let img = RgbaImage::from_pixel(6, 6, Rgba([9, 9, 9, 255]));
        let mut raster = RasterImage::from_dynamic(DynamicImage::ImageRgba8(img));
        raster
            .trim(&TrimOptions {
                enabled: true,
                threshold: 4.0,
                color: None,
                ..TrimOptions::default()
            })
            .unwrap();
        assert_eq!(raster.dimensions(), (6, 6));
    }

    #[test]
    fn test_ensure_alpha() {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([5, 6, 7]));
        let mut raster = RasterImage::from_dynamic(DynamicImage::ImageRgb8(img));
        assert!(!raster.has_alpha());
        raster.ensure_alpha();
        assert!(raster.has_alpha());
        assert_eq!(raster.pixel(0, 0), Rgba([5, 6, 7, 255]));
    }

    #[test]
    fn test_flip_horizontal() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let mut raster = RasterImage::from_dynamic(DynamicImage::ImageRgba8(img));
        raster.flip_horizontal();
        assert_eq!(raster.pixel(1, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_embed_pads_canvas() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let mut raster = RasterImage::from_dynamic(DynamicImage::ImageRgba8(img));
        raster.embed(6, 6, 2, 2, Some(RgbColor::WHITE)).unwrap();
        assert_eq!(raster.dimensions(), (6, 6));
        assert_eq!(raster.pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(raster.pixel(3, 3), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_linearize_roundtrip() {
        let data = checkerboard(4, 4);
        let mut img = RasterImage::load(&data, ImageType::Png, 1, 1.0).unwrap();
        let before = img.pixel(0, 0);
        img.linearize();
        assert!(img.linear);
        img.to_srgb();
        assert!(!img.linear);
        assert_eq!(img.pixel(0, 0), before);
    }

    #[test]
    fn test_smart_crop_prefers_detail() {
        // Detail lives in the bottom-right quadrant.
        let mut img = RgbaImage::from_pixel(40, 40, Rgba([128, 128, 128, 255]));
        for y in 20..40 {
            for x in 20..40 {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                img.put_pixel(x, y, Rgba([v, 255 - v, v, 255]));
            }
        }
        let mut raster = RasterImage::from_dynamic(DynamicImage::ImageRgba8(img));
        raster.smart_crop(20, 20).unwrap();
        assert_eq!(raster.dimensions(), (20, 20));
        // The chosen window should contain checkerboard pixels.
        let p = raster.pixel(10, 10);
        assert!(p[0] == 255 || p[0] == 0);
    }

    #[test]
    fn test_compose_at_blends() {
        let base = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let over = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let mut raster = RasterImage::from_dynamic(DynamicImage::ImageRgba8(base));
        let overlay = RasterImage::from_dynamic(DynamicImage::ImageRgba8(over));
        raster.compose_at(&overlay, 1, 1, 0.5);
        assert_eq!(raster.pixel(0, 0), Rgba([0, 0, 0, 255]));
        let blended = raster.pixel(1, 1);
        assert!(blended[0] > 100 && blended[0] < 160);
    }

    #[test]
    fn test_cast_uchar_drops_float() {
        let data = checkerboard(4, 4);
        let mut img = RasterImage::load(&data, ImageType::Png, 1, 1.0).unwrap();
        img.linearize();
        img.cast_uchar();
        assert!(!img.linear);
        assert!(matches!(
            img.img,
            DynamicImage::ImageRgba8(_) | DynamicImage::ImageRgb8(_)
        ));
    }
}
