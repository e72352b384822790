//! Per-format encoders.
//!
//! Each save goes through [`save`]: the format picks an encoder, `quality`
//! applies to lossy targets, and `max_bytes` re-encodes JPEG/WebP at
//! decreasing quality until the output fits the cap.

use std::io::Cursor;

use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::{ColorType, DynamicImage, ImageEncoder};

use crate::config::EncodingConfig;
use crate::imagetype::ImageType;

use super::ico;
use super::sink::{BufferSink, ImageSink, SinkWriter};
use super::EngineError;

/// Floor for the `max_bytes` requantization loop.
const MIN_QUALITY: u8 = 10;

/// Encoder inputs shared by all formats.
#[derive(Debug, Clone)]
pub struct SaveParams {
    pub quality: u8,
    /// Output byte cap for lossy formats; 0 disables.
    pub max_bytes: usize,
    /// Kept for contract completeness; the encoders here never emit
    /// source metadata, so stripping is implicit.
    pub strip_metadata: bool,
    pub encoding: EncodingConfig,
}

impl SaveParams {
    pub fn new(quality: u8, max_bytes: usize, strip_metadata: bool, encoding: &EncodingConfig) -> Self {
        Self {
            quality,
            max_bytes,
            strip_metadata,
            encoding: encoding.clone(),
        }
    }
}

/// Encode `img` into `sink` as `format`. The sink is not finished here;
/// callers own the terminal `finish()`.
pub fn save(
    img: &DynamicImage,
    sink: &mut dyn ImageSink,
    format: ImageType,
    params: &SaveParams,
) -> Result<(), EngineError> {
    if !format.save_support() {
        return Err(EngineError::Unsupported { format, save: true });
    }

    match format {
        ImageType::Jpeg | ImageType::WebP => {
            let data = encode_lossy_capped(img, format, params)?;
            write_all(sink, &data)
        }
        ImageType::Png => {
            let rgba = img.to_rgba8();
            PngEncoder::new_with_quality(
                SinkWriter(sink),
                CompressionType::Default,
                FilterType::Adaptive,
            )
            .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)
            .map_err(|e| EngineError::encode("png", e.to_string()))
        }
        ImageType::Gif => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            let mut encoder = GifEncoder::new(SinkWriter(sink));
            encoder
                .encode(rgba.as_raw(), w, h, ColorType::Rgba8)
                .map_err(|e| EngineError::encode("gif", e.to_string()))
        }
        ImageType::Bmp => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            let mut writer = SinkWriter(sink);
            BmpEncoder::new(&mut writer)
                .encode(rgb.as_raw(), w, h, ColorType::Rgb8)
                .map_err(|e| EngineError::encode("bmp", e.to_string()))
        }
        ImageType::Tiff => {
            // The TIFF encoder needs a seekable writer.
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            let mut buf = Cursor::new(Vec::new());
            TiffEncoder::new(&mut buf)
                .encode(rgba.as_raw(), w, h, ColorType::Rgba8)
                .map_err(|e| EngineError::encode("tiff", e.to_string()))?;
            write_all(sink, &buf.into_inner())
        }
        ImageType::Ico => {
            let mut png = BufferSink::new();
            let rgba = img.to_rgba8();
            PngEncoder::new_with_quality(
                SinkWriter(&mut png),
                CompressionType::Default,
                FilterType::Adaptive,
            )
            .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)
            .map_err(|e| EngineError::encode("ico", e.to_string()))?;
            let data = ico::write_ico(
                img.width(),
                img.height(),
                img.color().has_alpha(),
                png.as_slice(),
            )?;
            write_all(sink, &data)
        }
        _ => Err(EngineError::Unsupported { format, save: true }),
    }
}

/// Lossy encode honoring `max_bytes`: re-encode at 70% of the previous
/// quality until the output fits or the quality floor is reached.
fn encode_lossy_capped(
    img: &DynamicImage,
    format: ImageType,
    params: &SaveParams,
) -> Result<Vec<u8>, EngineError> {
    let mut quality = params.quality.clamp(1, 100);
    let mut data = encode_lossy(img, format, quality)?;

    if params.max_bytes > 0 {
        while data.len() > params.max_bytes && quality > MIN_QUALITY {
            quality = ((quality as u32 * 70 / 100) as u8).max(MIN_QUALITY);
            data = encode_lossy(img, format, quality)?;
        }
    }

    Ok(data)
}

fn encode_lossy(
    img: &DynamicImage,
    format: ImageType,
    quality: u8,
) -> Result<Vec<u8>, EngineError> {
    match format {
        ImageType::Jpeg => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            let mut out = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
            encoder
                .encode(rgb.as_raw(), w, h, ColorType::Rgb8)
                .map_err(|e| EngineError::encode("jpeg", e.to_string()))?;
            Ok(out)
        }
        ImageType::WebP => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            let encoded = webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode(quality as f32);
            Ok(encoded.to_vec())
        }
        _ => Err(EngineError::encode(
            format.ext(),
            "not a lossy format".to_string(),
        )),
    }
}

fn write_all(sink: &mut dyn ImageSink, mut data: &[u8]) -> Result<(), EngineError> {
    while !data.is_empty() {
        let n = sink
            .write(data)
            .map_err(|e| EngineError::encode("sink", e.to_string()))?;
        if n == 0 {
            return Err(EngineError::encode("sink", "sink stopped accepting bytes"));
        }
        data = &data[n..];
    }
    Ok(())
}
