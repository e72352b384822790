//! Startup-loaded image assets.
//!
//! The watermark and fallback images are read once at startup, validated,
//! and kept immutable for the process lifetime. The driver re-decodes the
//! watermark per request so no raster state is shared between requests.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::{AssetSource, AssetsConfig};
use crate::fetch::ImageData;
use crate::imagetype::ImageType;

/// Immutable asset store.
#[derive(Debug, Clone, Default)]
pub struct Assets {
    watermark: Option<ImageData>,
    watermark_opacity: f64,
    fallback: Option<ImageData>,
}

impl Assets {
    /// Load the configured assets; absent assets are not an error.
    pub fn load(conf: &AssetsConfig) -> Result<Assets, String> {
        Ok(Assets {
            watermark: load_source(&conf.watermark, "watermark")?,
            watermark_opacity: conf.watermark_opacity,
            fallback: load_source(&conf.fallback, "fallback")?,
        })
    }

    /// An empty store for configurations (and tests) without assets.
    pub fn none() -> Assets {
        Assets {
            watermark: None,
            watermark_opacity: 1.0,
            fallback: None,
        }
    }

    /// Build a store from raw bytes; used by tests.
    pub fn from_parts(watermark: Option<Vec<u8>>, fallback: Option<Vec<u8>>) -> Assets {
        Assets {
            watermark: watermark.map(ImageData::new),
            watermark_opacity: 1.0,
            fallback: fallback.map(ImageData::new),
        }
    }

    pub fn watermark(&self) -> Option<&ImageData> {
        self.watermark.as_ref()
    }

    pub fn fallback(&self) -> Option<&ImageData> {
        self.fallback.as_ref()
    }

    pub fn watermark_opacity(&self) -> f64 {
        self.watermark_opacity
    }
}

fn load_source(source: &AssetSource, what: &str) -> Result<Option<ImageData>, String> {
    let bytes = if !source.path.is_empty() {
        std::fs::read(&source.path)
            .map_err(|e| format!("cannot read {} image {}: {}", what, source.path, e))?
    } else if !source.data.is_empty() {
        STANDARD
            .decode(&source.data)
            .map_err(|e| format!("{} image data is not valid base64: {}", what, e))?
    } else {
        return Ok(None);
    };

    let image = ImageData::new(bytes);
    if image.format == ImageType::Unknown {
        return Err(format!("{} image has an unrecognized format", what));
    }
    if !image.format.load_support() {
        return Err(format!(
            "{} image type {} cannot be decoded",
            what,
            image.format.ext()
        ));
    }
    Ok(Some(image))
}
