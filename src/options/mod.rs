//! Processing option model.
//!
//! A [`ProcessingOptions`] value is built by the URL parser and consumed by
//! the pipeline driver. Everything here is plain data; validation happens in
//! the parser's setters so that a constructed record is always in range.

use std::str::FromStr;

use serde::Serialize;

use crate::constants::DEFAULT_QUALITY;
use crate::error::ProxyError;
use crate::imagetype::ImageType;

/// How the source is scaled into the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResizingType {
    /// Scale to fit inside width×height, preserving aspect ratio.
    #[default]
    Fit,
    /// Scale to cover width×height, then crop to it.
    Fill,
    /// Like fill, but never upscale; the box shrinks instead.
    FillDown,
    /// Stretch to exactly width×height.
    Force,
    /// Fit or fill depending on source and target orientation.
    Auto,
}

impl FromStr for ResizingType {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fit" => Ok(ResizingType::Fit),
            "fill" => Ok(ResizingType::Fill),
            "fill-down" => Ok(ResizingType::FillDown),
            "force" => Ok(ResizingType::Force),
            "auto" => Ok(ResizingType::Auto),
            _ => Err(ProxyError::invalid_option(format!(
                "unknown resizing type: {}",
                s
            ))),
        }
    }
}

/// Anchor for crop, extend and watermark placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GravityType {
    #[default]
    Center,
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
    /// Content-aware placement.
    Smart,
    /// Relative focus point; `x`/`y` are in `[0, 1]`.
    FocusPoint,
}

impl FromStr for GravityType {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ce" | "center" => Ok(GravityType::Center),
            "no" | "north" => Ok(GravityType::North),
            "so" | "south" => Ok(GravityType::South),
            "ea" | "east" => Ok(GravityType::East),
            "we" | "west" => Ok(GravityType::West),
            "noea" | "northeast" => Ok(GravityType::NorthEast),
            "nowe" | "northwest" => Ok(GravityType::NorthWest),
            "soea" | "southeast" => Ok(GravityType::SouthEast),
            "sowe" | "southwest" => Ok(GravityType::SouthWest),
            "sm" | "smart" => Ok(GravityType::Smart),
            "fp" | "focus-point" => Ok(GravityType::FocusPoint),
            _ => Err(ProxyError::invalid_option(format!("unknown gravity: {}", s))),
        }
    }
}

/// Gravity with optional offsets.
///
/// For compass gravities `x`/`y` are pixel offsets from the anchored edge;
/// for [`GravityType::FocusPoint`] they are relative coordinates in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct Gravity {
    #[serde(rename = "type")]
    pub gravity_type: GravityType,
    pub x: f64,
    pub y: f64,
}

impl Gravity {
    pub fn new(gravity_type: GravityType) -> Self {
        Self {
            gravity_type,
            x: 0.0,
            y: 0.0,
        }
    }
}

/// An RGB color, parsed from `R:G:B` decimal args or 3/6-digit hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const WHITE: RgbColor = RgbColor {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Parse a 3- or 6-digit hex color (no `#` prefix in the URL DSL,
    /// but one is tolerated).
    pub fn from_hex(hex: &str) -> Result<RgbColor, ProxyError> {
        let hex = hex.trim_start_matches('#');
        let expand = |c: u8| (c << 4) | c;
        match hex.len() {
            3 => {
                let v = u16::from_str_radix(hex, 16)
                    .map_err(|_| ProxyError::invalid_option(format!("invalid hex color: {}", hex)))?;
                Ok(RgbColor {
                    r: expand(((v >> 8) & 0xF) as u8),
                    g: expand(((v >> 4) & 0xF) as u8),
                    b: expand((v & 0xF) as u8),
                })
            }
            6 => {
                let v = u32::from_str_radix(hex, 16)
                    .map_err(|_| ProxyError::invalid_option(format!("invalid hex color: {}", hex)))?;
                Ok(RgbColor {
                    r: ((v >> 16) & 0xFF) as u8,
                    g: ((v >> 8) & 0xFF) as u8,
                    b: (v & 0xFF) as u8,
                })
            }
            _ => Err(ProxyError::invalid_option(format!(
                "hex color must have 3 or 6 digits: {}",
                hex
            ))),
        }
    }
}

/// Canvas extension to the requested box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct ExtendOptions {
    pub enabled: bool,
    pub gravity: Gravity,
}

/// Explicit crop rectangle, applied before resizing.
///
/// A zero width or height means "full extent on that axis". A `None`
/// gravity falls back to the request-level gravity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct CropOptions {
    pub width: u32,
    pub height: u32,
    pub gravity: Option<Gravity>,
}

/// Fixed border added after resizing, CSS shorthand order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct PaddingOptions {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl PaddingOptions {
    pub fn is_set(&self) -> bool {
        self.top > 0 || self.right > 0 || self.bottom > 0 || self.left > 0
    }
}

/// Border trimming.
///
/// With `smart` the background color is sampled from the image corners;
/// otherwise `color` (defaulting to the top-left pixel) is used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct TrimOptions {
    pub enabled: bool,
    pub threshold: f64,
    pub color: Option<RgbColor>,
    pub equal_hor: bool,
    pub equal_ver: bool,
    pub smart: bool,
}

/// Watermark overlay parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WatermarkOptions {
    pub enabled: bool,
    pub opacity: f64,
    pub gravity: Gravity,
    /// Watermark width relative to the image width; 0 keeps native size.
    pub scale: f64,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            opacity: 1.0,
            gravity: Gravity::new(GravityType::Center),
            scale: 0.0,
        }
    }
}

/// The full, validated option record for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingOptions {
    pub resizing_type: ResizingType,
    /// Target width in pixels; 0 leaves the axis unconstrained.
    pub width: u32,
    /// Target height in pixels; 0 leaves the axis unconstrained.
    pub height: u32,
    /// Device pixel ratio multiplier applied to width/height.
    pub dpr: f64,
    pub enlarge: bool,
    pub extend: ExtendOptions,
    pub gravity: Gravity,
    pub crop: CropOptions,
    pub padding: PaddingOptions,
    pub trim: TrimOptions,
    pub background: RgbColor,
    /// Set whenever a background is set; forces compositing onto it.
    pub flatten: bool,
    pub blur: f32,
    pub sharpen: f32,
    /// Requested rotation, a multiple of 90 degrees.
    pub rotate: i32,
    pub quality: u8,
    /// Byte cap for lossy output; 0 disables the requantization loop.
    pub max_bytes: usize,
    pub format: ImageType,
    pub watermark: WatermarkOptions,
    pub prefer_webp: bool,
    pub enforce_webp: bool,
    pub strip_metadata: bool,
    pub auto_rotate: bool,
    /// Opaque cache key component; never interpreted.
    pub cache_buster: String,
    /// Overrides the Content-Disposition filename when non-empty.
    pub filename: String,
    /// Presets already expanded into this record, in application order.
    pub used_presets: Vec<String>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            resizing_type: ResizingType::Fit,
            width: 0,
            height: 0,
            dpr: 1.0,
            enlarge: false,
            extend: ExtendOptions::default(),
            gravity: Gravity::new(GravityType::Center),
            crop: CropOptions::default(),
            padding: PaddingOptions::default(),
            trim: TrimOptions::default(),
            background: RgbColor::default(),
            flatten: false,
            blur: 0.0,
            sharpen: 0.0,
            rotate: 0,
            quality: DEFAULT_QUALITY,
            max_bytes: 0,
            format: ImageType::Unknown,
            watermark: WatermarkOptions::default(),
            prefer_webp: false,
            enforce_webp: false,
            strip_metadata: true,
            auto_rotate: true,
            cache_buster: String::new(),
            filename: String::new(),
            used_presets: Vec::new(),
        }
    }
}

impl ProcessingOptions {
    /// Record a preset as used. Returns false if it was already applied,
    /// which the parser treats as "silently skip" (cycle elimination).
    pub fn mark_preset_used(&mut self, name: &str) -> bool {
        if self.used_presets.iter().any(|p| p == name) {
            return false;
        }
        self.used_presets.push(name.to_string());
        true
    }
}
