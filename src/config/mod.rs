//! Configuration loading and validation.
//!
//! The configuration is a YAML file deserialized with serde. Every field
//! has a default so a minimal file (or none of a section) is valid; the
//! binary calls [`Config::validate`] once at startup and the record is
//! read-only afterwards. Tests construct their own copies.

pub mod presets;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BIND, DEFAULT_CONCURRENCY, DEFAULT_DOWNLOAD_MAX_BYTES, DEFAULT_GZIP_BUFFER_SIZE,
    DEFAULT_PORT, DEFAULT_TTL_SECS, DEFAULT_WATERMARK_OPACITY, DEFAULT_WRITE_TIMEOUT_SECS,
};
use crate::imagetype::ImageType;

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_write_timeout() -> u64 {
    DEFAULT_WRITE_TIMEOUT_SECS
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_true() -> bool {
    true
}

fn default_gzip_buffer_size() -> usize {
    DEFAULT_GZIP_BUFFER_SIZE
}

fn default_max_src_file_size() -> usize {
    DEFAULT_DOWNLOAD_MAX_BYTES
}

fn default_png_quantization_colors() -> u16 {
    256
}

fn default_watermark_opacity() -> f64 {
    DEFAULT_WATERMARK_OPACITY
}

/// Server and response-shaping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of requests processed concurrently; also sizes the pools.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-request deadline in seconds, started at admission.
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,
    /// `max-age` used when synthesizing cache headers, in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    /// Forward origin Cache-Control/Expires instead of synthesizing.
    #[serde(default)]
    pub cache_control_passthrough: bool,
    #[serde(default = "default_true")]
    pub etag_enabled: bool,
    /// Gzip level 0-9; 0 disables response compression.
    #[serde(default)]
    pub gzip_compression: u32,
    #[serde(default = "default_gzip_buffer_size")]
    pub gzip_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            concurrency: default_concurrency(),
            write_timeout: default_write_timeout(),
            ttl: default_ttl(),
            cache_control_passthrough: false,
            etag_enabled: true,
            gzip_compression: 0,
            gzip_buffer_size: default_gzip_buffer_size(),
        }
    }
}

/// Content negotiation and client-hint switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NegotiationConfig {
    #[serde(default)]
    pub enable_webp_detection: bool,
    #[serde(default)]
    pub enforce_webp: bool,
    #[serde(default)]
    pub enable_client_hints: bool,
}

/// URL signing and source restrictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Accept the literal `unsafe` signature segment.
    #[serde(default = "default_true")]
    pub allow_insecure: bool,
    /// HMAC keys; a signature verifying against any (key, salt) pair passes.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Salts, paired with `keys` by index.
    #[serde(default)]
    pub salts: Vec<String>,
    /// Prepended to decoded source URLs without a scheme.
    #[serde(default)]
    pub base_url: String,
    /// Source URL prefixes accepted; empty allows everything.
    #[serde(default)]
    pub allowed_sources: Vec<String>,
    /// Cap on source download size, in bytes.
    #[serde(default = "default_max_src_file_size")]
    pub max_src_file_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_insecure: true,
            keys: Vec::new(),
            salts: Vec::new(),
            base_url: String::new(),
            allowed_sources: Vec::new(),
            max_src_file_size: default_max_src_file_size(),
        }
    }
}

/// Preset definitions.
///
/// Each value is a slash-separated list of option atoms exactly as they
/// would appear in a URL, e.g. `resizing_type:fill/blur:0.2`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetsConfig {
    /// Treat every URL option atom as a preset reference.
    #[serde(default)]
    pub only_presets: bool,
    #[serde(default)]
    pub map: HashMap<String, String>,
}

/// Encoder switches passed down to the raster engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    #[serde(default)]
    pub jpeg_progressive: bool,
    #[serde(default)]
    pub png_interlaced: bool,
    #[serde(default)]
    pub png_quantize: bool,
    #[serde(default = "default_png_quantization_colors")]
    pub png_quantization_colors: u16,
    /// Source types streamed through untouched when the requested format
    /// matches (or is unspecified).
    #[serde(default)]
    pub skip_processing_formats: Vec<String>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            jpeg_progressive: false,
            png_interlaced: false,
            png_quantize: false,
            png_quantization_colors: default_png_quantization_colors(),
            skip_processing_formats: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Parsed form of `skip_processing_formats`; unknown names were already
    /// rejected by `validate()`.
    pub fn skip_formats(&self) -> Vec<ImageType> {
        self.skip_processing_formats
            .iter()
            .filter_map(|s| ImageType::from_extension(s))
            .collect()
    }
}

/// One startup-loaded image asset: a file path or inline base64 data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetSource {
    #[serde(default)]
    pub path: String,
    /// Base64-encoded image bytes; takes effect when `path` is empty.
    #[serde(default)]
    pub data: String,
}

impl AssetSource {
    pub fn is_configured(&self) -> bool {
        !self.path.is_empty() || !self.data.is_empty()
    }
}

/// Watermark and fallback asset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default)]
    pub watermark: AssetSource,
    /// Global multiplier on the per-request watermark opacity.
    #[serde(default = "default_watermark_opacity")]
    pub watermark_opacity: f64,
    #[serde(default)]
    pub fallback: AssetSource,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            watermark: AssetSource::default(),
            watermark_opacity: default_watermark_opacity(),
            fallback: AssetSource::default(),
        }
    }
}

/// Root configuration record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub presets: PresetsConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Config, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        let config: Config =
            serde_yaml::from_str(&raw).map_err(|e| format!("invalid config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that cannot be expressed in serde defaults.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.concurrency == 0 {
            return Err("server.concurrency must be positive".into());
        }
        if self.server.write_timeout == 0 {
            return Err("server.write_timeout must be positive".into());
        }
        if self.server.gzip_compression > 9 {
            return Err("server.gzip_compression must be 0-9".into());
        }
        if !self.security.allow_insecure && self.security.keys.is_empty() {
            return Err("signature keys are required when allow_insecure is false".into());
        }
        if self.security.keys.len() != self.security.salts.len() {
            return Err("security.keys and security.salts must have the same length".into());
        }
        if !(0.0..=1.0).contains(&self.assets.watermark_opacity) {
            return Err("assets.watermark_opacity must be within 0..1".into());
        }
        for name in &self.encoding.skip_processing_formats {
            if ImageType::from_extension(name).is_none() {
                return Err(format!("unknown skip_processing format: {}", name));
            }
        }
        for (name, value) in &self.presets.map {
            presets::parse_preset_atoms(value)
                .map_err(|e| format!("preset {}: {}", name, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.server.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.server.write_timeout, DEFAULT_WRITE_TIMEOUT_SECS);
        assert!(config.server.etag_enabled);
        assert!(config.security.allow_insecure);
        assert!(config.presets.map.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_yaml_roundtrip() {
        let yaml = r#"
server:
  bind: "127.0.0.1"
  port: 9090
  concurrency: 8
  write_timeout: 5
  ttl: 600
  gzip_compression: 6
negotiation:
  enable_webp_detection: true
  enable_client_hints: true
security:
  allow_insecure: false
  keys: ["test-key"]
  salts: ["test-salt"]
  base_url: "http://images.dev/"
  allowed_sources: ["http://images.dev/"]
presets:
  map:
    thumb: "resizing_type:fill/size:100:100"
encoding:
  jpeg_progressive: true
  skip_processing_formats: ["gif"]
assets:
  watermark_opacity: 0.5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.gzip_compression, 6);
        assert!(!config.security.allow_insecure);
        assert_eq!(config.security.keys, vec!["test-key"]);
        assert_eq!(config.encoding.skip_formats(), vec![ImageType::Gif]);
        assert!(config.presets.map.contains_key("thumb"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.server.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_keyless_secure_mode() {
        let mut config = Config::default();
        config.security.allow_insecure = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_salts() {
        let mut config = Config::default();
        config.security.keys = vec!["k".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_preset() {
        let mut config = Config::default();
        config
            .presets
            .map
            .insert("bad".into(), "quality:not-a-number".into());
        // Preset atoms are only shape-checked at startup; arguments are
        // validated when the preset is applied. A malformed atom list
        // (empty name) is the startup failure case.
        config.presets.map.insert("worse".into(), ":".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_skip_format() {
        let mut config = Config::default();
        config.encoding.skip_processing_formats = vec!["exe".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_gzip_level_out_of_range() {
        let mut config = Config::default();
        config.server.gzip_compression = 10;
        assert!(config.validate().is_err());
    }
}
