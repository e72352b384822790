//! Image type handling: detection, MIME/extension mapping, codec support.
//!
//! Not every type the URL DSL can name is loadable or saveable by the
//! engine, so support is tracked with explicit maps the same way the
//! pipeline decides format fallbacks.

use serde::Serialize;

/// Image formats understood by the URL DSL.
///
/// `Unknown` means "not specified in the URL"; the orchestrator resolves it
/// during content negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[default]
    Unknown,
    Jpeg,
    Png,
    WebP,
    Gif,
    Avif,
    Heic,
    Bmp,
    Tiff,
    Ico,
}

impl ImageType {
    /// Parse a file extension or format atom argument.
    pub fn from_extension(ext: &str) -> Option<ImageType> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageType::Jpeg),
            "png" => Some(ImageType::Png),
            "webp" => Some(ImageType::WebP),
            "gif" => Some(ImageType::Gif),
            "avif" => Some(ImageType::Avif),
            "heic" | "heif" => Some(ImageType::Heic),
            "bmp" => Some(ImageType::Bmp),
            "tif" | "tiff" => Some(ImageType::Tiff),
            "ico" => Some(ImageType::Ico),
            _ => None,
        }
    }

    /// Detect the type of raw image bytes from magic numbers.
    pub fn detect(data: &[u8]) -> ImageType {
        if data.len() < 12 {
            return ImageType::Unknown;
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            ImageType::Jpeg
        } else if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            ImageType::Png
        } else if &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            ImageType::WebP
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            ImageType::Gif
        } else if &data[4..8] == b"ftyp" && (&data[8..12] == b"avif" || &data[8..12] == b"avis") {
            ImageType::Avif
        } else if &data[4..8] == b"ftyp" && (&data[8..12] == b"heic" || &data[8..12] == b"heix") {
            ImageType::Heic
        } else if data.starts_with(b"BM") {
            ImageType::Bmp
        } else if data.starts_with(&[0x49, 0x49, 0x2A, 0x00])
            || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
        {
            ImageType::Tiff
        } else if data.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
            ImageType::Ico
        } else {
            ImageType::Unknown
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "image/jpeg",
            ImageType::Png => "image/png",
            ImageType::WebP => "image/webp",
            ImageType::Gif => "image/gif",
            ImageType::Avif => "image/avif",
            ImageType::Heic => "image/heif",
            ImageType::Bmp => "image/bmp",
            ImageType::Tiff => "image/tiff",
            ImageType::Ico => "image/x-icon",
            ImageType::Unknown => "application/octet-stream",
        }
    }

    pub fn ext(&self) -> &'static str {
        match self {
            ImageType::Jpeg => "jpg",
            ImageType::Png => "png",
            ImageType::WebP => "webp",
            ImageType::Gif => "gif",
            ImageType::Avif => "avif",
            ImageType::Heic => "heic",
            ImageType::Bmp => "bmp",
            ImageType::Tiff => "tiff",
            ImageType::Ico => "ico",
            ImageType::Unknown => "",
        }
    }

    /// Whether the engine can decode this type.
    pub fn load_support(&self) -> bool {
        matches!(
            self,
            ImageType::Jpeg
                | ImageType::Png
                | ImageType::WebP
                | ImageType::Gif
                | ImageType::Bmp
                | ImageType::Tiff
                | ImageType::Ico
        )
    }

    /// Whether the engine can encode this type.
    pub fn save_support(&self) -> bool {
        matches!(
            self,
            ImageType::Jpeg
                | ImageType::Png
                | ImageType::WebP
                | ImageType::Gif
                | ImageType::Bmp
                | ImageType::Tiff
                | ImageType::Ico
        )
    }

    /// Formats that make sense to serve to browsers unconverted.
    pub fn good_for_web(&self) -> bool {
        matches!(
            self,
            ImageType::Jpeg | ImageType::Png | ImageType::WebP | ImageType::Gif | ImageType::Ico
        )
    }

    /// Whether the encoded form can carry an alpha channel.
    pub fn supports_alpha(&self) -> bool {
        matches!(
            self,
            ImageType::Png | ImageType::WebP | ImageType::Gif | ImageType::Avif | ImageType::Ico
        )
    }

    /// Whether `quality` participates in encoding for this type.
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageType::Jpeg | ImageType::WebP | ImageType::Avif)
    }

    /// `Content-Disposition` for an explicit filename (extension replaced
    /// with the output type's).
    pub fn content_disposition(&self, filename: &str) -> String {
        let stem = match filename.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => filename,
        };
        format!("inline; filename=\"{}.{}\"", stem, self.ext())
    }

    /// `Content-Disposition` derived from the source URL's basename.
    pub fn content_disposition_from_url(&self, url: &str) -> String {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let basename = path.rsplit('/').next().unwrap_or("image");
        let basename = if basename.is_empty() { "image" } else { basename };
        self.content_disposition(basename)
    }
}
