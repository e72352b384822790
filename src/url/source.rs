//! Source URL decoding.
//!
//! The trailing path section carries the origin URL either as
//! `plain/<url>[@fmt]` (verbatim, optionally percent-encoded) or as a
//! URL-safe base64 segment with an optional `.<ext>` suffix.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use percent_encoding::percent_decode_str;

use crate::config::SecurityConfig;
use crate::error::ProxyError;
use crate::imagetype::ImageType;

/// A decoded source reference: the origin URL plus the format implied by
/// the URL suffix (`Unknown` when none was given).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    pub url: String,
    pub format: ImageType,
}

/// Decode the `plain/...` form. `segments` are the path segments after the
/// `plain` marker, rejoined to restore the slashes of the original URL.
pub fn decode_plain(segments: &[&str]) -> Result<SourceUrl, ProxyError> {
    if segments.is_empty() {
        return Err(ProxyError::invalid_url("missing source URL after plain marker"));
    }
    let joined = segments.join("/");

    let (url_part, format) = split_format_suffix(&joined)?;

    // The whole source may be percent-encoded once (to survive path
    // splitting); decode only when an escape is present so already-plain
    // URLs with literal `%` in query strings are left alone by the caller.
    let url = if url_part.contains('%') {
        percent_decode_str(url_part)
            .decode_utf8()
            .map_err(|_| ProxyError::invalid_url("source URL is not valid UTF-8"))?
            .into_owned()
    } else {
        url_part.to_string()
    };

    Ok(SourceUrl { url, format })
}

/// Decode the base64 form: the final path segment, optionally carrying a
/// `.<ext>` suffix that fixes the output format.
pub fn decode_base64(segment: &str) -> Result<SourceUrl, ProxyError> {
    let (b64, format) = match segment.rsplit_once('.') {
        Some((b64, ext)) if !b64.is_empty() => match ImageType::from_extension(ext) {
            Some(format) => (b64, format),
            None => (segment, ImageType::Unknown),
        },
        _ => (segment, ImageType::Unknown),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(b64)
        .map_err(|_| ProxyError::invalid_url("source URL is not valid base64"))?;
    let url = String::from_utf8(bytes)
        .map_err(|_| ProxyError::invalid_url("source URL is not valid UTF-8"))?;

    Ok(SourceUrl { url, format })
}

/// Split a trailing `@fmt` specifier off a plain source URL.
fn split_format_suffix(joined: &str) -> Result<(&str, ImageType), ProxyError> {
    match joined.rsplit_once('@') {
        Some((url, ext)) if !url.is_empty() => match ImageType::from_extension(ext) {
            Some(format) => Ok((url, format)),
            None => Err(ProxyError::invalid_url(format!(
                "unknown format specifier: @{}",
                ext
            ))),
        },
        _ => Ok((joined, ImageType::Unknown)),
    }
}

/// Prepend the configured base URL to scheme-less sources and check the
/// result against the allowed-source prefixes.
pub fn resolve_source(
    source: SourceUrl,
    security: &SecurityConfig,
) -> Result<SourceUrl, ProxyError> {
    let mut url = source.url;
    if !security.base_url.is_empty() && !url.contains("://") {
        url = format!("{}{}", security.base_url, url);
    }

    if !security.allowed_sources.is_empty()
        && !security
            .allowed_sources
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
    {
        return Err(ProxyError::SourceNotAllowed { source: url });
    }

    Ok(SourceUrl {
        url,
        format: source.format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_with_format() {
        let src = decode_plain(&["http:", "", "images.dev", "lorem", "ipsum.jpg@png"]).unwrap();
        assert_eq!(src.url, "http://images.dev/lorem/ipsum.jpg");
        assert_eq!(src.format, ImageType::Png);
    }

    #[test]
    fn test_plain_without_format() {
        let src = decode_plain(&["http:", "", "images.dev", "a.jpg"]).unwrap();
        assert_eq!(src.url, "http://images.dev/a.jpg");
        assert_eq!(src.format, ImageType::Unknown);
    }

    #[test]
    fn test_plain_percent_decoded_once() {
        let src = decode_plain(&["http:", "", "images.dev", "a.jpg%3Fparam%3Dvalue@png"]).unwrap();
        assert_eq!(src.url, "http://images.dev/a.jpg?param=value");
        assert_eq!(src.format, ImageType::Png);
    }

    #[test]
    fn test_plain_unknown_format_suffix() {
        assert!(decode_plain(&["http:", "", "x", "a.jpg@exe"]).is_err());
    }

    #[test]
    fn test_base64_with_extension() {
        let url = "http://images.dev/lorem/ipsum.jpg?param=value";
        let b64 = URL_SAFE_NO_PAD.encode(url);
        let src = decode_base64(&format!("{}.png", b64)).unwrap();
        assert_eq!(src.url, url);
        assert_eq!(src.format, ImageType::Png);
    }

    #[test]
    fn test_base64_without_extension() {
        let url = "http://images.dev/lorem/ipsum.jpg";
        let src = decode_base64(&URL_SAFE_NO_PAD.encode(url)).unwrap();
        assert_eq!(src.url, url);
        assert_eq!(src.format, ImageType::Unknown);
    }

    #[test]
    fn test_base64_invalid() {
        assert!(decode_base64("!!not-base64!!").is_err());
    }

    #[test]
    fn test_resolve_prepends_base_url() {
        let security = SecurityConfig {
            base_url: "http://images.dev/".into(),
            ..SecurityConfig::default()
        };
        let src = resolve_source(
            SourceUrl {
                url: "lorem/ipsum.jpg".into(),
                format: ImageType::Unknown,
            },
            &security,
        )
        .unwrap();
        assert_eq!(src.url, "http://images.dev/lorem/ipsum.jpg");
    }

    #[test]
    fn test_resolve_keeps_absolute_url() {
        let security = SecurityConfig {
            base_url: "http://images.dev/".into(),
            ..SecurityConfig::default()
        };
        let src = resolve_source(
            SourceUrl {
                url: "https://cdn.example.com/a.jpg".into(),
                format: ImageType::Unknown,
            },
            &security,
        )
        .unwrap();
        assert_eq!(src.url, "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn test_resolve_allowed_sources() {
        let security = SecurityConfig {
            allowed_sources: vec!["local://".into(), "http://images.dev/".into()],
            ..SecurityConfig::default()
        };
        assert!(resolve_source(
            SourceUrl {
                url: "http://images.dev/a.jpg".into(),
                format: ImageType::Unknown,
            },
            &security,
        )
        .is_ok());

        let err = resolve_source(
            SourceUrl {
                url: "s3://images/a.jpg".into(),
                format: ImageType::Unknown,
            },
            &security,
        )
        .unwrap_err();
        assert!(matches!(err, ProxyError::SourceNotAllowed { .. }));
    }
}
