//! Request-scoped error type.
//!
//! Every failure that can surface from a request is one of these variants.
//! The HTTP boundary is the only place that turns them into status codes;
//! everything below it propagates `Result`s.

use std::fmt;

/// Errors produced while serving a processing request.
///
/// Each variant maps to an HTTP status via [`ProxyError::to_http_status`]
/// and carries a public message (safe to return to the client) separate
/// from internal detail (logged only). `unexpected()` marks errors that
/// should be forwarded to the error sink.
#[derive(Debug, Clone)]
pub enum ProxyError {
    /// The path signature did not verify against any configured key/salt pair.
    InvalidSignature,

    /// The decoded source URL is not covered by `allowed_sources`.
    SourceNotAllowed { source: String },

    /// An option atom failed to parse or validate.
    InvalidOption { message: String },

    /// The request path itself is malformed (missing source, bad base64, ...).
    InvalidUrl { message: String },

    /// The downloader could not produce source bytes.
    Fetch {
        message: String,
        /// Status reported by the origin, if any.
        status: Option<u16>,
        /// Unexpected failures are reported to the error sink.
        unexpected: bool,
    },

    /// The raster engine failed mid-pipeline.
    Processing { message: String },

    /// The per-request deadline expired.
    Timeout,

    /// The client went away before the request was admitted.
    Cancelled,
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::InvalidSignature => write!(f, "Invalid signature"),
            ProxyError::SourceNotAllowed { source } => {
                write!(f, "Source URL is not allowed: {}", source)
            }
            ProxyError::InvalidOption { message } => {
                write!(f, "Invalid processing option: {}", message)
            }
            ProxyError::InvalidUrl { message } => write!(f, "Invalid URL: {}", message),
            ProxyError::Fetch {
                message, status, ..
            } => {
                write!(f, "Could not download source image: {}", message)?;
                if let Some(code) = status {
                    write!(f, " [origin status: {}]", code)?;
                }
                Ok(())
            }
            ProxyError::Processing { message } => {
                write!(f, "Image processing failed: {}", message)
            }
            ProxyError::Timeout => write!(f, "Request timed out"),
            ProxyError::Cancelled => write!(f, "Request was cancelled before processing"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl ProxyError {
    /// HTTP status for this error.
    ///
    /// - `InvalidSignature` → 403
    /// - `SourceNotAllowed` → 404
    /// - `InvalidOption`, `InvalidUrl` → 422
    /// - `Fetch` → origin 404 is forwarded, everything else is 500
    /// - `Processing`, `Timeout` → 500
    /// - `Cancelled` → 499 (client closed request)
    pub fn to_http_status(&self) -> u16 {
        match self {
            ProxyError::InvalidSignature => 403,
            ProxyError::SourceNotAllowed { .. } => 404,
            ProxyError::InvalidOption { .. } | ProxyError::InvalidUrl { .. } => 422,
            ProxyError::Fetch { status, .. } => match status {
                Some(404) => 404,
                _ => 500,
            },
            ProxyError::Processing { .. } | ProxyError::Timeout => 500,
            ProxyError::Cancelled => 499,
        }
    }

    /// Whether this error should be forwarded to the error sink.
    ///
    /// User errors (bad signature, bad options, disallowed source) are not
    /// reported; processing failures always are; fetch failures only when
    /// flagged unexpected.
    pub fn unexpected(&self) -> bool {
        match self {
            ProxyError::Processing { .. } => true,
            ProxyError::Fetch { unexpected, .. } => *unexpected,
            _ => false,
        }
    }

    pub fn invalid_option(message: impl Into<String>) -> Self {
        ProxyError::InvalidOption {
            message: message.into(),
        }
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        ProxyError::InvalidUrl {
            message: message.into(),
        }
    }

    pub fn fetch(message: impl Into<String>, status: Option<u16>) -> Self {
        ProxyError::Fetch {
            message: message.into(),
            status,
            unexpected: false,
        }
    }

    pub fn fetch_unexpected(message: impl Into<String>) -> Self {
        ProxyError::Fetch {
            message: message.into(),
            status: None,
            unexpected: true,
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        ProxyError::Processing {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProxyError::InvalidSignature.to_http_status(), 403);
        assert_eq!(
            ProxyError::SourceNotAllowed {
                source: "s3://x".into()
            }
            .to_http_status(),
            404
        );
        assert_eq!(ProxyError::invalid_option("bad").to_http_status(), 422);
        assert_eq!(ProxyError::invalid_url("bad").to_http_status(), 422);
        assert_eq!(ProxyError::Timeout.to_http_status(), 500);
        assert_eq!(ProxyError::Cancelled.to_http_status(), 499);
        assert_eq!(ProxyError::processing("boom").to_http_status(), 500);
    }

    #[test]
    fn test_fetch_status_forwarding() {
        assert_eq!(ProxyError::fetch("missing", Some(404)).to_http_status(), 404);
        assert_eq!(ProxyError::fetch("teapot", Some(418)).to_http_status(), 500);
        assert_eq!(ProxyError::fetch("conn refused", None).to_http_status(), 500);
    }

    #[test]
    fn test_unexpected_flag() {
        assert!(ProxyError::processing("boom").unexpected());
        assert!(ProxyError::fetch_unexpected("tls handshake").unexpected());
        assert!(!ProxyError::fetch("404", Some(404)).unexpected());
        assert!(!ProxyError::InvalidSignature.unexpected());
        assert!(!ProxyError::Cancelled.unexpected());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProxyError>();
    }
}
