//! Response shaping: headers, negotiation, and the shared buffer pool.
//!
//! Headers are written before the first body byte. `Vary` is computed once
//! at startup from the feature switches; cache headers either pass through
//! from the origin or are synthesized from the configured TTL.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use http::header::{
    HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_ENCODING,
    CONTENT_TYPE, EXPIRES, VARY,
};

use crate::config::Config;
use crate::options::ProcessingOptions;

/// Pool of reusable byte buffers, bounded by the concurrency limit.
pub struct BufPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
    buffer_size: usize,
}

impl BufPool {
    pub fn new(max_pooled: usize, buffer_size: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            max_pooled,
            buffer_size,
        }
    }

    pub fn get(&self) -> Vec<u8> {
        self.buffers
            .lock()
            .expect("buffer pool lock")
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_size))
    }

    pub fn put(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut buffers = self.buffers.lock().expect("buffer pool lock");
        if buffers.len() < self.max_pooled {
            buffers.push(buf);
        }
    }
}

/// The `Vary` header value implied by the enabled features, or `None`
/// when responses do not vary on request headers.
pub fn vary_value(conf: &Config) -> Option<String> {
    let mut vary = Vec::new();
    if conf.negotiation.enable_webp_detection || conf.negotiation.enforce_webp {
        vary.push("Accept");
    }
    if conf.server.gzip_compression > 0 {
        vary.push("Accept-Encoding");
    }
    if conf.negotiation.enable_client_hints {
        vary.extend(["DPR", "Viewport-Width", "Width"]);
    }
    if vary.is_empty() {
        None
    } else {
        Some(vary.join(", "))
    }
}

/// Whether the client advertises gzip with a non-zero quality.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get("Accept-Encoding").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    accept.split(',').any(|entry| {
        let entry = entry.trim();
        let (encoding, params) = match entry.split_once(';') {
            Some((e, p)) => (e.trim(), Some(p)),
            None => (entry, None),
        };
        if !encoding.eq_ignore_ascii_case("gzip") && encoding != "*" {
            return false;
        }
        match params.and_then(|p| p.trim().strip_prefix("q=")) {
            Some(q) => q.trim().parse::<f32>().map(|q| q > 0.0).unwrap_or(true),
            None => true,
        }
    })
}

/// Cache headers for the response: the origin's when passthrough is on and
/// present, synthesized `max-age` otherwise.
pub fn cache_headers(
    conf: &Config,
    origin_cache_control: Option<&str>,
    origin_expires: Option<&str>,
) -> (String, String) {
    let (mut cache_control, mut expires) = if conf.server.cache_control_passthrough {
        (
            origin_cache_control.unwrap_or("").to_string(),
            origin_expires.unwrap_or("").to_string(),
        )
    } else {
        (String::new(), String::new())
    };

    if cache_control.is_empty() && expires.is_empty() {
        cache_control = format!("max-age={}, public", conf.server.ttl);
        expires =
            httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(conf.server.ttl));
    }

    (cache_control, expires)
}

/// Assemble the response headers written before the first body byte.
#[allow(clippy::too_many_arguments)]
pub fn build_image_headers(
    po: &ProcessingOptions,
    image_url: &str,
    conf: &Config,
    vary: Option<&str>,
    origin_cache_control: Option<&str>,
    origin_expires: Option<&str>,
    etag: Option<&str>,
    gzipped: bool,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    set_header(&mut headers, CONTENT_TYPE, po.format.mime());

    let disposition = if po.filename.is_empty() {
        po.format.content_disposition_from_url(image_url)
    } else {
        po.format.content_disposition(&po.filename)
    };
    set_header(&mut headers, CONTENT_DISPOSITION, &disposition);

    let (cache_control, expires) = cache_headers(conf, origin_cache_control, origin_expires);
    if !cache_control.is_empty() {
        set_header(&mut headers, CACHE_CONTROL, &cache_control);
    }
    if !expires.is_empty() {
        set_header(&mut headers, EXPIRES, &expires);
    }

    if let Some(vary) = vary {
        set_header(&mut headers, VARY, vary);
    }

    if gzipped {
        set_header(&mut headers, CONTENT_ENCODING, "gzip");
    }

    if let Some(etag) = etag {
        set_header(&mut headers, http::header::ETAG, etag);
    }

    headers
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
