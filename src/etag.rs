//! ETag computation.
//!
//! The tag is a two-stage SHA-256: the source bytes are hashed once into a
//! content footprint, then the footprint is hashed together with the server
//! version, the configuration and the option record, both encoded as
//! canonical compact JSON. Identical sources with identical options always
//! produce the same tag; any change to quality, size, presets or
//! configuration produces a different one.

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::options::ProcessingOptions;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compute the ETag for one request.
pub fn calc_etag(source: &[u8], conf: &Config, po: &ProcessingOptions) -> String {
    let footprint = Sha256::digest(source);

    let mut hasher = Sha256::new();
    hasher.update(footprint);
    hasher.update(VERSION.as_bytes());
    // serde_json never HTML-escapes and the compact encoder adds no
    // whitespace, so this is already the canonical form.
    hasher.update(serde_json::to_vec(conf).expect("config serializes"));
    hasher.update(serde_json::to_vec(po).expect("options serialize"));

    hex::encode(hasher.finalize())
}
