//! Path signature verification.
//!
//! The first path segment is either the literal `unsafe` or the URL-safe
//! base64 of `HMAC-SHA256(key, salt || rest-of-path)`. Multiple key/salt
//! pairs may be configured; a signature verifying against any pair passes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::SecurityConfig;
use crate::error::ProxyError;

type HmacSha256 = Hmac<Sha256>;

/// Compute the signature for `path` (everything after the signature
/// segment, with its leading slash) under one key/salt pair.
pub fn sign_path(key: &[u8], salt: &[u8], path: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(salt);
    mac.update(path.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Verify the signature segment against every configured key/salt pair.
///
/// When `allow_insecure` is set, the literal `unsafe` passes without any
/// cryptography; otherwise it is checked like any other signature (and
/// fails, since it is not valid base64 HMAC output).
pub fn verify_signature(
    signature: &str,
    path: &str,
    security: &SecurityConfig,
) -> Result<(), ProxyError> {
    if security.allow_insecure && signature == "unsafe" {
        return Ok(());
    }

    for (key, salt) in security.keys.iter().zip(security.salts.iter()) {
        let expected = sign_path(key.as_bytes(), salt.as_bytes(), path);
        if constant_time_eq(signature, &expected) {
            return Ok(());
        }
    }

    Err(ProxyError::InvalidSignature)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
