//! Default values shared between the configuration layer and tests.

/// Default bind address.
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default number of requests processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Default per-request deadline, in seconds, measured from admission.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Cap on downloaded source size, in bytes.
pub const DEFAULT_DOWNLOAD_MAX_BYTES: usize = 50 * 1024 * 1024;

/// Default `Cache-Control: max-age` for synthesized cache headers, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default gzip buffer size for the response buffer pool, in bytes.
pub const DEFAULT_GZIP_BUFFER_SIZE: usize = 4096;

/// Default quality for lossy output formats.
pub const DEFAULT_QUALITY: u8 = 80;

/// Default watermark opacity when the asset is configured without one.
pub const DEFAULT_WATERMARK_OPACITY: f64 = 1.0;

/// Max pixel dimension accepted by the ICO container.
pub const ICO_MAX_DIMENSION: u32 = 256;
