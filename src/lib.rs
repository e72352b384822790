//! suzaku: an HTTP image-processing proxy.
//!
//! Request paths carry an HMAC signature, a list of processing option
//! atoms, and an encoded source URL. The server verifies the signature,
//! fetches the source, runs a strictly ordered raster pipeline, and
//! streams the re-encoded image back with cache-correct headers.

pub mod assets;
pub mod config;
pub mod constants;
pub mod context;
pub mod engine;
pub mod error;
pub mod etag;
pub mod fetch;
pub mod handler;
pub mod imagetype;
pub mod logging;
pub mod options;
pub mod processing;
pub mod server;
pub mod stream;
pub mod url;
