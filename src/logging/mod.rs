//! Structured logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` overrides the defaults; otherwise the proxy logs at INFO and
/// tower-http request traces at INFO.
pub fn init_subscriber(verbose: bool) {
    let default_filter = if verbose {
        "suzaku=debug,tower_http=debug"
    } else {
        "suzaku=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
