use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use suzaku::assets::Assets;
use suzaku::config::Config;
use suzaku::fetch::HttpDownloader;
use suzaku::handler::AppState;

/// suzaku - HTTP image-processing proxy
#[derive(Parser, Debug)]
#[command(name = "suzaku")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    suzaku::logging::init_subscriber(args.verbose);

    let config = Config::from_file(&args.config)
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("loading {}", args.config.display()))?;

    warn_unsupported_encoder_flags(&config);

    tracing::info!(
        config_file = %args.config.display(),
        bind = %config.server.bind,
        port = config.server.port,
        concurrency = config.server.concurrency,
        "configuration loaded"
    );

    let assets = Assets::load(&config.assets).map_err(|e| anyhow::anyhow!(e))?;
    let downloader = Arc::new(
        HttpDownloader::new(config.security.max_src_file_size)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    );

    let state = AppState::new(config, assets, downloader);
    suzaku::server::serve(state).await.context("server error")
}

/// Some encoder switches have no backing support in the codec layer;
/// say so once at startup instead of silently ignoring them per request.
fn warn_unsupported_encoder_flags(config: &Config) {
    if config.encoding.jpeg_progressive {
        tracing::warn!("jpeg_progressive requested, but the JPEG codec encodes baseline only");
    }
    if config.encoding.png_interlaced {
        tracing::warn!("png_interlaced requested, but the PNG codec does not write Adam7");
    }
    if config.encoding.png_quantize {
        tracing::warn!("png_quantize requested, but the PNG codec has no palette quantizer");
    }
}
