//! Request orchestration.
//!
//! A request moves through admission (bounded by the concurrency
//! semaphore), deadline start, path parsing, source fetch (with fallback
//! substitution), the conditional-request check, the skip-processing
//! shortcut, format resolution, and finally the raster pipeline on a
//! blocking thread streaming into the response body.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::HeaderMap;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::assets::Assets;
use crate::config::Config;
use crate::context::{CancelToken, RequestContext};
use crate::engine::sink::{ChannelSink, GzipSink, ImageSink, SinkWriter};
use crate::error::ProxyError;
use crate::etag::calc_etag;
use crate::fetch::{DownloadedImage, Downloader, ImageData};
use crate::imagetype::ImageType;
use crate::options::ProcessingOptions;
use crate::processing::process_image;
use crate::stream::{accepts_gzip, build_image_headers, vary_value, BufPool};

/// Depth of the body channel between the raster thread and the response.
const BODY_CHANNEL_DEPTH: usize = 8;

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub assets: Arc<Assets>,
    pub downloader: Arc<dyn Downloader>,
    pub semaphore: Arc<Semaphore>,
    pub buffers: Arc<BufPool>,
    pub vary: Option<String>,
}

impl AppState {
    pub fn new(config: Config, assets: Assets, downloader: Arc<dyn Downloader>) -> AppState {
        let vary = vary_value(&config);
        let semaphore = Arc::new(Semaphore::new(config.server.concurrency));
        let buffers = Arc::new(BufPool::new(
            config.server.concurrency,
            config.server.gzip_buffer_size,
        ));
        AppState {
            config: Arc::new(config),
            assets: Arc::new(assets),
            downloader,
            semaphore,
            buffers,
            vary,
        }
    }
}

/// Orchestrator result, independent of the HTTP framework.
pub enum ProxyResponse {
    /// `304`, headers only.
    NotModified { etag: String },
    /// `200` with a body, either fully materialized or streamed.
    Image {
        headers: HeaderMap,
        body: ImageBody,
    },
}

impl std::fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyResponse::NotModified { etag } => {
                f.debug_struct("NotModified").field("etag", etag).finish()
            }
            ProxyResponse::Image { headers, body } => f
                .debug_struct("Image")
                .field("headers", headers)
                .field("body", body)
                .finish(),
        }
    }
}

pub enum ImageBody {
    Full(Bytes),
    Stream(mpsc::Receiver<Result<Bytes, io::Error>>),
}

impl std::fmt::Debug for ImageBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageBody::Full(bytes) => f.debug_tuple("Full").field(bytes).finish(),
            ImageBody::Stream(_) => f.debug_tuple("Stream").field(&"..").finish(),
        }
    }
}

/// Run one request through the full state machine.
///
/// Fallback note: when the fetch fails and a fallback image is configured,
/// the fallback is processed and the ETag is computed over the *fallback*
/// bytes, so conditional requests for a still-failing URL may be answered
/// `304` against the fallback's tag.
pub async fn execute(
    state: &AppState,
    path: &str,
    headers: &HeaderMap,
    cancel: CancelToken,
) -> Result<ProxyResponse, ProxyError> {
    // Admission: the semaphore bounds concurrent processing; losing the
    // race to cancellation is a client-closed-request.
    let permit = tokio::select! {
        permit = state.semaphore.clone().acquire_owned() => {
            permit.map_err(|_| ProxyError::Cancelled)?
        }
        _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
    };

    let deadline = Instant::now() + Duration::from_secs(state.config.server.write_timeout);
    let ctx = RequestContext::new(deadline, cancel);

    let (image_url, mut po) = crate::url::parse_path(path, headers, &state.config)?;

    let FetchOutcome {
        image: source,
        cache_control,
        expires,
    } = fetch_with_fallback(state, &image_url, deadline).await?;
    let origin = OriginHeaders {
        cache_control,
        expires,
    };

    ctx.check()?;

    let mut etag = None;
    if state.config.server.etag_enabled {
        let tag = calc_etag(&source.data, &state.config, &po);
        let matches = headers
            .get("If-None-Match")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == tag);
        if matches {
            return Ok(ProxyResponse::NotModified { etag: tag });
        }
        etag = Some(tag);
    }

    ctx.check()?;

    let gzipped = state.config.server.gzip_compression > 0 && accepts_gzip(headers);

    // Skip-processing shortcut: whitelisted source types stream through
    // untouched when the requested format matches or is unspecified.
    let skip_formats = state.config.encoding.skip_formats();
    if !skip_formats.is_empty()
        && (source.format == po.format || po.format == ImageType::Unknown)
        && skip_formats.contains(&source.format)
    {
        po.format = source.format;
        let headers = response_headers(state, &po, &image_url, &origin, etag, gzipped);
        let body = if gzipped {
            gzip_full(state, &source.data)?
        } else {
            Bytes::from(source.data)
        };
        return Ok(ProxyResponse::Image {
            headers,
            body: ImageBody::Full(body),
        });
    }

    resolve_format(&mut po, &source);

    let headers = response_headers(state, &po, &image_url, &origin, etag, gzipped);

    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(BODY_CHANNEL_DEPTH);
    let config = Arc::clone(&state.config);
    let assets = Arc::clone(&state.assets);
    let gzip_level = state.config.server.gzip_compression;
    let task_url = image_url.clone();

    let join = tokio::task::spawn_blocking(move || {
        // The permit lives for the whole body write.
        let _permit = permit;
        let result = run_pipeline(&source, &po, &config, &assets, &ctx, tx.clone(), gzipped, gzip_level);
        if let Err(ref err) = result {
            // Headers are committed; all we can do is abort the body.
            let _ = tx.blocking_send(Err(io::Error::new(
                io::ErrorKind::Other,
                err.to_string(),
            )));
        }
        result
    });

    tokio::spawn(async move {
        match join.await {
            Ok(Ok(())) => info!(url = %task_url, "request processed"),
            Ok(Err(err)) => {
                if err.unexpected() {
                    error!(url = %task_url, error = %err, "processing failed");
                } else {
                    warn!(url = %task_url, error = %err, "request aborted");
                }
            }
            Err(join_err) => error!(url = %task_url, error = %join_err, "raster task panicked"),
        }
    });

    Ok(ProxyResponse::Image {
        headers,
        body: ImageBody::Stream(rx),
    })
}

struct OriginHeaders {
    cache_control: Option<String>,
    expires: Option<String>,
}

struct FetchOutcome {
    image: ImageData,
    cache_control: Option<String>,
    expires: Option<String>,
}

async fn fetch_with_fallback(
    state: &AppState,
    image_url: &str,
    deadline: Instant,
) -> Result<FetchOutcome, ProxyError> {
    match state.downloader.download(image_url, deadline).await {
        Ok(DownloadedImage {
            image,
            cache_control,
            expires,
        }) => Ok(FetchOutcome {
            image,
            cache_control,
            expires,
        }),
        Err(err @ (ProxyError::Timeout | ProxyError::Cancelled)) => Err(err),
        Err(err) => {
            if err.unexpected() {
                error!(url = %image_url, error = %err, "source download failed");
            }
            match state.assets.fallback() {
                Some(fallback) => {
                    warn!(url = %image_url, error = %err, "using fallback image");
                    Ok(FetchOutcome {
                        image: fallback.clone(),
                        cache_control: None,
                        expires: None,
                    })
                }
                None => Err(err),
            }
        }
    }
}

/// Format resolution when the URL did not fix one (or WebP is enforced).
fn resolve_format(po: &mut ProcessingOptions, source: &ImageData) {
    if po.format == ImageType::Unknown {
        po.format = if po.prefer_webp && ImageType::WebP.save_support() {
            ImageType::WebP
        } else if source.format.save_support() && source.format.good_for_web() {
            source.format
        } else {
            ImageType::Jpeg
        };
    } else if po.enforce_webp && ImageType::WebP.save_support() {
        po.format = ImageType::WebP;
    }
}

fn response_headers(
    state: &AppState,
    po: &ProcessingOptions,
    image_url: &str,
    origin: &OriginHeaders,
    etag: Option<String>,
    gzipped: bool,
) -> HeaderMap {
    build_image_headers(
        po,
        image_url,
        &state.config,
        state.vary.as_deref(),
        origin.cache_control.as_deref(),
        origin.expires.as_deref(),
        etag.as_deref(),
        gzipped,
    )
}

#[allow(clippy::too_many_arguments)]
fn run_pipeline(
    source: &ImageData,
    po: &ProcessingOptions,
    config: &Config,
    assets: &Assets,
    ctx: &RequestContext,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    gzipped: bool,
    gzip_level: u32,
) -> Result<(), ProxyError> {
    let finish_err = |e: io::Error| ProxyError::processing(format!("response write: {}", e));

    if gzipped {
        let mut sink = GzipSink::new(ChannelSink::new(tx), gzip_level);
        process_image(source, po, config, assets, ctx, &mut sink)?;
        sink.finish().map_err(finish_err)
    } else {
        let mut sink = ChannelSink::new(tx);
        process_image(source, po, config, assets, ctx, &mut sink)?;
        sink.finish().map_err(finish_err)
    }
}

/// Gzip a fully-materialized payload through a pooled staging buffer.
fn gzip_full(state: &AppState, data: &[u8]) -> Result<Bytes, ProxyError> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let staging = state.buffers.get();
    let mut sink = crate::engine::sink::BufferSink::with_buffer(staging);
    {
        let mut encoder = GzEncoder::new(
            SinkWriter(&mut sink),
            Compression::new(state.config.server.gzip_compression),
        );
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish().map(|_| ()))
            .map_err(|e| ProxyError::processing(format!("gzip failed: {}", e)))?;
    }
    let buf = sink.into_inner();
    let body = Bytes::copy_from_slice(&buf);
    state.buffers.put(buf);
    Ok(body)
}

/// Cancels the request token when the connection's handler future is
/// dropped before a response was produced, which is how a client
/// disconnect surfaces: hyper stops polling the handler.
struct DisconnectGuard {
    cancel: CancelToken,
    armed: bool,
}

impl DisconnectGuard {
    fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            self.cancel.cancel();
        }
    }
}

/// Axum entry point for the processing route.
///
/// The orchestrator runs on its own task so that a client disconnect
/// (this handler future being dropped) cancels the request token instead
/// of silently un-polling the admission race: the detached task then
/// resolves with `Cancelled` and releases whatever it holds.
pub async fn handle_processing(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Response {
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();
    let cancel = CancelToken::new();
    let mut guard = DisconnectGuard::new(cancel.clone());

    let task_state = state.clone();
    let task_path = path.clone();
    let task = tokio::spawn(async move {
        let result = execute(&task_state, &task_path, &headers, cancel).await;
        if matches!(result, Err(ProxyError::Cancelled)) {
            // Logged here: the handler that would report 499 is usually
            // already gone when cancellation fires.
            info!(path = %task_path, status = 499, "client closed request");
        }
        result
    });

    let result = match task.await {
        Ok(result) => result,
        Err(join_err) => {
            error!(path = %path, error = %join_err, "request task panicked");
            Err(ProxyError::processing("request task failed"))
        }
    };
    guard.disarm();

    match result {
        Ok(ProxyResponse::NotModified { etag }) => {
            info!(path = %path, status = 304, "not modified");
            Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header(http::header::ETAG, etag)
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Ok(ProxyResponse::Image { headers, body }) => {
            let body = match body {
                ImageBody::Full(bytes) => Body::from(bytes),
                ImageBody::Stream(rx) => Body::from_stream(ReceiverStream::new(rx)),
            };
            let mut response = Response::new(body);
            *response.headers_mut() = headers;
            response
        }
        Err(err) => error_response(&path, err),
    }
}

fn error_response(path: &str, err: ProxyError) -> Response {
    let status = StatusCode::from_u16(err.to_http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if err.unexpected() {
        error!(path = %path, status = status.as_u16(), error = %err, "request failed");
    } else if !matches!(err, ProxyError::Cancelled) {
        // Cancellations are logged by the orchestrator task.
        info!(path = %path, status = status.as_u16(), error = %err, "request rejected");
    }

    (status, err.to_string()).into_response()
}
