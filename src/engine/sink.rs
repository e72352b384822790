//! Encoded-byte sinks.
//!
//! The engine pushes encoded output through the [`ImageSink`] contract:
//! `write` moves bytes, `finish` flushes whatever the sink buffers. Sinks
//! must tolerate synchronous calls from the engine's (blocking) thread.

use std::io;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::sync::mpsc;

/// Contract between the engine's encoders and the response stream.
pub trait ImageSink: Send {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn finish(&mut self) -> io::Result<()>;
}

/// Collects output in memory. Used for ICO's intermediate PNG, the
/// skip-processing path, and tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: Vec<u8>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl ImageSink for BufferSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Streams chunks into an HTTP response body over a bounded channel.
///
/// `write` blocks when the client reads slowly; a dropped receiver (client
/// gone) surfaces as a broken-pipe error so the pipeline aborts.
pub struct ChannelSink {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Result<Bytes, io::Error>>) -> Self {
        Self { tx }
    }
}

impl ImageSink for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body closed"))?;
        Ok(buf.len())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// io::Write adapter so std encoders can target an [`ImageSink`].
pub struct SinkWriter<'a>(pub &'a mut dyn ImageSink);

impl io::Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Gzip-compressing wrapper around another sink.
pub struct GzipSink<S: ImageSink> {
    encoder: Option<GzEncoder<InnerWriter<S>>>,
    finished: Option<S>,
}

struct InnerWriter<S: ImageSink>(S);

impl<S: ImageSink> io::Write for InnerWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ImageSink> GzipSink<S> {
    pub fn new(inner: S, level: u32) -> Self {
        Self {
            encoder: Some(GzEncoder::new(InnerWriter(inner), Compression::new(level))),
            finished: None,
        }
    }

    /// The wrapped sink, available after `finish`.
    pub fn into_inner(self) -> Option<S> {
        self.finished
    }
}

impl<S: ImageSink> ImageSink for GzipSink<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.encoder.as_mut() {
            Some(encoder) => io::Write::write(encoder, buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "sink already finished")),
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(encoder) = self.encoder.take() {
            let mut inner = encoder.finish()?;
            inner.0.finish()?;
            self.finished = Some(inner.0);
        }
        Ok(())
    }
}
