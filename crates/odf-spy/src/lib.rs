//! Execution-event tracing for the ODF execution core.
//!
//! The director reports every blocking transition, time advance and process
//! lifecycle step as a small binary *record*. Records are framed (see
//! [`frame`]) and handed to a pluggable [`TraceBackend`]. A listener that
//! visualises the execution subscribes to the same stream.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

pub mod frame;
mod record;
pub mod records;

pub use frame::{decode_frame, encode_frame, split_frames, DecodedFrame};
pub use record::{
    Field, PayloadBuilder, PayloadReader, FMT_F64, FMT_RCVR, FMT_STR, FMT_TIME, FMT_U16, FMT_U32,
    FMT_U8,
};

/// Maximum payload length for a single record (excluding header/checksum).
const DEFAULT_MAX_RECORD_LEN: usize = 64;

/// Configuration for the tracer.
#[derive(Debug, Clone)]
pub struct SpyConfig {
    pub max_record_len: usize,
    pub include_timestamp: bool,
}

impl Default for SpyConfig {
    fn default() -> Self {
        Self {
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            include_timestamp: true,
        }
    }
}

/// A single trace record.
#[derive(Debug, Clone)]
pub struct SpyRecord {
    pub seq: u8,
    pub record_type: u8,
    pub timestamp: Option<Duration>,
    pub payload: Vec<u8>,
}

/// Errors that can occur while emitting or reading trace data.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("backend error: {0}")]
    Backend(#[from] io::Error),
    #[error("malformed frame: {0}")]
    Frame(&'static str),
}

/// Backend trait that consumes framed bytes.
pub trait TraceBackend: Send + Sync {
    fn write_frame(&self, frame: &[u8]) -> Result<(), TraceError>;
}

/// Simple backend that writes frames to any `Write` implementation.
pub struct WriterBackend<W: Write + Send + 'static> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> WriterBackend<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send + 'static> TraceBackend for WriterBackend<W> {
    fn write_frame(&self, frame: &[u8]) -> Result<(), TraceError> {
        let mut guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        guard.write_all(frame).map_err(TraceError::from)
    }
}

/// Backend that keeps every frame in memory; cheap to clone and inspect.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every frame written so far.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TraceBackend for MemoryBackend {
    fn write_frame(&self, frame: &[u8]) -> Result<(), TraceError> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(frame.to_vec());
        Ok(())
    }
}

/// Frame encoder bound to a backend.
pub struct Tracer<B: TraceBackend> {
    backend: B,
    cfg: SpyConfig,
    seq: u8,
    epoch: Instant,
}

/// Shared, cloneable handle over a [`Tracer`].
pub struct TracerHandle<B: TraceBackend> {
    inner: Arc<Mutex<Tracer<B>>>,
}

impl<B: TraceBackend> Clone for TracerHandle<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: TraceBackend> Tracer<B> {
    pub fn new(cfg: SpyConfig, backend: B) -> Self {
        Self {
            backend,
            cfg,
            seq: 0,
            epoch: Instant::now(),
        }
    }

    pub fn into_handle(self) -> TracerHandle<B> {
        TracerHandle {
            inner: Arc::new(Mutex::new(self)),
        }
    }

    pub fn record(
        &mut self,
        record_type: u8,
        payload: &[u8],
        with_timestamp: bool,
    ) -> Result<SpyRecord, TraceError> {
        if payload.len() > self.cfg.max_record_len {
            return Err(TraceError::PayloadTooLarge(payload.len()));
        }

        let timestamp =
            (self.cfg.include_timestamp && with_timestamp).then(|| self.epoch.elapsed());

        self.seq = self.seq.wrapping_add(1);
        let record = SpyRecord {
            seq: self.seq,
            record_type,
            timestamp,
            payload: payload.to_vec(),
        };

        let frame = encode_frame(&record);
        self.backend.write_frame(&frame)?;
        Ok(record)
    }
}

impl<B: TraceBackend + 'static> TracerHandle<B> {
    pub fn emit(&self, record_type: u8, payload: &[u8]) -> Result<SpyRecord, TraceError> {
        self.emit_internal(record_type, payload, false)
    }

    pub fn emit_with_timestamp(
        &self,
        record_type: u8,
        payload: &[u8],
    ) -> Result<SpyRecord, TraceError> {
        self.emit_internal(record_type, payload, true)
    }

    fn emit_internal(
        &self,
        record_type: u8,
        payload: &[u8],
        with_timestamp: bool,
    ) -> Result<SpyRecord, TraceError> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.record(record_type, payload, with_timestamp)
    }

    /// Returns a hook that the execution core can call for every record.
    pub fn hook(&self) -> TraceHook {
        let inner = Arc::clone(&self.inner);
        Arc::new(move |record_type, payload, with_timestamp| {
            let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
            guard
                .record(record_type, payload, with_timestamp)
                .map(|_| ())
        })
    }
}

pub type TraceHook = Arc<dyn Fn(u8, &[u8], bool) -> Result<(), TraceError> + Send + Sync>;

/// Convenience backend that writes frames to stdout.
pub fn stdout_backend() -> WriterBackend<io::Stdout> {
    WriterBackend::new(io::stdout())
}
