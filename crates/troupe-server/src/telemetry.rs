// Troupe Server - Telemetry
//
// tracing initialization with an injected log ring buffer (queryable over
// HTTP) and an optional size-rotating file sink. No global logger
// singletons beyond the tracing dispatcher itself.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use troupe_core::{LoggingSettings, TroupeError, TroupeResult};

/// How many log entries the ring buffer keeps
const LOG_RING_CAPACITY: usize = 100;

/// One captured log record
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Shared handle to the last N log entries
#[derive(Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: LogEntry) {
        let mut ring = self.inner.lock();
        if ring.len() == LOG_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    /// Oldest first
    pub fn recent(&self) -> Vec<LogEntry> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message
                .push_str(&format!("{}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&format!("{}={}", field.name(), value));
        }
    }
}

/// tracing Layer feeding the ring buffer
pub struct RingBufferLayer {
    buffer: LogBuffer,
}

impl RingBufferLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: tracing::Subscriber> Layer<S> for RingBufferLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        self.buffer.push(LogEntry {
            timestamp: Utc::now(),
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
        });
    }
}

/// Size-rotating file writer: when the active file exceeds `max_bytes` it
/// is renamed to `<path>.1` (shifting older backups up) and a fresh file
/// is opened. Rotation uses rename, so it is atomic on one filesystem.
pub struct RotatingFileWriter {
    path: PathBuf,
    max_bytes: u64,
    max_backups: usize,
    file: Option<File>,
    written: u64,
}

impl RotatingFileWriter {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, max_backups: usize) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes: max_bytes.max(1024),
            max_backups: max_backups.max(1),
            file: Some(file),
            written,
        })
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.file = None;

        for index in (1..self.max_backups).rev() {
            let from = backup_path(&self.path, index);
            if from.exists() {
                std::fs::rename(&from, backup_path(&self.path, index + 1))?;
            }
        }
        if self.path.exists() {
            std::fs::rename(&self.path, backup_path(&self.path, 1))?;
        }

        self.file = Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        );
        self.written = 0;
        Ok(())
    }
}

fn backup_path(path: &std::path::Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let Some(file) = self.file.as_mut() else {
            return Err(std::io::Error::other("log file closed"));
        };
        let written = file.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Shared handle usable as a tracing writer
#[derive(Clone)]
pub struct SharedRotatingWriter(Arc<Mutex<RotatingFileWriter>>);

impl SharedRotatingWriter {
    pub fn new(writer: RotatingFileWriter) -> Self {
        Self(Arc::new(Mutex::new(writer)))
    }
}

impl Write for SharedRotatingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRotatingWriter {
    type Writer = SharedRotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Initialize tracing from settings. Returns the ring-buffer handle; a
/// second call (tests) leaves the existing dispatcher in place but still
/// returns a working buffer.
pub fn init_telemetry(settings: &LoggingSettings) -> TroupeResult<LogBuffer> {
    let buffer = LogBuffer::new();

    let filter = EnvFilter::try_new(&settings.level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| TroupeError::config(e.to_string()))?;

    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let ring = RingBufferLayer::new(buffer.clone());

    let file_layer = match &settings.file {
        Some(path) => {
            let writer = RotatingFileWriter::new(
                path,
                settings.max_file_bytes,
                settings.max_backups,
            )
            .map_err(|e| TroupeError::config(format!("cannot open log file {}: {}", path, e)))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(SharedRotatingWriter::new(writer)),
            )
        }
        None => None,
    };

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .with(ring);

    // In tests a dispatcher may already be installed; the buffer still
    // works for the layers that did get registered.
    let _ = registry.try_init();
    Ok(buffer)
}
