//! Batched log shipping.
//!
//! When `LOG_SINK_URL` is set, tracing events are copied into a bounded
//! in-memory buffer and shipped as JSON arrays to the ingest endpoint. Pushing
//! never waits on I/O; a background flusher owned by [`LogSink`] does the
//! network work.
//!
//! Records are split into three priority classes:
//! - high: `ERROR`, flushed immediately
//! - normal: `WARN` and `INFO`, flushed once `batch_size` are waiting
//! - low: `DEBUG` and `TRACE`, only shipped with other records or on the timer
//!
//! When the buffer is full the oldest low records go first, then normal,
//! then high.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::config::LogSinkConfig;

/// Retry delays in milliseconds for shipping a batch.
const SHIP_RETRY_DELAYS: &[u64] = &[100, 200];

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Targets whose events are never buffered (the sink's own transport).
const IGNORED_TARGETS: &[&str] = &["reqwest", "hyper", "h2", "rustls", module_path!()];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn for_level(level: &Level) -> Self {
        match *level {
            Level::ERROR => Self::High,
            Level::WARN | Level::INFO => Self::Normal,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: String,
    pub message: String,
    pub target: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Default)]
struct Buffer {
    high: VecDeque<LogRecord>,
    normal: VecDeque<LogRecord>,
    low: VecDeque<LogRecord>,
    dropped: u64,
}

impl Buffer {
    fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }

    /// Queue a record and report whether it should trigger a flush.
    fn push(
        &mut self,
        priority: Priority,
        record: LogRecord,
        capacity: usize,
        batch_size: usize,
    ) -> bool {
        match priority {
            Priority::High => self.high.push_back(record),
            Priority::Normal => self.normal.push_back(record),
            Priority::Low => self.low.push_back(record),
        }

        while self.len() > capacity {
            let evicted = self
                .low
                .pop_front()
                .or_else(|| self.normal.pop_front())
                .or_else(|| self.high.pop_front());
            if evicted.is_none() {
                break;
            }
            self.dropped += 1;
        }

        match priority {
            Priority::High => true,
            Priority::Normal => self.normal.len() >= batch_size,
            Priority::Low => false,
        }
    }

    /// Everything buffered, high first.
    fn drain(&mut self) -> Vec<LogRecord> {
        let mut batch = Vec::with_capacity(self.len());
        batch.extend(self.high.drain(..));
        batch.extend(self.normal.drain(..));
        batch.extend(self.low.drain(..));
        batch
    }
}

struct Inner {
    url: String,
    token: Option<String>,
    batch_size: usize,
    capacity: usize,
    flush_interval: Duration,
    client: Client,
    buffer: Mutex<Buffer>,
    flush_requested: Notify,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the log shipping buffer. Cheap to clone.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Inner>,
}

impl LogSink {
    /// Build a sink, or None when no ingest URL is configured.
    pub fn from_config(config: &LogSinkConfig) -> Option<Self> {
        let url = config.url.clone()?;
        let (stop_tx, _) = watch::channel(false);
        Some(Self {
            inner: Arc::new(Inner {
                url,
                token: config.token.clone(),
                batch_size: config.batch_size.max(1),
                capacity: config.capacity.max(1),
                // tokio::time::interval panics on a zero period
                flush_interval: config.flush_interval.max(MIN_FLUSH_INTERVAL),
                client: Client::new(),
                buffer: Mutex::new(Buffer::default()),
                flush_requested: Notify::new(),
                stop_tx,
                task: Mutex::new(None),
            }),
        })
    }

    /// Queue a record. Never blocks on I/O.
    pub fn push(&self, priority: Priority, record: LogRecord) {
        let should_flush = match self.inner.buffer.lock() {
            Ok(mut buffer) => buffer.push(
                priority,
                record,
                self.inner.capacity,
                self.inner.batch_size,
            ),
            Err(_) => return,
        };
        if should_flush {
            self.inner.flush_requested.notify_one();
        }
    }

    pub fn buffered(&self) -> usize {
        self.inner.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn dropped(&self) -> u64 {
        self.inner.buffer.lock().map(|b| b.dropped).unwrap_or(0)
    }

    /// tracing layer feeding this sink.
    pub fn layer(&self) -> SinkLayer {
        SinkLayer { sink: self.clone() }
    }

    /// Spawn the background flusher. Calling it twice has no effect.
    pub fn start(&self) {
        let Ok(mut task) = self.inner.task.lock() else {
            return;
        };
        if task.is_some() {
            return;
        }

        let inner = self.inner.clone();
        let mut stop_rx = self.inner.stop_tx.subscribe();
        let handle = tokio::spawn(
            AssertUnwindSafe(async move {
                let mut ticker = tokio::time::interval(inner.flush_interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = inner.flush_requested.notified() => {}
                        _ = stop_rx.changed() => break,
                    }
                    flush_inner(&inner).await;
                }
            })
            .catch_unwind()
            .map(|result| {
                if result.is_err() {
                    eprintln!("log sink: flusher task panicked");
                }
            }),
        );
        *task = Some(handle);
    }

    /// Ship whatever is buffered right now.
    pub async fn flush(&self) {
        flush_inner(&self.inner).await;
    }

    /// Stop the flusher and ship what is left.
    pub async fn stop(&self) {
        let _ = self.inner.stop_tx.send(true);
        let handle = self.inner.task.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.flush().await;
    }
}

async fn flush_inner(inner: &Inner) {
    let batch = match inner.buffer.lock() {
        Ok(mut buffer) => buffer.drain(),
        Err(_) => return,
    };
    if batch.is_empty() {
        return;
    }
    ship(inner, &batch).await;
}

/// POST one batch with quick retries. Diagnostics go to stderr only so the
/// sink never logs into itself.
async fn ship(inner: &Inner, batch: &[LogRecord]) {
    for (attempt, delay_ms) in std::iter::once(&0u64)
        .chain(SHIP_RETRY_DELAYS.iter())
        .enumerate()
    {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        let mut request = inner
            .client
            .post(&inner.url)
            .json(batch)
            .timeout(Duration::from_secs(5));
        if let Some(token) = &inner.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => return,
            Ok(resp) => eprintln!("log sink: ingest returned {}", resp.status()),
            Err(e) => eprintln!("log sink: ingest failed: {}", e),
        }
    }

    eprintln!(
        "log sink: dropping batch of {} records after {} attempts",
        batch.len(),
        SHIP_RETRY_DELAYS.len() + 1
    );
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields
                .insert(field.name().to_string(), Value::from(format!("{:?}", value)));
        }
    }
}

/// Copies tracing events into a [`LogSink`].
#[derive(Clone)]
pub struct SinkLayer {
    sink: LogSink,
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let target = meta.target();
        if IGNORED_TARGETS.iter().any(|t| target.starts_with(t)) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.sink.push(
            Priority::for_level(meta.level()),
            LogRecord {
                level: meta.level().to_string(),
                message: visitor.message.unwrap_or_default(),
                target: target.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                fields: visitor.fields,
            },
        );
    }
}
