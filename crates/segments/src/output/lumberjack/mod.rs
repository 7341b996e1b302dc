//! Lumberjack segment - batched export to Beats/Logstash endpoints
//!
//! Ships every flow as an ECS JSON document to one or more lumberjack v2
//! servers, and forwards the flow unchanged downstream (the segment is
//! non-destructive).
//!
//! # Topology
//!
//! ```text
//!                  ┌──────────────── bounded MPMC queue ───────────────┐
//! in ─→ forward ───┤                                                   ├─→ writer(server A, 1/2)
//!        │         │  (capacity `queuesize`, backpressures upstream)   ├─→ writer(server A, 2/2)
//!        ↓         └───────────────────────────────────────────────────┘─→ writer(server B, 1/1)
//!       out
//! ```
//!
//! Writers compete on the shared queue receive, so distribution over
//! servers and writers is contention-driven round robin; strict per-server
//! replication is deliberately not offered. Order across writers is lost.
//!
//! # Options
//!
//! | option | effect |
//! |---|---|
//! | `servers` | comma-separated `tcp://`, `tls://` or `tlsnoverify://` URLs; per-URL `?compression=0-9&count=N` |
//! | `compression` | default compression level for servers without an override (default 0) |
//! | `queuesize` | internal queue capacity (default 65536, minimum 64) |
//! | `batchsize` | flows per batch (default 64) |
//! | `batchtimeout` | max wait for a partial batch (default 5s, clamped to 50ms..60s) |
//! | `reconnectwait` | pause between reconnect attempts (default 1s) |
//! | `batchdebug` | debug-log every batch event |
//! | `queuestatusinterval` | if > 0, periodically log queue fill |

mod client;
mod ecs;
mod protocol;

pub use ecs::EcsDocument;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossfire::MAsyncRx;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use url::Url;

use flowpipe_flow::FlowRecord;
use flowpipe_pipeline::{
    FlowReceiver, FlowSender, PipelineError, Result, Segment, SegmentConfig, SegmentFactory,
    SegmentIo,
};

use client::{LumberjackClient, SendOutcome, TlsMode};

#[cfg(test)]
#[path = "lumberjack_test.rs"]
mod tests;

const SEGMENT_NAME: &str = "lumberjack";
const DEFAULT_QUEUE_SIZE: usize = 65536;
const MIN_QUEUE_SIZE: usize = 64;
const DEFAULT_BATCH_SIZE: usize = 64;
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_BATCH_TIMEOUT: Duration = Duration::from_millis(50);
const MAX_BATCH_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(1);

/// One configured server endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServerSpec {
    /// Dial target, `host:port` (IPv6 hosts bracketed).
    pub authority: String,
    /// Hostname or IP literal for TLS verification.
    pub host: String,
    pub tls: TlsMode,
    pub compression: u32,
    pub parallelism: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Options {
    pub servers: Vec<ServerSpec>,
    pub queue_size: usize,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub reconnect_wait: Duration,
    pub batch_debug: bool,
    pub queue_status_interval: Duration,
}

pub(crate) fn parse_options(config: &SegmentConfig) -> Result<Options> {
    let default_compression = config.get_u64(SEGMENT_NAME, "compression")?.unwrap_or(0);
    if default_compression > 9 {
        return Err(PipelineError::invalid_option(
            SEGMENT_NAME,
            "compression",
            format!("level {default_compression} is outside 0..=9"),
        ));
    }

    let mut servers = Vec::new();
    for raw in config.require(SEGMENT_NAME, "servers")?.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        servers.push(parse_server(raw, default_compression as u32)?);
    }
    if servers.is_empty() {
        return Err(PipelineError::invalid_option(
            SEGMENT_NAME,
            "servers",
            "no servers given",
        ));
    }

    let queue_size = match config.get_u64(SEGMENT_NAME, "queuesize")? {
        Some(size) if (size as usize) < MIN_QUEUE_SIZE => {
            tracing::warn!(
                segment = SEGMENT_NAME,
                queuesize = size,
                "queuesize below minimum, using default {DEFAULT_QUEUE_SIZE}"
            );
            DEFAULT_QUEUE_SIZE
        }
        Some(size) => size as usize,
        None => DEFAULT_QUEUE_SIZE,
    };

    let batch_size = match config.get_u64(SEGMENT_NAME, "batchsize")? {
        Some(0) => {
            tracing::warn!(
                segment = SEGMENT_NAME,
                "batchsize 0 makes no progress, using default {DEFAULT_BATCH_SIZE}"
            );
            DEFAULT_BATCH_SIZE
        }
        Some(size) => size as usize,
        None => DEFAULT_BATCH_SIZE,
    };

    let batch_timeout = match config.get_duration(SEGMENT_NAME, "batchtimeout")? {
        Some(timeout) if timeout < MIN_BATCH_TIMEOUT || timeout > MAX_BATCH_TIMEOUT => {
            tracing::warn!(
                segment = SEGMENT_NAME,
                batchtimeout = ?timeout,
                "batchtimeout outside {MIN_BATCH_TIMEOUT:?}..{MAX_BATCH_TIMEOUT:?}, using default"
            );
            DEFAULT_BATCH_TIMEOUT
        }
        Some(timeout) => timeout,
        None => DEFAULT_BATCH_TIMEOUT,
    };

    Ok(Options {
        servers,
        queue_size,
        batch_size,
        batch_timeout,
        reconnect_wait: config
            .get_duration(SEGMENT_NAME, "reconnectwait")?
            .unwrap_or(DEFAULT_RECONNECT_WAIT),
        batch_debug: config.get_bool(SEGMENT_NAME, "batchdebug")?.unwrap_or(false),
        queue_status_interval: config
            .get_duration(SEGMENT_NAME, "queuestatusinterval")?
            .unwrap_or(Duration::ZERO),
    })
}

fn parse_server(raw: &str, default_compression: u32) -> Result<ServerSpec> {
    let url = Url::parse(raw)
        .map_err(|e| PipelineError::invalid_option(SEGMENT_NAME, "servers", format!("{raw}: {e}")))?;

    let tls = match url.scheme() {
        "tcp" => TlsMode::Off,
        "tls" => TlsMode::Verify,
        "tlsnoverify" => TlsMode::NoVerify,
        other => {
            return Err(PipelineError::invalid_option(
                SEGMENT_NAME,
                "servers",
                format!("{raw}: unknown scheme '{other}'"),
            ))
        }
    };

    let bracketed_host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => {
            return Err(PipelineError::invalid_option(
                SEGMENT_NAME,
                "servers",
                format!("{raw}: missing host"),
            ))
        }
    };
    let port = url.port().ok_or_else(|| {
        PipelineError::invalid_option(SEGMENT_NAME, "servers", format!("{raw}: missing port"))
    })?;

    let mut compression = default_compression;
    let mut parallelism = 1usize;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "compression" => {
                compression = value.parse::<u32>().map_err(|e| {
                    PipelineError::invalid_option(
                        SEGMENT_NAME,
                        "servers",
                        format!("{raw}: compression: {e}"),
                    )
                })?;
                if compression > 9 {
                    return Err(PipelineError::invalid_option(
                        SEGMENT_NAME,
                        "servers",
                        format!("{raw}: compression level {compression} is outside 0..=9"),
                    ));
                }
            }
            "count" => {
                let count = value.parse::<i64>().map_err(|e| {
                    PipelineError::invalid_option(
                        SEGMENT_NAME,
                        "servers",
                        format!("{raw}: count: {e}"),
                    )
                })?;
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get() as i64)
                    .unwrap_or(1);
                if count < 1 {
                    tracing::warn!(
                        segment = SEGMENT_NAME,
                        server = %bracketed_host,
                        count,
                        "count below 1, using 1"
                    );
                    parallelism = 1;
                } else {
                    if count > cores {
                        tracing::warn!(
                            segment = SEGMENT_NAME,
                            server = %bracketed_host,
                            count,
                            cores,
                            "count exceeds available parallelism, this will most likely hurt performance"
                        );
                    }
                    parallelism = count as usize;
                }
            }
            other => {
                return Err(PipelineError::invalid_option(
                    SEGMENT_NAME,
                    "servers",
                    format!("{raw}: unknown parameter '{other}'"),
                ))
            }
        }
    }

    Ok(ServerSpec {
        authority: format!("{bracketed_host}:{port}"),
        host: bracketed_host.trim_matches(['[', ']']).to_string(),
        tls,
        compression,
        parallelism,
    })
}

#[derive(Debug)]
pub struct Lumberjack {
    io: SegmentIo,
    options: Options,
    metrics: Arc<LumberjackMetrics>,
}

pub struct LumberjackFactory;

impl SegmentFactory for LumberjackFactory {
    fn name(&self) -> &'static str {
        SEGMENT_NAME
    }

    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let options = parse_options(config)?;
        Ok(Box::new(Lumberjack {
            io: SegmentIo::default(),
            options,
            metrics: Arc::new(LumberjackMetrics::default()),
        }))
    }
}

#[async_trait]
impl Segment for Lumberjack {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();

        // The queue decoupling the pipeline from the writers; when full,
        // the forward loop below blocks and backpressures the pipeline.
        // Writers do the ECS conversion so that `count` can scale it.
        let (queue_tx, queue_rx) =
            crossfire::mpmc::bounded_async::<FlowRecord>(self.options.queue_size);
        let shutdown = CancellationToken::new();
        let writers = TaskTracker::new();

        if self.options.queue_status_interval > Duration::ZERO {
            writers.spawn(queue_status_loop(
                self.options.queue_status_interval,
                self.options.queue_size,
                Arc::clone(&self.metrics),
                shutdown.clone(),
            ));
        }

        for spec in &self.options.servers {
            for index in 0..spec.parallelism {
                let worker = Writer {
                    spec: spec.clone(),
                    index: index + 1,
                    queue: queue_rx.clone(),
                    batch_size: self.options.batch_size,
                    batch_timeout: self.options.batch_timeout,
                    batch_debug: self.options.batch_debug,
                    reconnect_wait: self.options.reconnect_wait,
                    shutdown: shutdown.clone(),
                    metrics: Arc::clone(&self.metrics),
                };
                writers.spawn(worker.run());
            }
        }
        writers.close();
        drop(queue_rx);

        while let Some(flow) = input.recv().await {
            if queue_tx.send(flow.clone()).await.is_ok() {
                self.metrics.record_enqueued();
            }
            if output.send(flow).await.is_err() {
                break;
            }
        }

        // Input closed: close the queue, let writers flush their tails, and
        // release the retry loops.
        drop(output);
        drop(queue_tx);
        shutdown.cancel();
        writers.wait().await;
        tracing::info!(segment = SEGMENT_NAME, "all writer tasks have stopped");
    }
}

/// One writer task: competes on the shared queue, batches, ships.
struct Writer {
    spec: ServerSpec,
    index: usize,
    queue: MAsyncRx<FlowRecord>,
    batch_size: usize,
    batch_timeout: Duration,
    batch_debug: bool,
    reconnect_wait: Duration,
    shutdown: CancellationToken,
    metrics: Arc<LumberjackMetrics>,
}

impl Writer {
    async fn run(self) {
        let mut client = LumberjackClient::new(
            self.spec.authority.clone(),
            self.spec.host.clone(),
            self.spec.tls,
            self.spec.compression,
            self.reconnect_wait,
            self.shutdown.clone(),
            Arc::clone(&self.metrics),
        );
        let writer = format!("{}/{}", self.index, self.spec.parallelism);
        tracing::info!(
            segment = SEGMENT_NAME,
            server = %self.spec.authority,
            tls = ?self.spec.tls,
            compression = self.spec.compression,
            writer = %writer,
            "writer starting"
        );

        let mut batch: Vec<Vec<u8>> = Vec::with_capacity(self.batch_size);
        let sleep = tokio::time::sleep(self.batch_timeout);
        tokio::pin!(sleep);
        // Whether the batch timer is live. A `Sleep` cannot be stopped, only
        // reset; the guard on the timer arm below is what keeps an expired
        // but disarmed timer from forcing an empty flush.
        let mut timer_armed = false;

        loop {
            tokio::select! {
                received = self.queue.recv() => match received {
                    Ok(flow) => {
                        self.metrics.record_dequeued();
                        let payload = match serde_json::to_vec(&EcsDocument::from_flow(&flow)) {
                            Ok(payload) => payload,
                            Err(e) => {
                                tracing::error!(
                                    segment = SEGMENT_NAME,
                                    error = %e,
                                    "ECS encoding failed, dropping document"
                                );
                                continue;
                            }
                        };
                        if batch.is_empty() {
                            sleep.as_mut().reset(Instant::now() + self.batch_timeout);
                            timer_armed = true;
                        }
                        batch.push(payload);

                        if batch.len() == self.batch_size {
                            timer_armed = false;
                            if client.send(&batch).await == SendOutcome::Cancelled {
                                client.send_no_retry(&batch).await;
                                return;
                            }
                            self.metrics.record_batch(batch.len());
                            if self.batch_debug {
                                tracing::debug!(
                                    segment = SEGMENT_NAME,
                                    server = %self.spec.authority,
                                    count = batch.len(),
                                    "sent full batch"
                                );
                            }
                            batch.clear();
                            // Timer re-arms when the next record arrives.
                        }
                    }
                    Err(_) => {
                        // Queue closed: one final best-effort send, no retries.
                        let count = batch.len();
                        client.send_no_retry(&batch).await;
                        if self.batch_debug {
                            tracing::debug!(
                                segment = SEGMENT_NAME,
                                server = %self.spec.authority,
                                count,
                                "sent final batch"
                            );
                        }
                        return;
                    }
                },
                _ = &mut sleep, if timer_armed => {
                    if !batch.is_empty() {
                        if self.batch_debug {
                            tracing::debug!(
                                segment = SEGMENT_NAME,
                                server = %self.spec.authority,
                                count = batch.len(),
                                capacity = self.batch_size,
                                "sending incomplete batch"
                            );
                        }
                        if client.send(&batch).await == SendOutcome::Cancelled {
                            client.send_no_retry(&batch).await;
                            return;
                        }
                        self.metrics.record_batch(batch.len());
                        batch.clear();
                    } else if self.batch_debug {
                        tracing::debug!(
                            segment = SEGMENT_NAME,
                            server = %self.spec.authority,
                            "timer expired with empty batch"
                        );
                    }
                    sleep.as_mut().reset(Instant::now() + self.batch_timeout);
                }
            }
        }
    }
}

async fn queue_status_loop(
    interval: Duration,
    capacity: usize,
    metrics: Arc<LumberjackMetrics>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let fill = metrics.queue_depth();
                let percent = format!("{:.2}", fill as f64 / capacity as f64 * 100.0);
                tracing::debug!(
                    segment = SEGMENT_NAME,
                    fill,
                    capacity,
                    percent = %percent,
                    "queue status"
                );
            }
            _ = shutdown.cancelled() => return,
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Counters shared by the forward loop, the writers and their clients.
#[derive(Debug, Default)]
pub struct LumberjackMetrics {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    batches_sent: AtomicU64,
    documents_sent: AtomicU64,
    send_errors: AtomicU64,
    reconnects: AtomicU64,
}

impl LumberjackMetrics {
    #[inline]
    fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_dequeued(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_batch(&self, documents: usize) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.documents_sent
            .fetch_add(documents as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Documents currently sitting in the queue.
    fn queue_depth(&self) -> u64 {
        self.enqueued
            .load(Ordering::Relaxed)
            .saturating_sub(self.dequeued.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            documents_sent: self.documents_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of exporter metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub dequeued: u64,
    pub batches_sent: u64,
    pub documents_sent: u64,
    pub send_errors: u64,
    pub reconnects: u64,
}
