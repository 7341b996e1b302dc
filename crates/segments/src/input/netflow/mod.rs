//! Netflow collector segment
//!
//! Source segment: binds UDP sockets, decodes NetFlow v5/v9 and IPFIX
//! datagrams, and emits the decoded flows downstream. Records arriving on
//! the segment's own input (synthetic ingress, chained sources) are
//! forwarded transparently alongside the decoded stream.
//!
//! Options:
//!
//! - `listen`: comma-separated `netflow://host:port` URLs
//!   (default `netflow://0.0.0.0:2055`)
//! - `workers`: receive/decode tasks per socket (default 1)
//! - `sockets`: SO_REUSEPORT sockets per listen endpoint (default 1)
//! - `queuesize`: decoded-flow queue between receivers and the pipeline
//!   (default 1,000,000). A full queue drops packets instead of blocking
//!   the socket; drops are counted and logged at most once per second.
//! - `metrics_address`: optional `host:port` serving receiver counters in
//!   Prometheus text format under `/metrics`
//!
//! sFlow is not decoded here; `sflow://` endpoints are rejected at
//! configuration time.

mod decode;

pub use decode::{DecodeError, Decoder};

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use url::Url;

use flowpipe_flow::FlowRecord;
use flowpipe_pipeline::{
    FlowReceiver, FlowSender, PipelineError, Result, Segment, SegmentConfig, SegmentFactory,
    SegmentIo,
};

#[cfg(test)]
#[path = "netflow_test.rs"]
mod tests;

const SEGMENT_NAME: &str = "netflow";
const DEFAULT_LISTEN: &str = "netflow://0.0.0.0:2055";
const DEFAULT_QUEUE_SIZE: usize = 1_000_000;
const RECEIVE_BUFFER: usize = 4 * 1024 * 1024;
const MAX_DATAGRAM: usize = 9000;
const LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Listener {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Options {
    pub listeners: Vec<Listener>,
    pub workers: usize,
    pub sockets: usize,
    pub queue_size: usize,
    pub metrics_address: Option<String>,
}

pub(crate) fn parse_options(config: &SegmentConfig) -> Result<Options> {
    let listen = config.get("listen").unwrap_or(DEFAULT_LISTEN);
    let mut listeners = Vec::new();
    for raw in listen.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let url = Url::parse(raw).map_err(|e| {
            PipelineError::invalid_option(SEGMENT_NAME, "listen", format!("{raw}: {e}"))
        })?;
        match url.scheme() {
            "netflow" => {}
            "sflow" => {
                return Err(PipelineError::invalid_option(
                    SEGMENT_NAME,
                    "listen",
                    format!("{raw}: sflow decoding is not built in"),
                ))
            }
            other => {
                return Err(PipelineError::invalid_option(
                    SEGMENT_NAME,
                    "listen",
                    format!("{raw}: unsupported scheme '{other}'"),
                ))
            }
        }
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => "0.0.0.0".to_string(),
        };
        let port = url.port().ok_or_else(|| {
            PipelineError::invalid_option(SEGMENT_NAME, "listen", format!("{raw}: missing port"))
        })?;
        listeners.push(Listener { host, port });
    }
    if listeners.is_empty() {
        return Err(PipelineError::invalid_option(
            SEGMENT_NAME,
            "listen",
            "no listen endpoints",
        ));
    }

    let workers = config.get_u64(SEGMENT_NAME, "workers")?.unwrap_or(1) as usize;
    if workers == 0 {
        return Err(PipelineError::invalid_option(
            SEGMENT_NAME,
            "workers",
            "must be at least 1",
        ));
    }
    let sockets = config.get_u64(SEGMENT_NAME, "sockets")?.unwrap_or(1) as usize;
    if sockets == 0 {
        return Err(PipelineError::invalid_option(
            SEGMENT_NAME,
            "sockets",
            "must be at least 1",
        ));
    }
    let queue_size = config
        .get_u64(SEGMENT_NAME, "queuesize")?
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_QUEUE_SIZE);
    if queue_size == 0 {
        return Err(PipelineError::invalid_option(
            SEGMENT_NAME,
            "queuesize",
            "must be at least 1",
        ));
    }

    Ok(Options {
        listeners,
        workers,
        sockets,
        queue_size,
        metrics_address: config.get("metrics_address").map(String::from),
    })
}

#[derive(Debug)]
pub struct Netflow {
    io: SegmentIo,
    options: Options,
    metrics: Arc<CollectorMetrics>,
}

pub struct NetflowFactory;

impl SegmentFactory for NetflowFactory {
    fn name(&self) -> &'static str {
        SEGMENT_NAME
    }

    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let options = parse_options(config)?;
        Ok(Box::new(Netflow {
            io: SegmentIo::default(),
            options,
            metrics: Arc::new(CollectorMetrics::default()),
        }))
    }
}

#[async_trait]
impl Segment for Netflow {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();
        let (decoded_tx, mut decoded_rx) = mpsc::channel::<FlowRecord>(self.options.queue_size);

        if let Some(address) = self.options.metrics_address.clone() {
            tokio::spawn(serve_metrics(address, Arc::clone(&self.metrics)));
        }

        let drop_log = Arc::new(RateLimited::new(LOG_INTERVAL));
        let error_log = Arc::new(RateLimited::new(LOG_INTERVAL));

        for listener in &self.options.listeners {
            for socket_index in 0..self.options.sockets {
                let socket = match bind_socket(&listener.host, listener.port) {
                    Ok(socket) => Arc::new(socket),
                    Err(e) => {
                        tracing::error!(
                            segment = SEGMENT_NAME,
                            host = %listener.host,
                            port = listener.port,
                            error = %e,
                            "cannot bind netflow listener"
                        );
                        std::process::exit(1);
                    }
                };
                tracing::info!(
                    segment = SEGMENT_NAME,
                    host = %listener.host,
                    port = listener.port,
                    socket = socket_index,
                    "listening for netflow/ipfix"
                );

                // One template cache per socket: templates and their data
                // records arrive on the same socket.
                let decoder = Arc::new(Mutex::new(Decoder::new()));
                for _ in 0..self.options.workers {
                    tokio::spawn(receive_loop(
                        Arc::clone(&socket),
                        Arc::clone(&decoder),
                        decoded_tx.clone(),
                        Arc::clone(&self.metrics),
                        Arc::clone(&drop_log),
                        Arc::clone(&error_log),
                    ));
                }
            }
        }
        drop(decoded_tx);

        // Forward decoded flows and anything arriving on the segment input.
        // Input closure is the stop signal; the receive tasks notice the
        // dropped queue on their next decoded flow and exit.
        loop {
            tokio::select! {
                decoded = decoded_rx.recv() => match decoded {
                    Some(flow) => {
                        if output.send(flow).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                upstream = input.recv() => match upstream {
                    Some(flow) => {
                        if output.send(flow).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    decoder: Arc<Mutex<Decoder>>,
    decoded_tx: mpsc::Sender<FlowRecord>,
    metrics: Arc<CollectorMetrics>,
    drop_log: Arc<RateLimited>,
    error_log: Arc<RateLimited>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                if error_log.permit() {
                    tracing::warn!(segment = SEGMENT_NAME, error = %e, "socket receive error");
                }
                continue;
            }
        };
        metrics.record_packet();

        let decoded = decoder.lock().decode(&buf[..len], peer.ip());
        match decoded {
            Ok(flows) => {
                for flow in flows {
                    match decoded_tx.try_send(flow) {
                        Ok(()) => metrics.record_flow(),
                        Err(TrySendError::Full(_)) => {
                            metrics.record_drop();
                            if drop_log.permit() {
                                tracing::warn!(
                                    segment = SEGMENT_NAME,
                                    dropped = metrics.dropped(),
                                    "flow queue full, dropping"
                                );
                            }
                        }
                        Err(TrySendError::Closed(_)) => return,
                    }
                }
            }
            Err(e) => {
                metrics.record_decode_error();
                if error_log.permit() {
                    tracing::warn!(
                        segment = SEGMENT_NAME,
                        peer = %peer,
                        error = %e,
                        "dropping undecodable packet"
                    );
                }
            }
        }
    }
}

fn bind_socket(host: &str, port: u16) -> io::Result<UdpSocket> {
    let addr: SocketAddr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "address did not resolve"))?;

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    // Best effort; the kernel may clamp this.
    let _ = socket.set_recv_buffer_size(RECEIVE_BUFFER);
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

// =============================================================================
// Metrics
// =============================================================================

/// Receiver counters, exposed on the optional metrics endpoint.
#[derive(Debug, Default)]
pub struct CollectorMetrics {
    packets: AtomicU64,
    flows: AtomicU64,
    decode_errors: AtomicU64,
    dropped: AtomicU64,
}

impl CollectorMetrics {
    #[inline]
    fn record_packet(&self) {
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_flow(&self) {
        self.flows.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of the counters.
    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for (name, help, value) in [
            (
                "flowpipe_netflow_packets_total",
                "Datagrams received",
                self.packets.load(Ordering::Relaxed),
            ),
            (
                "flowpipe_netflow_flows_total",
                "Flow records decoded and enqueued",
                self.flows.load(Ordering::Relaxed),
            ),
            (
                "flowpipe_netflow_decode_errors_total",
                "Datagrams dropped as undecodable",
                self.decode_errors.load(Ordering::Relaxed),
            ),
            (
                "flowpipe_netflow_dropped_flows_total",
                "Flow records dropped on a full queue",
                self.dropped.load(Ordering::Relaxed),
            ),
        ] {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out
    }
}

async fn serve_metrics(address: String, metrics: Arc<CollectorMetrics>) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(
                segment = SEGMENT_NAME,
                %address,
                error = %e,
                "cannot bind metrics endpoint"
            );
            std::process::exit(1);
        }
    };
    tracing::info!(segment = SEGMENT_NAME, %address, "serving receiver metrics");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(segment = SEGMENT_NAME, error = %e, "metrics endpoint failed");
    }
}

async fn metrics_handler(State(metrics): State<Arc<CollectorMetrics>>) -> String {
    metrics.render()
}

/// Permits an action at most once per interval.
struct RateLimited {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimited {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    fn permit(&self) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(at) if at.elapsed() < self.interval => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }
}
