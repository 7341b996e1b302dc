//! Reversedns segment - PTR lookup enrichment
//!
//! Resolves hostnames for the source, destination, next-hop and sampler
//! addresses of every flow. The four lookups per flow run concurrently and
//! share a single two-second budget; whatever has not resolved when the
//! budget runs out stays empty. Lookup failures are not errors - the
//! hostname fields are simply left blank.
//!
//! Lookups for consecutive flows overlap: each flow's resolution runs as its
//! own task and a bounded queue of pending results preserves input order on
//! the output. The `queuelength` option bounds that queue (default
//! 2,000,000 pending flows).
//!
//! When the `addrstrings` segment ran earlier in the pipeline its string
//! fields are preferred over re-deriving the addresses from raw bytes.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use flowpipe_flow::FlowRecord;
use flowpipe_pipeline::{
    FlowReceiver, FlowSender, PipelineError, Result, Segment, SegmentConfig, SegmentFactory,
    SegmentIo,
};

#[cfg(test)]
#[path = "reversedns_test.rs"]
mod tests;

const SEGMENT_NAME: &str = "reversedns";
const DEFAULT_QUEUE_LENGTH: usize = 2_000_000;

/// Shared budget for the four lookups of one flow.
const LOOKUP_BUDGET: Duration = Duration::from_secs(2);

pub struct ReverseDns {
    io: SegmentIo,
    queue_length: usize,
    resolver: TokioAsyncResolver,
}

impl std::fmt::Debug for ReverseDns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseDns")
            .field("queue_length", &self.queue_length)
            .finish()
    }
}

pub struct ReverseDnsFactory;

impl SegmentFactory for ReverseDnsFactory {
    fn name(&self) -> &'static str {
        SEGMENT_NAME
    }

    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let queue_length = config
            .get_u64(SEGMENT_NAME, "queuelength")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_QUEUE_LENGTH);
        if queue_length == 0 {
            return Err(PipelineError::invalid_option(
                SEGMENT_NAME,
                "queuelength",
                "must be at least 1",
            ));
        }

        let resolver = TokioAsyncResolver::tokio_from_system_conf().map_err(|e| {
            PipelineError::Config(format!("reversedns: cannot initialize resolver: {e}"))
        })?;

        Ok(Box::new(ReverseDns {
            io: SegmentIo::default(),
            queue_length,
            resolver,
        }))
    }
}

#[async_trait]
impl Segment for ReverseDns {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();

        // Pending resolutions, in input order. The drainer awaits each in
        // turn so output order matches input order even though lookups
        // overlap.
        let (queue_tx, mut queue_rx) =
            tokio::sync::mpsc::channel::<JoinHandle<FlowRecord>>(self.queue_length);

        let drainer = tokio::spawn(async move {
            while let Some(pending) = queue_rx.recv().await {
                match pending.await {
                    Ok(flow) => {
                        if output.send(flow).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(segment = SEGMENT_NAME, error = %e, "lookup task failed");
                    }
                }
            }
        });

        while let Some(flow) = input.recv().await {
            let resolver = self.resolver.clone();
            let pending = tokio::spawn(resolve_flow(resolver, flow));
            if queue_tx.send(pending).await.is_err() {
                break;
            }
        }

        drop(queue_tx);
        let _ = drainer.await;
    }
}

async fn resolve_flow(resolver: TokioAsyncResolver, mut flow: FlowRecord) -> FlowRecord {
    let src = lookup_target(&flow.source_ip, flow.src_addr_ip());
    let dst = lookup_target(&flow.destination_ip, flow.dst_addr_ip());
    let next_hop = lookup_target(&flow.next_hop_ip, flow.next_hop_addr_ip());
    let sampler = lookup_target(&flow.sampler_ip, flow.sampler_addr_ip());

    // One deadline across all four lookups.
    let deadline = Instant::now() + LOOKUP_BUDGET;
    let (src, dst, next_hop, sampler) = tokio::join!(
        lookup(&resolver, deadline, src),
        lookup(&resolver, deadline, dst),
        lookup(&resolver, deadline, next_hop),
        lookup(&resolver, deadline, sampler),
    );

    if let Some(name) = src {
        flow.src_host_name = name;
    }
    if let Some(name) = dst {
        flow.dst_host_name = name;
    }
    if let Some(name) = next_hop {
        flow.next_hop_host_name = name;
    }
    if let Some(name) = sampler {
        flow.sampler_host_name = name;
    }
    flow
}

/// Prefer the addrstrings-enriched text form, fall back to the raw bytes.
fn lookup_target(enriched: &str, raw: Option<IpAddr>) -> Option<IpAddr> {
    if !enriched.is_empty() {
        if let Ok(ip) = enriched.parse() {
            return Some(ip);
        }
    }
    raw
}

async fn lookup(
    resolver: &TokioAsyncResolver,
    deadline: Instant,
    target: Option<IpAddr>,
) -> Option<String> {
    let ip = target?;
    match timeout_at(deadline, resolver.reverse_lookup(ip)).await {
        Ok(Ok(names)) => names.iter().next().map(|name| name.to_string()),
        // NXDOMAIN, server failure, or budget exhausted: leave empty.
        _ => None,
    }
}
