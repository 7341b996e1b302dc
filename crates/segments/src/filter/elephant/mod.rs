//! Elephant segment - top-percentile admission
//!
//! Forwards only flows whose size is at or above a percentile threshold
//! computed over a sliding window of recently observed flows. With an empty
//! window everything is admitted, so a fresh pipeline ramps up instead of
//! dropping its first flows.
//!
//! Options:
//!
//! - `aspect`: `bytes` (default) or `packets`
//! - `percentile`: threshold percentile, 0 < p <= 100 (default 99.0)
//! - `window`: how long observed values stay relevant (default 5m)

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use flowpipe_flow::FlowRecord;
use flowpipe_pipeline::{
    FlowReceiver, FlowSender, PipelineError, Result, Segment, SegmentConfig, SegmentFactory,
    SegmentIo,
};

#[cfg(test)]
#[path = "elephant_test.rs"]
mod tests;

const SEGMENT_NAME: &str = "elephant";
const DEFAULT_PERCENTILE: f64 = 99.0;
const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aspect {
    Bytes,
    Packets,
}

impl Aspect {
    fn value(self, flow: &FlowRecord) -> u64 {
        match self {
            Aspect::Bytes => flow.bytes,
            Aspect::Packets => flow.packets,
        }
    }
}

#[derive(Debug)]
pub struct Elephant {
    io: SegmentIo,
    aspect: Aspect,
    percentile: f64,
    window: Duration,
}

pub struct ElephantFactory;

impl SegmentFactory for ElephantFactory {
    fn name(&self) -> &'static str {
        SEGMENT_NAME
    }

    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let aspect = match config.get("aspect") {
            None | Some("bytes") => Aspect::Bytes,
            Some("packets") => Aspect::Packets,
            Some(other) => {
                return Err(PipelineError::invalid_option(
                    SEGMENT_NAME,
                    "aspect",
                    format!("'{other}' is neither 'bytes' nor 'packets'"),
                ))
            }
        };

        let percentile = config
            .get_f64(SEGMENT_NAME, "percentile")?
            .unwrap_or(DEFAULT_PERCENTILE);
        if !(percentile > 0.0 && percentile <= 100.0) {
            return Err(PipelineError::invalid_option(
                SEGMENT_NAME,
                "percentile",
                format!("{percentile} is outside (0, 100]"),
            ));
        }

        let window = config
            .get_duration(SEGMENT_NAME, "window")?
            .unwrap_or(DEFAULT_WINDOW);

        Ok(Box::new(Elephant {
            io: SegmentIo::default(),
            aspect,
            percentile,
            window,
        }))
    }
}

#[async_trait]
impl Segment for Elephant {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();
        let mut window = SlidingWindow::new(self.window);

        while let Some(flow) = input.recv().await {
            let value = self.aspect.value(&flow);
            let admit = match window.threshold(self.percentile) {
                Some(threshold) => value >= threshold,
                None => true,
            };
            window.observe(value);
            if !admit {
                continue;
            }
            if output.send(flow).await.is_err() {
                break;
            }
        }
    }
}

/// Time-bounded multiset of observed values with percentile lookup.
struct SlidingWindow {
    max_age: Duration,
    entries: VecDeque<(Instant, u64)>,
    sorted: Vec<u64>,
}

impl SlidingWindow {
    fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            entries: VecDeque::new(),
            sorted: Vec::new(),
        }
    }

    fn observe(&mut self, value: u64) {
        let now = Instant::now();
        self.expire(now);
        self.entries.push_back((now, value));
        let at = self.sorted.partition_point(|v| *v < value);
        self.sorted.insert(at, value);
    }

    /// The value at the given percentile, `None` while the window is empty.
    fn threshold(&mut self, percentile: f64) -> Option<u64> {
        self.expire(Instant::now());
        if self.sorted.is_empty() {
            return None;
        }
        let rank = ((percentile / 100.0) * self.sorted.len() as f64).ceil() as usize;
        let idx = rank.clamp(1, self.sorted.len()) - 1;
        Some(self.sorted[idx])
    }

    fn expire(&mut self, now: Instant) {
        while let Some((at, value)) = self.entries.front().copied() {
            if now.duration_since(at) <= self.max_age {
                break;
            }
            self.entries.pop_front();
            if let Ok(pos) = self.sorted.binary_search(&value) {
                self.sorted.remove(pos);
            }
        }
    }
}
