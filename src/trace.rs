//! Chrome-tracing collector.
//!
//! An observer that records one span per completed task into a per-worker
//! ring buffer and exports everything collected as a JSON file loadable in
//! chrome://tracing or ui.perfetto.dev. Each ring has exactly one writer
//! (its worker), and old events fall off the back instead of growing the
//! buffers, so tracing can stay enabled in long runs.

use crate::observer::SchedulerObserver;
use crate::ring_buffer::ConcurrentRingBuffer;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::time::Instant;

/// A recorded task span.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub name: &'static str,
    pub worker: usize,
    pub start_us: u64,
    pub duration_us: u64,
}

/// Chrome trace "complete event" wire format.
#[derive(Serialize)]
struct ChromeSpan {
    name: &'static str,
    ph: &'static str,
    ts: u64,
    dur: u64,
    pid: u32,
    tid: u32,
}

pub struct ChromeTracer {
    rings: Vec<ConcurrentRingBuffer<TraceEvent>>,
    epoch: Instant,
}

impl ChromeTracer {
    /// A tracer for `worker_count` workers keeping the default number of
    /// recent events per worker.
    pub fn for_workers(worker_count: usize) -> Self {
        ChromeTracer::with_capacity(worker_count, 4096)
    }

    /// A tracer keeping the latest `events_per_worker` spans per worker;
    /// must be a power of two.
    pub fn with_capacity(worker_count: usize, events_per_worker: usize) -> Self {
        ChromeTracer {
            rings: (0..worker_count)
                .map(|_| ConcurrentRingBuffer::new(events_per_worker))
                .collect(),
            epoch: Instant::now(),
        }
    }

    /// Removes and returns everything collected so far, oldest first per
    /// worker.
    pub fn drain(&self) -> Vec<TraceEvent> {
        let mut events = Vec::new();
        for ring in &self.rings {
            ring.pop_all(&mut events, ring.capacity());
        }
        events
    }

    /// Drains the collected spans into a Chrome-tracing JSON file.
    pub fn export_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let spans: Vec<ChromeSpan> = self
            .drain()
            .into_iter()
            .map(|event| ChromeSpan {
                name: event.name,
                ph: "X",
                ts: event.start_us,
                dur: event.duration_us,
                pid: 1,
                tid: event.worker as u32,
            })
            .collect();

        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, &spans)
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))
    }
}

impl SchedulerObserver for ChromeTracer {
    fn on_task_stop(&self, worker: usize, debug_id: &'static str, started_at: Instant) {
        if let Some(ring) = self.rings.get(worker) {
            let start_us = started_at
                .saturating_duration_since(self.epoch)
                .as_micros() as u64;
            ring.push(TraceEvent {
                name: debug_id,
                worker,
                start_us,
                duration_us: started_at.elapsed().as_micros() as u64,
            });
        }
    }
}
