// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Synchronous one-to-many frame distribution.
//!
//! A `SinkChain` lets any number of consumers observe every frame a
//! terminal stage emits, without the producer knowing how many there are.
//! Dispatch is a single synchronous pass in insertion order under the chain
//! lock; membership changes take the same lock, so a dispatch never
//! observes a partially mutated set. There is no internal queueing and no
//! backpressure buffering: a slow consumer delays the pass, nothing else.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nvrkit_core::frame::FrameHandle;
use nvrkit_core::sink::{FrameSink, SinkError};
use opentelemetry::metrics::{Counter, Gauge};
use opentelemetry::KeyValue;
use smallvec::SmallVec;

/// Live plus record plus the odd tap; four slots cover that inline.
type Sinks = SmallVec<[Arc<dyn FrameSink>; 4]>;

/// Insertion-ordered fan-out of frames to attached sinks.
pub struct SinkChain {
    label: String,
    sinks: Mutex<Sinks>,
    /// Telemetry: frames delivered to every attached sink
    frames_distributed: Counter<u64>,
    /// Telemetry: frames that arrived with no sink attached
    frames_dropped: Counter<u64>,
    /// Telemetry: sink callbacks that failed or panicked
    sink_errors: Counter<u64>,
    /// Telemetry: number of attached sinks
    sinks_active: Gauge<u64>,
    /// Pre-built metric labels - allocated once, reused on every frame
    metric_labels: [KeyValue; 1],
}

impl SinkChain {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let meter = opentelemetry::global::meter("nvrkit_engine");
        let frames_distributed = meter
            .u64_counter("sink_chain.frames_distributed")
            .with_description("Frames delivered to every attached sink")
            .build();
        let frames_dropped = meter
            .u64_counter("sink_chain.frames_dropped")
            .with_description("Frames that arrived with no sink attached")
            .build();
        let sink_errors = meter
            .u64_counter("sink_chain.sink_errors")
            .with_description("Sink callbacks that failed or panicked")
            .build();
        let sinks_active = meter
            .u64_gauge("sink_chain.sinks_active")
            .with_description("Number of sinks attached to a chain")
            .build();

        let metric_labels = [KeyValue::new("chain", label.clone())];
        sinks_active.record(0, &metric_labels);

        Self {
            label,
            sinks: Mutex::new(SmallVec::new()),
            frames_distributed,
            frames_dropped,
            sink_errors,
            sinks_active,
            metric_labels,
        }
    }

    /// Appends `sink` to the chain. It observes every frame dispatched
    /// after this call returns.
    pub fn add_sink(&self, sink: Arc<dyn FrameSink>) {
        let mut sinks = self.lock_sinks();
        tracing::debug!(chain = %self.label, sink = sink.label(), "sink attached");
        sinks.push(sink);
        self.sinks_active.record(sinks.len() as u64, &self.metric_labels);
    }

    /// Removes `sink` by pointer identity. Unknown sinks are ignored.
    pub fn remove_sink(&self, sink: &Arc<dyn FrameSink>) {
        let mut sinks = self.lock_sinks();
        sinks.retain(|attached| !Arc::ptr_eq(attached, sink));
        tracing::debug!(chain = %self.label, sink = sink.label(), "sink detached");
        self.sinks_active.record(sinks.len() as u64, &self.metric_labels);
    }

    /// Detaches every sink.
    pub fn clear_sinks(&self) {
        let mut sinks = self.lock_sinks();
        sinks.clear();
        self.sinks_active.record(0, &self.metric_labels);
    }

    pub fn len(&self) -> usize {
        self.lock_sinks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_sinks().is_empty()
    }

    /// One synchronous pass over every attached sink, in insertion order.
    ///
    /// The lock is held for the whole pass, so membership never changes
    /// mid-dispatch. A failing or panicking member is logged and counted
    /// and the pass continues with the remaining members; nothing
    /// propagates to the caller.
    pub fn dispatch(&self, frame: &FrameHandle) {
        let sinks = self.lock_sinks();
        if sinks.is_empty() {
            self.frames_dropped.add(1, &self.metric_labels);
            return;
        }

        for sink in sinks.iter() {
            match catch_unwind(AssertUnwindSafe(|| sink.on_frame(frame))) {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    self.sink_errors.add(1, &self.metric_labels);
                    tracing::warn!(
                        chain = %self.label,
                        sink = sink.label(),
                        error = %e,
                        "sink rejected frame"
                    );
                },
                Err(_) => {
                    self.sink_errors.add(1, &self.metric_labels);
                    tracing::error!(
                        chain = %self.label,
                        sink = sink.label(),
                        "sink panicked while handling frame"
                    );
                },
            }
        }
        self.frames_distributed.add(1, &self.metric_labels);
    }

    fn lock_sinks(&self) -> MutexGuard<'_, Sinks> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameSink for SinkChain {
    fn label(&self) -> &str {
        &self.label
    }

    fn on_frame(&self, frame: &FrameHandle) -> Result<(), SinkError> {
        self.dispatch(frame);
        Ok(())
    }
}
