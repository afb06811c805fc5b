// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The producer: a stage with a dedicated frame-acquisition thread.
//!
//! A `PipelineStage` owns a [`StageController`] for its hardware channels
//! and runs one OS thread that polls the designated channel with a bounded
//! wait, hands each frame to the currently attached sink, and returns the
//! frame to the platform. The sink is held behind its own lock, separate
//! from the lifecycle lock, so attach/detach never contends with start/stop
//! and a slow consumer delays teardown only by the in-flight dispatch.
//!
//! Frame accounting is strict: every successfully polled frame is released
//! exactly once, in the same iteration, whether or not a sink is attached
//! and whatever the sink does with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nvrkit_core::error::NvrKitError;
use nvrkit_core::frame::FrameHandle;
use nvrkit_core::platform::{ChannelId, MediaPlatform, PollError};
use nvrkit_core::sink::FrameSink;
use nvrkit_core::state::{StageState, StateCell};
use opentelemetry::metrics::Counter;
use opentelemetry::KeyValue;

use crate::constants::{DEFAULT_POLL_TIMEOUT, POLL_CHANNEL_DEPTH};
use crate::stage_controller::{StageController, StagePlan};

type SinkSlot = Mutex<Option<Arc<dyn FrameSink>>>;

struct Lifecycle {
    initialized: bool,
    worker: Option<JoinHandle<()>>,
}

/// A hardware stage with a dedicated acquisition thread.
pub struct PipelineStage {
    name: String,
    platform: Arc<dyn MediaPlatform>,
    controller: StageController,
    poll_timeout: Duration,
    state: Arc<StateCell>,
    sink: Arc<SinkSlot>,
    lifecycle: Mutex<Lifecycle>,
    frames_acquired: Counter<u64>,
    polls_empty: Counter<u64>,
    metric_labels: [KeyValue; 1],
}

impl PipelineStage {
    pub fn new(name: impl Into<String>, platform: Arc<dyn MediaPlatform>) -> Self {
        Self::with_poll_timeout(name, platform, DEFAULT_POLL_TIMEOUT)
    }

    pub fn with_poll_timeout(
        name: impl Into<String>,
        platform: Arc<dyn MediaPlatform>,
        poll_timeout: Duration,
    ) -> Self {
        let name = name.into();
        let meter = opentelemetry::global::meter("nvrkit_engine");
        let frames_acquired = meter
            .u64_counter("pipeline_stage.frames_acquired")
            .with_description("Frames pulled from the hardware channel")
            .build();
        let polls_empty = meter
            .u64_counter("pipeline_stage.polls_empty")
            .with_description("Bounded polls that returned no frame")
            .build();
        let metric_labels = [KeyValue::new("stage", name.clone())];

        Self {
            controller: StageController::new(name.clone(), Arc::clone(&platform)),
            platform,
            poll_timeout,
            state: Arc::new(StateCell::new()),
            sink: Arc::new(Mutex::new(None)),
            lifecycle: Mutex::new(Lifecycle { initialized: false, worker: None }),
            frames_acquired,
            polls_empty,
            metric_labels,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The controller owning this stage's channels. Orchestrators use it to
    /// resolve channels for cross-stage binds.
    pub const fn controller(&self) -> &StageController {
        &self.controller
    }

    pub fn state(&self) -> StageState {
        self.state.get()
    }

    /// Brings up the planned channels and starts the acquisition worker on
    /// the channel labelled `poll_label`.
    ///
    /// All-or-nothing: on any failure the prefix of channels that came up
    /// is released before the error is returned, and no thread is started.
    ///
    /// # Errors
    ///
    /// [`NvrKitError::DuplicateInitialization`] when already initialized;
    /// otherwise the failing start sub-step or platform call.
    pub fn initialize(&self, plan: &StagePlan, poll_label: &'static str) -> Result<(), NvrKitError> {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.initialized {
            return Err(NvrKitError::DuplicateInitialization(self.name.clone()));
        }

        if let Err(e) = self.controller.start_stage(plan) {
            self.controller.stop_stage();
            return Err(e.into());
        }

        let Some(poll_channel) = self.controller.channel(poll_label) else {
            self.controller.stop_stage();
            return Err(NvrKitError::InvalidArguments(format!(
                "stage '{}' has no channel labelled '{poll_label}' to poll",
                self.name
            )));
        };

        if let Err(e) = self.platform.set_channel_depth(poll_channel, POLL_CHANNEL_DEPTH) {
            self.controller.stop_stage();
            return Err(e.into());
        }

        // Running before the thread spawns, so the worker's first loop
        // check sees a consistent state.
        if !self.state.try_start() {
            self.controller.stop_stage();
            return Err(NvrKitError::DuplicateInitialization(self.name.clone()));
        }

        let worker = Worker {
            stage: self.name.clone(),
            platform: Arc::clone(&self.platform),
            channel: poll_channel,
            timeout: self.poll_timeout,
            state: Arc::clone(&self.state),
            sink: Arc::clone(&self.sink),
            frames_acquired: self.frames_acquired.clone(),
            metric_labels: self.metric_labels.clone(),
            polls_empty: self.polls_empty.clone(),
        };
        let spawned =
            thread::Builder::new().name(format!("{}-acquire", self.name)).spawn(move || worker.run());
        match spawned {
            Ok(handle) => lifecycle.worker = Some(handle),
            Err(e) => {
                self.state.mark_stopped();
                self.controller.stop_stage();
                return Err(e.into());
            },
        }

        lifecycle.initialized = true;
        tracing::info!(stage = %self.name, %poll_channel, "stage initialized");
        Ok(())
    }

    /// Replaces (or, with `None`, detaches) the sink receiving acquired
    /// frames.
    ///
    /// Safe to call while the worker is dispatching: for any given frame
    /// the worker observes either the previous or the new sink, never a
    /// torn value.
    pub fn set_sink(&self, sink: Option<Arc<dyn FrameSink>>) {
        *self.lock_sink() = sink;
    }

    pub fn has_sink(&self) -> bool {
        self.lock_sink().is_some()
    }

    /// Stops the worker, tears the channels down in reverse creation order
    /// and clears the sink.
    ///
    /// Idempotent, a no-op when never initialized, and safe when the worker
    /// already exited on a poll failure (the join returns immediately).
    pub fn close(&self) {
        let mut lifecycle = self.lock_lifecycle();
        if !lifecycle.initialized {
            return;
        }
        lifecycle.initialized = false;

        self.state.request_stop();
        if let Some(worker) = lifecycle.worker.take() {
            if worker.join().is_err() {
                tracing::error!(stage = %self.name, "acquisition thread panicked");
            }
        }

        self.controller.stop_stage();
        self.lock_sink().take();
        tracing::info!(stage = %self.name, "stage closed");
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sink(&self) -> MutexGuard<'_, Option<Arc<dyn FrameSink>>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PipelineStage {
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything the acquisition thread needs, detached from the stage so the
/// stage itself can be closed while the thread unwinds.
struct Worker {
    stage: String,
    platform: Arc<dyn MediaPlatform>,
    channel: ChannelId,
    timeout: Duration,
    state: Arc<StateCell>,
    sink: Arc<SinkSlot>,
    frames_acquired: Counter<u64>,
    polls_empty: Counter<u64>,
    metric_labels: [KeyValue; 1],
}

impl Worker {
    fn run(self) {
        tracing::debug!(stage = %self.stage, channel = %self.channel, "acquisition loop started");

        while self.state.is_running() {
            match self.platform.poll_frame(self.channel, self.timeout) {
                Err(PollError::Empty) => {
                    // Backpressure from the hardware queue, not a failure.
                    self.polls_empty.add(1, &self.metric_labels);
                    tracing::warn!(stage = %self.stage, "frame queue empty, retrying");
                },
                Err(PollError::Platform(e)) => {
                    tracing::error!(
                        stage = %self.stage,
                        error = %e,
                        "poll failed, stopping acquisition"
                    );
                    break;
                },
                Ok(frame) => {
                    self.frames_acquired.add(1, &self.metric_labels);
                    self.dispatch(&frame);
                    // Exactly one release per acquired frame, sink or no sink.
                    if let Err(e) = self.platform.release_frame(self.channel, frame) {
                        tracing::error!(
                            stage = %self.stage,
                            error = %e,
                            "frame release failed, stopping acquisition"
                        );
                        break;
                    }
                },
            }
        }

        self.state.mark_stopped();
        tracing::debug!(stage = %self.stage, "acquisition loop exited");
    }

    /// Hands the frame to the attached sink, if any. Failures and panics
    /// are contained here so the caller can still release the frame.
    fn dispatch(&self, frame: &FrameHandle) {
        let guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sink) = guard.as_ref() else { return };
        match catch_unwind(AssertUnwindSafe(|| sink.on_frame(frame))) {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                tracing::warn!(
                    stage = %self.stage,
                    sink = sink.label(),
                    error = %e,
                    "sink rejected frame"
                );
            },
            Err(_) => {
                tracing::error!(
                    stage = %self.stage,
                    sink = sink.label(),
                    "sink panicked while handling frame"
                );
            },
        }
    }
}
