// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Test doubles for lifecycle and distribution testing.
//!
//! [`MockPlatform`] records every platform call in order, serves scripted
//! frames and failures, and trips violation flags on the invariants the
//! lifecycle code must never break: double destroy, destroy of an unknown
//! channel, and release of a frame that is not outstanding.
//!
//! [`RecordingSink`] captures delivered frames and can be scripted to fail
//! or panic, for exercising the producer's containment paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use nvrkit_core::frame::{FrameHandle, PixelFormat};
use nvrkit_core::platform::{ChannelId, ChannelSpec, MediaPlatform, PlatformError, PollError};
use nvrkit_core::sink::{FrameSink, SinkError};

/// One platform call, as observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Create(ChannelId),
    Configure(ChannelId),
    Enable(ChannelId),
    Disable(ChannelId),
    Destroy(ChannelId),
    SetDepth(ChannelId, u32),
    Bind(ChannelId, ChannelId),
    Unbind(ChannelId, ChannelId),
    Release(ChannelId, u64),
}

#[derive(Debug, Clone, Copy)]
struct ScriptedFailure {
    /// 1-based call index of the op at which to fail.
    at: usize,
    code: i32,
    seen: usize,
}

#[derive(Default)]
struct MockState {
    next_id: u32,
    /// id -> enabled
    live: HashMap<ChannelId, bool>,
    calls: Vec<PlatformCall>,
    bindings: Vec<(ChannelId, ChannelId)>,
    outstanding: HashSet<(ChannelId, u64)>,
    queues: HashMap<ChannelId, VecDeque<Result<FrameHandle, PlatformError>>>,
    failures: HashMap<&'static str, ScriptedFailure>,
    violations: Vec<String>,
}

/// Recording, scriptable [`MediaPlatform`] double.
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
    queued: Condvar,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `nth` upcoming call (1-based) of `op` with `code`.
    pub fn fail_nth(&self, op: &'static str, nth: usize, code: i32) {
        self.lock().failures.insert(op, ScriptedFailure { at: nth, code, seen: 0 });
    }

    /// Fails the next call of `op`.
    pub fn fail_next(&self, op: &'static str, code: i32) {
        self.fail_nth(op, 1, code);
    }

    /// Queues a frame on `id`; a blocked poller wakes immediately.
    pub fn push_frame(&self, id: ChannelId, frame: FrameHandle) {
        self.lock().queues.entry(id).or_default().push_back(Ok(frame));
        self.queued.notify_all();
    }

    /// Queues a fatal poll outcome on `id`.
    pub fn push_poll_error(&self, id: ChannelId, code: i32) {
        self.lock()
            .queues
            .entry(id)
            .or_default()
            .push_back(Err(PlatformError::new("poll_frame", code)));
        self.queued.notify_all();
    }

    /// Everything that happened, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    /// Invariant breaches observed so far. Empty in a correct run.
    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    /// Frames polled but not yet released.
    pub fn outstanding_frames(&self) -> usize {
        self.lock().outstanding.len()
    }

    /// Release calls observed, in order.
    pub fn releases(&self) -> Vec<(ChannelId, u64)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                PlatformCall::Release(id, buffer) => Some((*id, *buffer)),
                _ => None,
            })
            .collect()
    }

    /// Channels still alive (created, not destroyed).
    pub fn live_channels(&self) -> usize {
        self.lock().live.len()
    }

    /// Hardware bindings currently in place.
    pub fn bindings(&self) -> Vec<(ChannelId, ChannelId)> {
        self.lock().bindings.clone()
    }

    /// The channel a worker was pointed at, identified by its depth setup.
    pub fn poll_channel(&self) -> Option<ChannelId> {
        self.lock().calls.iter().find_map(|c| match c {
            PlatformCall::SetDepth(id, _) => Some(*id),
            _ => None,
        })
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn scripted(state: &mut MockState, op: &'static str) -> Result<(), PlatformError> {
    if let Some(failure) = state.failures.get_mut(op) {
        failure.seen += 1;
        if failure.seen == failure.at {
            let code = failure.code;
            state.failures.remove(op);
            return Err(PlatformError::new(op, code));
        }
    }
    Ok(())
}

impl MediaPlatform for MockPlatform {
    fn create_channel(&self, _spec: &ChannelSpec) -> Result<ChannelId, PlatformError> {
        let mut state = self.lock();
        scripted(&mut state, "create_channel")?;
        let id = ChannelId(state.next_id);
        state.next_id += 1;
        state.live.insert(id, false);
        state.calls.push(PlatformCall::Create(id));
        Ok(id)
    }

    fn configure_channel(&self, id: ChannelId, _spec: &ChannelSpec) -> Result<(), PlatformError> {
        let mut state = self.lock();
        scripted(&mut state, "configure_channel")?;
        if !state.live.contains_key(&id) {
            state.violations.push(format!("configure of unknown channel {id}"));
            return Err(PlatformError::new("configure_channel", -1));
        }
        state.calls.push(PlatformCall::Configure(id));
        Ok(())
    }

    fn enable_channel(&self, id: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        scripted(&mut state, "enable_channel")?;
        match state.live.get_mut(&id) {
            Some(enabled) => *enabled = true,
            None => {
                state.violations.push(format!("enable of unknown channel {id}"));
                return Err(PlatformError::new("enable_channel", -1));
            },
        }
        state.calls.push(PlatformCall::Enable(id));
        Ok(())
    }

    fn disable_channel(&self, id: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        scripted(&mut state, "disable_channel")?;
        match state.live.get_mut(&id) {
            Some(enabled) => *enabled = false,
            None => {
                state.violations.push(format!("disable of unknown channel {id}"));
                return Err(PlatformError::new("disable_channel", -1));
            },
        }
        state.calls.push(PlatformCall::Disable(id));
        Ok(())
    }

    fn destroy_channel(&self, id: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        scripted(&mut state, "destroy_channel")?;
        if state.live.remove(&id).is_none() {
            state.violations.push(format!("destroy of unknown or destroyed channel {id}"));
            return Err(PlatformError::new("destroy_channel", -1));
        }
        state.bindings.retain(|(up, down)| *up != id && *down != id);
        state.calls.push(PlatformCall::Destroy(id));
        Ok(())
    }

    fn set_channel_depth(&self, id: ChannelId, depth: u32) -> Result<(), PlatformError> {
        let mut state = self.lock();
        scripted(&mut state, "set_channel_depth")?;
        if !state.live.contains_key(&id) {
            state.violations.push(format!("depth setup on unknown channel {id}"));
            return Err(PlatformError::new("set_channel_depth", -1));
        }
        state.calls.push(PlatformCall::SetDepth(id, depth));
        Ok(())
    }

    fn bind(&self, upstream: ChannelId, downstream: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        scripted(&mut state, "bind")?;
        state.bindings.push((upstream, downstream));
        state.calls.push(PlatformCall::Bind(upstream, downstream));
        Ok(())
    }

    fn unbind(&self, upstream: ChannelId, downstream: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock();
        scripted(&mut state, "unbind")?;
        let before = state.bindings.len();
        state.bindings.retain(|pair| *pair != (upstream, downstream));
        if state.bindings.len() == before {
            state.violations.push(format!("unbind of unknown binding {upstream}->{downstream}"));
        }
        state.calls.push(PlatformCall::Unbind(upstream, downstream));
        Ok(())
    }

    fn poll_frame(&self, id: ChannelId, timeout: Duration) -> Result<FrameHandle, PollError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            let item = state.queues.get_mut(&id).and_then(std::collections::VecDeque::pop_front);
            if let Some(item) = item {
                return match item {
                    Ok(frame) => {
                        state.outstanding.insert((id, frame.buffer));
                        Ok(frame)
                    },
                    Err(e) => Err(PollError::Platform(e)),
                };
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PollError::Empty);
            }
            let (guard, _timed_out) = self
                .queued
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn release_frame(&self, id: ChannelId, frame: FrameHandle) -> Result<(), PlatformError> {
        let mut state = self.lock();
        scripted(&mut state, "release_frame")?;
        if !state.outstanding.remove(&(id, frame.buffer)) {
            state
                .violations
                .push(format!("release of frame {} on {id} that is not outstanding", frame.buffer));
            return Err(PlatformError::new("release_frame", -1));
        }
        state.calls.push(PlatformCall::Release(id, frame.buffer));
        Ok(())
    }
}

/// Builds a plain test frame with the given buffer/sequence number.
pub fn test_frame(seq: u64) -> FrameHandle {
    FrameHandle {
        buffer: seq,
        sequence: seq,
        pts_us: seq * 33_333,
        width: 640,
        height: 360,
        format: PixelFormat::Nv12,
    }
}

/// How a [`RecordingSink`] reacts to the next frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBehavior {
    Accept,
    Fail,
    Panic,
}

/// Sink that records delivered frames and can be scripted to misbehave.
pub struct RecordingSink {
    label: String,
    frames: Mutex<Vec<FrameHandle>>,
    fail: AtomicBool,
    panic: AtomicBool,
}

impl RecordingSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            frames: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            panic: AtomicBool::new(false),
        }
    }

    pub fn set_behavior(&self, behavior: SinkBehavior) {
        self.fail.store(behavior == SinkBehavior::Fail, Ordering::SeqCst);
        self.panic.store(behavior == SinkBehavior::Panic, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<FrameHandle> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl FrameSink for RecordingSink {
    fn label(&self) -> &str {
        &self.label
    }

    fn on_frame(&self, frame: &FrameHandle) -> Result<(), SinkError> {
        assert!(!self.panic.load(Ordering::SeqCst), "scripted sink panic");
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::from(format!("{} rejected frame", self.label)));
        }
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).push(*frame);
        Ok(())
    }
}

/// Polls `predicate` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    predicate()
}
