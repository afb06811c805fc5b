// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Software stand-in for the vendor media platform.
//!
//! Fabricates frames at each pollable channel's target rate so the
//! appliance and the integration tests run without camera hardware.
//! Geometry and format come from the channel spec; a "buffer" is just a
//! sequence number. Pacing happens inside `poll_frame`: the call sleeps
//! until the next frame is due or the bounded wait elapses, whichever
//! comes first.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use nvrkit_core::frame::FrameHandle;
use nvrkit_core::platform::{ChannelId, ChannelSpec, MediaPlatform, PlatformError, PollError};

/// Vendor-style status codes reported by the simulator.
pub mod code {
    /// The channel spec failed validation.
    pub const BAD_SPEC: i32 = 0x2001;
    /// The channel id is unknown or already destroyed.
    pub const NOT_FOUND: i32 = 0x2002;
    /// The operation needs an enabled channel.
    pub const DISABLED: i32 = 0x2003;
    /// Release of a frame that is not outstanding.
    pub const BAD_RELEASE: i32 = 0x2004;
    /// Unbind of a connection that does not exist.
    pub const BAD_BIND: i32 = 0x2005;
}

struct SimChannel {
    spec: ChannelSpec,
    enabled: bool,
    next_seq: u64,
    next_due: Option<Instant>,
    outstanding: u32,
}

struct SimState {
    next_id: u32,
    channels: HashMap<ChannelId, SimChannel>,
    bindings: Vec<(ChannelId, ChannelId)>,
    epoch: Instant,
}

/// In-process [`MediaPlatform`] that paces synthetic frames.
pub struct SimulatedPlatform {
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                next_id: 0,
                channels: HashMap::new(),
                bindings: Vec::new(),
                epoch: Instant::now(),
            }),
        }
    }

    /// Channels currently alive. Mostly useful in assertions.
    pub fn channel_count(&self) -> usize {
        self.lock_state().channels.len()
    }

    /// Hardware bindings currently in place.
    pub fn binding_count(&self) -> usize {
        self.lock_state().bindings.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate(spec: &ChannelSpec) -> Result<(), PlatformError> {
        if spec.width == 0 || spec.height == 0 {
            return Err(PlatformError::new("create_channel", code::BAD_SPEC));
        }
        if spec.target_fps == 0 || spec.target_fps > spec.source_fps {
            return Err(PlatformError::new("create_channel", code::BAD_SPEC));
        }
        Ok(())
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaPlatform for SimulatedPlatform {
    fn create_channel(&self, spec: &ChannelSpec) -> Result<ChannelId, PlatformError> {
        Self::validate(spec)?;
        let mut state = self.lock_state();
        let id = ChannelId(state.next_id);
        state.next_id += 1;
        state.channels.insert(
            id,
            SimChannel {
                spec: spec.clone(),
                enabled: false,
                next_seq: 0,
                next_due: None,
                outstanding: 0,
            },
        );
        Ok(id)
    }

    fn configure_channel(&self, id: ChannelId, spec: &ChannelSpec) -> Result<(), PlatformError> {
        Self::validate(spec)
            .map_err(|e| PlatformError::new("configure_channel", e.code))?;
        let mut state = self.lock_state();
        let ch = state
            .channels
            .get_mut(&id)
            .ok_or(PlatformError::new("configure_channel", code::NOT_FOUND))?;
        ch.spec = spec.clone();
        Ok(())
    }

    fn enable_channel(&self, id: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock_state();
        let ch = state
            .channels
            .get_mut(&id)
            .ok_or(PlatformError::new("enable_channel", code::NOT_FOUND))?;
        ch.enabled = true;
        Ok(())
    }

    fn disable_channel(&self, id: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock_state();
        let ch = state
            .channels
            .get_mut(&id)
            .ok_or(PlatformError::new("disable_channel", code::NOT_FOUND))?;
        ch.enabled = false;
        ch.next_due = None;
        Ok(())
    }

    fn destroy_channel(&self, id: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock_state();
        state
            .channels
            .remove(&id)
            .ok_or(PlatformError::new("destroy_channel", code::NOT_FOUND))?;
        state.bindings.retain(|(up, down)| *up != id && *down != id);
        Ok(())
    }

    fn set_channel_depth(&self, id: ChannelId, _depth: u32) -> Result<(), PlatformError> {
        let state = self.lock_state();
        if state.channels.contains_key(&id) {
            Ok(())
        } else {
            Err(PlatformError::new("set_channel_depth", code::NOT_FOUND))
        }
    }

    fn bind(&self, upstream: ChannelId, downstream: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock_state();
        if !state.channels.contains_key(&upstream) || !state.channels.contains_key(&downstream) {
            return Err(PlatformError::new("bind", code::NOT_FOUND));
        }
        state.bindings.push((upstream, downstream));
        Ok(())
    }

    fn unbind(&self, upstream: ChannelId, downstream: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.lock_state();
        let before = state.bindings.len();
        state.bindings.retain(|pair| *pair != (upstream, downstream));
        if state.bindings.len() == before {
            return Err(PlatformError::new("unbind", code::BAD_BIND));
        }
        Ok(())
    }

    fn poll_frame(&self, id: ChannelId, timeout: Duration) -> Result<FrameHandle, PollError> {
        let deadline = Instant::now() + timeout;
        loop {
            let wait = {
                let mut state = self.lock_state();
                let epoch = state.epoch;
                let ch = state
                    .channels
                    .get_mut(&id)
                    .ok_or(PollError::Platform(PlatformError::new("poll_frame", code::NOT_FOUND)))?;
                if !ch.enabled {
                    return Err(PollError::Platform(PlatformError::new(
                        "poll_frame",
                        code::DISABLED,
                    )));
                }

                let interval = Duration::from_micros(1_000_000 / u64::from(ch.spec.target_fps));
                let now = Instant::now();
                let due = *ch.next_due.get_or_insert(now);
                if now >= due {
                    let frame = FrameHandle {
                        buffer: ch.next_seq,
                        sequence: ch.next_seq,
                        pts_us: u64::try_from((now - epoch).as_micros()).unwrap_or(u64::MAX),
                        width: ch.spec.width,
                        height: ch.spec.height,
                        format: ch.spec.format,
                    };
                    ch.next_seq += 1;
                    // No catch-up bursts after a stall; pace from now.
                    ch.next_due = Some(now + interval);
                    ch.outstanding += 1;
                    return Ok(frame);
                }
                due - now
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(PollError::Empty);
            }
            std::thread::sleep(wait.min(deadline - now));
        }
    }

    fn release_frame(&self, id: ChannelId, _frame: FrameHandle) -> Result<(), PlatformError> {
        let mut state = self.lock_state();
        let ch = state
            .channels
            .get_mut(&id)
            .ok_or(PlatformError::new("release_frame", code::NOT_FOUND))?;
        if ch.outstanding == 0 {
            return Err(PlatformError::new("release_frame", code::BAD_RELEASE));
        }
        ch.outstanding -= 1;
        Ok(())
    }
}
