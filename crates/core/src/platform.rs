// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The seam to the external media-processing platform.
//!
//! Everything the hardware does - sensor acquisition, ISP, scaling,
//! filtering, encoding - lives behind [`MediaPlatform`]. The orchestration
//! core creates, configures, binds, polls and releases; it never interprets
//! frame contents.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::{FrameHandle, PixelFormat};

/// Opaque identifier of one hardware channel, assigned by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// What a channel is for. The platform validates role-specific attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelRole {
    /// Sensor-facing capture device.
    CaptureDevice,
    /// Raw capture output channel.
    CaptureChannel,
    /// Scaling/filtering group. Owns its output channels.
    ProcessGroup,
    /// Scaled output channel of a process group.
    ProcessOutput,
    /// Hardware encoder channel.
    Encode,
}

/// Video codec selection for encoder channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoCodec {
    H264,
    H265,
}

/// Rate-control mode for encoder channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateControl {
    Cbr,
    Vbr,
}

/// Encoder profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecProfile {
    Baseline,
    Main,
    High,
}

/// Encoder attributes attached to [`ChannelRole::Encode`] channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSpec {
    pub codec: VideoCodec,
    pub rate_control: RateControl,
    pub profile: CodecProfile,
    pub bitrate_kbps: u32,
    pub gop: u32,
}

impl Default for CodecSpec {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            rate_control: RateControl::Cbr,
            profile: CodecProfile::Main,
            bitrate_kbps: 4096,
            gop: 60,
        }
    }
}

/// Immutable description of one hardware channel, captured when the owning
/// stage is created and never mutated after the stage starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub role: ChannelRole,
    /// Frame rate of the data entering the channel.
    pub source_fps: u32,
    /// Frame rate the channel emits at. At most `source_fps`.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Present on encoder channels only.
    pub codec: Option<CodecSpec>,
}

/// A platform call that failed, with the vendor status code preserved for
/// diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{op} failed, vendor code {code:#x}")]
pub struct PlatformError {
    /// Name of the platform entry point that failed.
    pub op: &'static str,
    /// Raw status code returned by the vendor SDK.
    pub code: i32,
}

impl PlatformError {
    pub const fn new(op: &'static str, code: i32) -> Self {
        Self { op, code }
    }
}

/// Outcome of a bounded-wait poll that did not produce a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PollError {
    /// No frame is queued yet. Backpressure, not a failure; callers retry.
    #[error("frame queue empty")]
    Empty,
    /// The platform reported a real failure.
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Contract consumed from the external media-processing platform.
///
/// Implementations must be callable from both the control thread and the
/// per-stage acquisition threads, and are shared as `Arc<dyn MediaPlatform>`.
///
/// Channel lifecycle is create -> configure -> enable, torn down as
/// disable -> destroy. [`bind`](MediaPlatform::bind) and
/// [`unbind`](MediaPlatform::unbind) connect two channels in hardware and
/// must only be called while neither side is mid-transition.
pub trait MediaPlatform: Send + Sync {
    /// Allocates a channel for `spec.role`. The channel starts disabled.
    fn create_channel(&self, spec: &ChannelSpec) -> Result<ChannelId, PlatformError>;

    /// Applies rate, geometry and codec attributes to a created channel.
    fn configure_channel(&self, id: ChannelId, spec: &ChannelSpec) -> Result<(), PlatformError>;

    /// Starts data flow through a configured channel.
    fn enable_channel(&self, id: ChannelId) -> Result<(), PlatformError>;

    /// Stops data flow. The channel can be destroyed afterwards.
    fn disable_channel(&self, id: ChannelId) -> Result<(), PlatformError>;

    /// Releases the channel and every platform resource behind it.
    fn destroy_channel(&self, id: ChannelId) -> Result<(), PlatformError>;

    /// Sets how many frames the platform may queue on a pollable channel.
    fn set_channel_depth(&self, id: ChannelId, depth: u32) -> Result<(), PlatformError>;

    /// Connects the output of `upstream` to the input of `downstream`.
    fn bind(&self, upstream: ChannelId, downstream: ChannelId) -> Result<(), PlatformError>;

    /// Severs a connection made with [`bind`](MediaPlatform::bind).
    fn unbind(&self, upstream: ChannelId, downstream: ChannelId) -> Result<(), PlatformError>;

    /// Waits up to `timeout` for the next frame queued on `id`.
    ///
    /// [`PollError::Empty`] means the bounded wait elapsed with nothing
    /// queued; it is the normal backpressure signal, not a failure.
    fn poll_frame(&self, id: ChannelId, timeout: Duration) -> Result<FrameHandle, PollError>;

    /// Returns a polled frame to the platform. Exactly once per poll.
    fn release_frame(&self, id: ChannelId, frame: FrameHandle) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_error_preserves_vendor_code() {
        let err = PlatformError::new("create_channel", 0x2001);
        assert_eq!(err.code, 0x2001);
        assert_eq!(err.to_string(), "create_channel failed, vendor code 0x2001");
    }

    #[test]
    fn empty_poll_is_distinguishable() {
        let empty = PollError::Empty;
        let real = PollError::Platform(PlatformError::new("poll_frame", 3));
        assert_ne!(empty, real);
        assert_eq!(empty.to_string(), "frame queue empty");
    }
}
