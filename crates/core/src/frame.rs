// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Frame descriptors exchanged with the media platform.
//!
//! A [`FrameHandle`] identifies one buffer owned by the hardware platform.
//! The orchestration core never owns or copies the underlying memory; it
//! only moves the descriptor between stages and hands it back when done.

use serde::{Deserialize, Serialize};

/// Pixel layout of a hardware frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelFormat {
    /// 4:2:0 semi-planar, UV interleaved.
    Nv12,
    /// 4:2:0 semi-planar, VU interleaved.
    Nv21,
    /// 4:2:0 fully planar.
    Yuv420,
}

/// Descriptor of one frame buffer owned by the media platform.
///
/// Handles are cheap to copy and carry no ownership: a handle obtained from
/// [`poll_frame`](crate::platform::MediaPlatform::poll_frame) must be handed
/// back with [`release_frame`](crate::platform::MediaPlatform::release_frame)
/// exactly once, on every code path, in the same loop iteration it was
/// acquired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle {
    /// Platform-assigned buffer identifier.
    pub buffer: u64,
    /// Monotonic per-channel sequence number.
    pub sequence: u64,
    /// Presentation timestamp in microseconds.
    pub pts_us: u64,
    /// Buffer width in pixels.
    pub width: u32,
    /// Buffer height in pixels.
    pub height: u32,
    /// Pixel layout of the buffer.
    pub format: PixelFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_handles_are_plain_copies() {
        let frame = FrameHandle {
            buffer: 7,
            sequence: 1,
            pts_us: 33_333,
            width: 1920,
            height: 1080,
            format: PixelFormat::Nv12,
        };
        let copy = frame;
        assert_eq!(copy, frame);
    }
}
