// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Immutable per-stage configuration snapshots.
//!
//! Each stage captures its parameters once at creation time and never
//! mutates them afterwards. The appliance builds these from its layered
//! configuration and passes them into the stage factories explicitly; there
//! is no process-global configuration.

use serde::{Deserialize, Serialize};

use crate::frame::PixelFormat;
use crate::platform::CodecSpec;

const fn default_frame_rate() -> u32 {
    30
}

const fn default_width() -> u32 {
    1920
}

const fn default_height() -> u32 {
    1080
}

const fn default_format() -> PixelFormat {
    PixelFormat::Nv12
}

const fn default_detect_frame_rate() -> u32 {
    5
}

const fn default_detect_width() -> u32 {
    640
}

const fn default_detect_height() -> u32 {
    360
}

/// Sensor/ISP capture parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureParams {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_format")]
    pub format: PixelFormat,
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            width: default_width(),
            height: default_height(),
            format: default_format(),
        }
    }
}

/// Low-rate detection output parameters.
///
/// Detection runs on a decimated, downscaled copy of the stream; five
/// frames per second is plenty for motion analysis and keeps the analyzer
/// off the hot path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectParams {
    #[serde(default = "default_detect_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "default_detect_width")]
    pub width: u32,
    #[serde(default = "default_detect_height")]
    pub height: u32,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            frame_rate: default_detect_frame_rate(),
            width: default_detect_width(),
            height: default_detect_height(),
        }
    }
}

/// Scaling/filtering stage parameters.
///
/// `source_*` describe what the capture stage delivers; `frame_rate`,
/// `width` and `height` describe the full-rate scaled output feeding the
/// encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessParams {
    #[serde(default = "default_frame_rate")]
    pub source_frame_rate: u32,
    #[serde(default = "default_width")]
    pub source_width: u32,
    #[serde(default = "default_height")]
    pub source_height: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_format")]
    pub format: PixelFormat,
    #[serde(default)]
    pub detect: DetectParams,
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self {
            source_frame_rate: default_frame_rate(),
            source_width: default_width(),
            source_height: default_height(),
            frame_rate: default_frame_rate(),
            width: default_width(),
            height: default_height(),
            format: default_format(),
            detect: DetectParams::default(),
        }
    }
}

/// Encoder stage parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeParams {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub codec: CodecSpec,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            width: default_width(),
            height: default_height(),
            codec: CodecSpec::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::VideoCodec;

    #[test]
    fn defaults_describe_a_1080p30_chain() {
        let capture = CaptureParams::default();
        assert_eq!((capture.width, capture.height, capture.frame_rate), (1920, 1080, 30));

        let process = ProcessParams::default();
        assert_eq!(process.detect.frame_rate, 5);
        assert!(process.detect.frame_rate < process.frame_rate);

        let encode = EncodeParams::default();
        assert_eq!(encode.codec.codec, VideoCodec::H264);
    }
}
