// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Sensor-facing capture stage.
//!
//! Brings up the capture device and its raw output channel. Frames leave
//! this stage through a hardware bind into the process group, so there is
//! no acquisition thread here; the stage is pure lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nvrkit_core::error::Result;
use nvrkit_core::module::Module;
use nvrkit_core::params::CaptureParams;
use nvrkit_core::platform::{ChannelId, ChannelRole, ChannelSpec, MediaPlatform};
use nvrkit_engine::{ChannelPlan, StageController, StagePlan};

const DEV_CHANNEL: &str = "dev";
const OUT_CHANNEL: &str = "out";

/// Capture device plus raw output channel.
pub struct CaptureStage {
    controller: StageController,
    closed: AtomicBool,
}

impl CaptureStage {
    /// Brings up both channels, or releases whatever came up and returns
    /// the error.
    pub fn create(platform: Arc<dyn MediaPlatform>, params: &CaptureParams) -> Result<Arc<Self>> {
        let controller = StageController::new("capture", platform);
        if let Err(e) = controller.start_stage(&Self::plan(params)) {
            controller.stop_stage();
            return Err(e.into());
        }
        tracing::info!(
            width = params.width,
            height = params.height,
            fps = params.frame_rate,
            "capture stage up"
        );
        Ok(Arc::new(Self { controller, closed: AtomicBool::new(false) }))
    }

    fn plan(params: &CaptureParams) -> StagePlan {
        let dev = ChannelSpec {
            role: ChannelRole::CaptureDevice,
            source_fps: params.frame_rate,
            target_fps: params.frame_rate,
            width: params.width,
            height: params.height,
            format: params.format,
            codec: None,
        };
        let out = ChannelSpec { role: ChannelRole::CaptureChannel, ..dev.clone() };
        StagePlan {
            channels: vec![
                ChannelPlan { label: DEV_CHANNEL, spec: dev },
                ChannelPlan { label: OUT_CHANNEL, spec: out },
            ],
        }
    }

    /// Raw output channel, bound to the process group by the orchestrator.
    pub fn output_channel(&self) -> Option<ChannelId> {
        self.controller.channel(OUT_CHANNEL)
    }
}

impl Module for CaptureStage {
    fn label(&self) -> &str {
        "capture"
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.controller.stop_stage();
        tracing::info!("capture stage closed");
    }
}

impl Drop for CaptureStage {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvrkit_engine::test_utils::MockPlatform;

    #[test]
    fn create_brings_up_device_then_output() {
        let platform = Arc::new(MockPlatform::new());
        let stage = CaptureStage::create(Arc::clone(&platform) as Arc<dyn MediaPlatform>, &CaptureParams::default())
            .expect("create");

        assert_eq!(platform.live_channels(), 2);
        assert!(stage.output_channel().is_some());

        stage.close();
        stage.close();
        assert_eq!(platform.live_channels(), 0);
        assert!(platform.violations().is_empty());
    }

    #[test]
    fn create_failure_releases_the_device() {
        let platform = Arc::new(MockPlatform::new());
        platform.fail_nth("create_channel", 2, 0x11);

        let result =
            CaptureStage::create(Arc::clone(&platform) as Arc<dyn MediaPlatform>, &CaptureParams::default());
        assert!(result.is_err());
        assert_eq!(platform.live_channels(), 0);
        assert!(platform.violations().is_empty());
    }
}
