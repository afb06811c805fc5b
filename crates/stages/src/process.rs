// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Scaling/filtering stage.
//!
//! One hardware group with two outputs: a full-rate scaled channel that
//! feeds the encoder over a bind, and a low-rate channel the acquisition
//! worker polls for the detection sink. Swapping the detection sink while
//! the worker runs is part of normal operation.

use std::sync::Arc;

use nvrkit_core::error::Result;
use nvrkit_core::module::Module;
use nvrkit_core::params::ProcessParams;
use nvrkit_core::platform::{ChannelId, ChannelRole, ChannelSpec, MediaPlatform};
use nvrkit_core::sink::FrameSink;
use nvrkit_core::state::StageState;
use nvrkit_engine::{ChannelPlan, PipelineStage, StagePlan};

const GROUP_CHANNEL: &str = "group";
const SCALED_CHANNEL: &str = "scaled";
const DETECT_CHANNEL: &str = "detect";

/// Process group with full-rate and detection outputs.
pub struct ProcessStage {
    stage: PipelineStage,
}

impl ProcessStage {
    /// Brings up the group and both outputs and starts the detection
    /// worker, or rolls everything back and returns the error.
    pub fn create(platform: Arc<dyn MediaPlatform>, params: &ProcessParams) -> Result<Arc<Self>> {
        let stage = PipelineStage::new("process", platform);
        stage.initialize(&Self::plan(params), DETECT_CHANNEL)?;
        tracing::info!(
            scaled_fps = params.frame_rate,
            detect_fps = params.detect.frame_rate,
            "process stage up"
        );
        Ok(Arc::new(Self { stage }))
    }

    fn plan(params: &ProcessParams) -> StagePlan {
        let group = ChannelSpec {
            role: ChannelRole::ProcessGroup,
            source_fps: params.source_frame_rate,
            target_fps: params.source_frame_rate,
            width: params.source_width,
            height: params.source_height,
            format: params.format,
            codec: None,
        };
        let scaled = ChannelSpec {
            role: ChannelRole::ProcessOutput,
            target_fps: params.frame_rate,
            width: params.width,
            height: params.height,
            ..group.clone()
        };
        let detect = ChannelSpec {
            role: ChannelRole::ProcessOutput,
            target_fps: params.detect.frame_rate,
            width: params.detect.width,
            height: params.detect.height,
            ..group.clone()
        };
        StagePlan {
            channels: vec![
                ChannelPlan { label: GROUP_CHANNEL, spec: group },
                ChannelPlan { label: SCALED_CHANNEL, spec: scaled },
                ChannelPlan { label: DETECT_CHANNEL, spec: detect },
            ],
        }
    }

    /// Group input channel, bind target for the capture output.
    pub fn group_channel(&self) -> Option<ChannelId> {
        self.stage.controller().channel(GROUP_CHANNEL)
    }

    /// Full-rate scaled output, bound to the encoder input.
    pub fn scaled_channel(&self) -> Option<ChannelId> {
        self.stage.controller().channel(SCALED_CHANNEL)
    }

    /// Replaces (or, with `None`, detaches) the detection sink fed from the
    /// low-rate channel.
    pub fn set_detection_sink(&self, sink: Option<Arc<dyn FrameSink>>) {
        self.stage.set_sink(sink);
    }

    pub fn state(&self) -> StageState {
        self.stage.state()
    }
}

impl Module for ProcessStage {
    fn label(&self) -> &str {
        "process"
    }

    fn close(&self) {
        self.stage.close();
    }
}

impl Drop for ProcessStage {
    fn drop(&mut self) {
        self.close();
    }
}
