// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use nvrkit_core::frame::PixelFormat;
use nvrkit_core::platform::{ChannelRole, ChannelSpec};

use crate::stage_controller::{ChannelPlan, StagePlan};

mod pipeline_stage;
mod stage_controller;

pub(crate) fn test_spec(role: ChannelRole) -> ChannelSpec {
    ChannelSpec {
        role,
        source_fps: 30,
        target_fps: 30,
        width: 1920,
        height: 1080,
        format: PixelFormat::Nv12,
        codec: None,
    }
}

pub(crate) fn plan_of(labels: &[&'static str]) -> StagePlan {
    StagePlan {
        channels: labels
            .iter()
            .map(|&label| ChannelPlan { label, spec: test_spec(ChannelRole::ProcessOutput) })
            .collect(),
    }
}
