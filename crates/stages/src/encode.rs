// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Hardware encoder stage with fan-out.
//!
//! One encoder channel, fed over a bind from the process stage. The
//! acquisition worker polls the encoded stream and dispatches each frame
//! through an owned [`SinkChain`], so any number of live/record consumers
//! can attach and detach while encoding runs.

use std::sync::Arc;

use nvrkit_core::error::Result;
use nvrkit_core::module::Module;
use nvrkit_core::params::EncodeParams;
use nvrkit_core::platform::{ChannelId, ChannelRole, ChannelSpec, MediaPlatform};
use nvrkit_core::sink::FrameSink;
use nvrkit_core::state::StageState;
use nvrkit_engine::{ChannelPlan, PipelineStage, SinkChain, StagePlan};

const STREAM_CHANNEL: &str = "stream";

/// Encoder channel plus the fan-out chain for its consumers.
pub struct EncodeStage {
    stage: PipelineStage,
    chain: Arc<SinkChain>,
}

impl EncodeStage {
    /// Brings up the encoder channel and starts the stream worker with the
    /// fan-out chain attached, or rolls back and returns the error.
    pub fn create(platform: Arc<dyn MediaPlatform>, params: &EncodeParams) -> Result<Arc<Self>> {
        let stage = PipelineStage::new("encode", platform);
        let chain = Arc::new(SinkChain::new("encode"));
        stage.initialize(&Self::plan(params), STREAM_CHANNEL)?;
        stage.set_sink(Some(Arc::clone(&chain) as Arc<dyn FrameSink>));
        tracing::info!(
            codec = ?params.codec.codec,
            bitrate_kbps = params.codec.bitrate_kbps,
            fps = params.frame_rate,
            "encode stage up"
        );
        Ok(Arc::new(Self { stage, chain }))
    }

    fn plan(params: &EncodeParams) -> StagePlan {
        StagePlan {
            channels: vec![ChannelPlan {
                label: STREAM_CHANNEL,
                spec: ChannelSpec {
                    role: ChannelRole::Encode,
                    source_fps: params.frame_rate,
                    target_fps: params.frame_rate,
                    width: params.width,
                    height: params.height,
                    format: nvrkit_core::frame::PixelFormat::Nv12,
                    codec: Some(params.codec),
                },
            }],
        }
    }

    /// Encoder input channel, bind target for the scaled process output.
    pub fn input_channel(&self) -> Option<ChannelId> {
        self.stage.controller().channel(STREAM_CHANNEL)
    }

    /// Attaches a consumer; it observes every frame encoded after this
    /// call returns.
    pub fn add_sink(&self, sink: Arc<dyn FrameSink>) {
        self.chain.add_sink(sink);
    }

    /// Detaches a consumer by identity.
    pub fn remove_sink(&self, sink: &Arc<dyn FrameSink>) {
        self.chain.remove_sink(sink);
    }

    /// Detaches every consumer.
    pub fn clear_sinks(&self) {
        self.chain.clear_sinks();
    }

    pub fn sink_count(&self) -> usize {
        self.chain.len()
    }

    pub fn state(&self) -> StageState {
        self.stage.state()
    }
}

impl Module for EncodeStage {
    fn label(&self) -> &str {
        "encode"
    }

    fn close(&self) {
        self.stage.close();
        self.chain.clear_sinks();
    }
}

impl Drop for EncodeStage {
    fn drop(&mut self) {
        self.close();
    }
}
