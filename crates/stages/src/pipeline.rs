// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The appliance orchestrator.
//!
//! Builds the fixed chain bottom-up (capture, process, encode) with a
//! hardware bind between each pair of adjacent stages, and tears it down in
//! exact reverse order: unbind encode, close encode, unbind process, close
//! process, close capture. Binds are issued from the control thread only,
//! while both sides are idle with respect to the operation.
//!
//! Construction is all-or-nothing: a failure at any step releases every
//! stage and bind brought up so far, in reverse, before the error returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use nvrkit_core::error::{NvrKitError, Result};
use nvrkit_core::module::Module;
use nvrkit_core::params::{CaptureParams, DetectParams, EncodeParams, ProcessParams};
use nvrkit_core::platform::{ChannelId, MediaPlatform};
use nvrkit_core::sink::FrameSink;
use nvrkit_core::state::StageState;

use crate::capture::CaptureStage;
use crate::encode::EncodeStage;
use crate::process::ProcessStage;

/// Everything the orchestrator needs to build the fixed stage chain.
///
/// The process stage has no section of its own: its source side mirrors the
/// capture parameters and its output side mirrors the encode parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub capture: CaptureParams,
    #[serde(default)]
    pub encode: EncodeParams,
    #[serde(default)]
    pub detect: DetectParams,
}

impl PipelineConfig {
    fn process_params(&self) -> ProcessParams {
        ProcessParams {
            source_frame_rate: self.capture.frame_rate,
            source_width: self.capture.width,
            source_height: self.capture.height,
            frame_rate: self.encode.frame_rate,
            width: self.encode.width,
            height: self.encode.height,
            format: self.capture.format,
            detect: self.detect.clone(),
        }
    }
}

/// The capture -> process -> encode chain with its two hardware binds.
pub struct VideoPipeline {
    platform: Arc<dyn MediaPlatform>,
    capture: Arc<CaptureStage>,
    process: Arc<ProcessStage>,
    encode: Arc<EncodeStage>,
    closed: AtomicBool,
}

impl VideoPipeline {
    /// Builds the chain bottom-up and wires the binds.
    ///
    /// # Errors
    ///
    /// Any stage or bind failure, after everything brought up so far has
    /// been released in reverse order.
    pub fn create(platform: Arc<dyn MediaPlatform>, config: &PipelineConfig) -> Result<Arc<Self>> {
        tracing::info!("initializing video capture");
        let capture = CaptureStage::create(Arc::clone(&platform), &config.capture)?;

        tracing::info!("initializing video process");
        let process = match ProcessStage::create(Arc::clone(&platform), &config.process_params()) {
            Ok(process) => process,
            Err(e) => {
                capture.close();
                return Err(e);
            },
        };

        tracing::info!("binding video capture and video process");
        let capture_bind = match Self::bind_pair(
            &platform,
            capture.output_channel(),
            process.group_channel(),
            "capture output",
            "process group",
        ) {
            Ok(bind) => bind,
            Err(e) => {
                process.close();
                capture.close();
                return Err(e);
            },
        };

        tracing::info!("initializing video encode");
        let encode = match EncodeStage::create(Arc::clone(&platform), &config.encode) {
            Ok(encode) => encode,
            Err(e) => {
                unbind_logged(platform.as_ref(), capture_bind);
                process.close();
                capture.close();
                return Err(e);
            },
        };

        tracing::info!("binding video process and video encode");
        if let Err(e) = Self::bind_pair(
            &platform,
            process.scaled_channel(),
            encode.input_channel(),
            "process scaled output",
            "encode input",
        ) {
            encode.close();
            unbind_logged(platform.as_ref(), capture_bind);
            process.close();
            capture.close();
            return Err(e);
        }

        tracing::info!("video pipeline up");
        Ok(Arc::new(Self { platform, capture, process, encode, closed: AtomicBool::new(false) }))
    }

    fn bind_pair(
        platform: &Arc<dyn MediaPlatform>,
        upstream: Option<ChannelId>,
        downstream: Option<ChannelId>,
        upstream_name: &str,
        downstream_name: &str,
    ) -> Result<(ChannelId, ChannelId)> {
        let (Some(upstream), Some(downstream)) = (upstream, downstream) else {
            return Err(NvrKitError::InvalidArguments(format!(
                "cannot bind: {upstream_name} or {downstream_name} is gone"
            )));
        };
        platform.bind(upstream, downstream)?;
        Ok((upstream, downstream))
    }

    /// Replaces (or detaches) the motion-detection sink on the process
    /// stage.
    pub fn set_detection_sink(&self, sink: Option<Arc<dyn FrameSink>>) {
        self.process.set_detection_sink(sink);
    }

    /// Attaches a consumer to the encoded stream.
    pub fn add_sink(&self, sink: Arc<dyn FrameSink>) {
        self.encode.add_sink(sink);
    }

    /// Detaches an encoded-stream consumer by identity.
    pub fn remove_sink(&self, sink: &Arc<dyn FrameSink>) {
        self.encode.remove_sink(sink);
    }

    /// Detaches every encoded-stream consumer.
    pub fn clear_sinks(&self) {
        self.encode.clear_sinks();
    }

    /// True when an acquisition worker died on an unexpected failure. The
    /// caller decides whether that is fatal; the pipeline stays closable
    /// either way.
    pub fn stalled(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.process.state() != StageState::Running
            || self.encode.state() != StageState::Running
    }

    /// Tears down in exact reverse of construction. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("unbinding video process and video encode");
        if let (Some(up), Some(down)) = (self.process.scaled_channel(), self.encode.input_channel())
        {
            unbind_logged(self.platform.as_ref(), (up, down));
        }

        tracing::info!("closing video encode");
        self.encode.close();

        tracing::info!("unbinding video capture and video process");
        if let (Some(up), Some(down)) = (self.capture.output_channel(), self.process.group_channel())
        {
            unbind_logged(self.platform.as_ref(), (up, down));
        }

        tracing::info!("closing video process");
        self.process.close();

        tracing::info!("closing video capture");
        self.capture.close();

        tracing::info!("video pipeline shut down");
    }
}

impl Module for VideoPipeline {
    fn label(&self) -> &str {
        "pipeline"
    }

    fn close(&self) {
        self.shutdown();
    }
}

impl Drop for VideoPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn unbind_logged(platform: &dyn MediaPlatform, (upstream, downstream): (ChannelId, ChannelId)) {
    if let Err(e) = platform.unbind(upstream, downstream) {
        tracing::error!(%upstream, %downstream, error = %e, "unbind failed during teardown");
    }
}
