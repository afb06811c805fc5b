// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Built-in pipeline stages and the appliance orchestrator.
//!
//! The stage chain is fixed: capture feeds a scaling/filtering stage over a
//! hardware bind, the full-rate scaled output feeds the encoder over a
//! second bind, and the encoder fans encoded frames out to live/record
//! sinks. The low-rate scaled output drives motion detection.
//!
//! [`VideoPipeline`] builds the chain bottom-up, attaches sinks top-down,
//! and tears everything down in exact reverse order.

pub mod capture;
pub mod detect;
pub mod encode;
pub mod live;
pub mod pipeline;
pub mod process;
pub mod record;

pub use capture::CaptureStage;
pub use detect::{EventListener, MotionAnalyzer, MotionDetector, MotionEvent};
pub use encode::EncodeStage;
pub use live::{LiveSink, StreamPublisher};
pub use pipeline::{PipelineConfig, VideoPipeline};
pub use process::ProcessStage;
pub use record::{ClipWriter, RecordSink};
