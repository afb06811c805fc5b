// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The frame-consumer capability.
//!
//! Anything that can receive a frame implements [`FrameSink`]: detection,
//! live streaming, recording, or a fan-out chain of all of them. Producers
//! hold sinks as `Arc<dyn FrameSink>` behind a lock and swap them atomically.

use thiserror::Error;

use crate::frame::FrameHandle;

/// Failure reported by a sink callback.
///
/// Producers log these and move on; a failing consumer never affects the
/// producer's health or the delivery to other consumers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

impl From<String> for SinkError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SinkError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A consumer of frames produced by a stage.
///
/// `on_frame` borrows the handle for the duration of the call only. The
/// producer releases the underlying buffer as soon as the call returns, so
/// implementations must not stash the handle for later use.
pub trait FrameSink: Send + Sync {
    /// Stable name used in logs and metrics.
    fn label(&self) -> &str;

    /// Receives one frame. Called from the producer's acquisition thread.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the consumer cannot handle the frame;
    /// the producer logs it and continues.
    fn on_frame(&self, frame: &FrameHandle) -> Result<(), SinkError>;
}
