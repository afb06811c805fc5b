// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Recording sink.
//!
//! Container writing stays behind [`ClipWriter`]; this module owns the
//! open/finalize lifecycle and adapts the writer to the frame-sink seam so
//! it plugs into the encoder's fan-out chain next to the live sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nvrkit_core::error::Result;
use nvrkit_core::frame::FrameHandle;
use nvrkit_core::module::Module;
use nvrkit_core::params::EncodeParams;
use nvrkit_core::sink::{FrameSink, SinkError};

/// Container/file writer for one recording. Implemented outside this core.
pub trait ClipWriter: Send + Sync {
    /// Opens a recording under `target` with the stream parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the recording cannot be opened.
    fn open(&self, params: &EncodeParams, target: &str) -> std::result::Result<(), SinkError>;

    /// Appends one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the frame cannot be written; the
    /// fan-out chain logs it and keeps going.
    fn write(&self, frame: &FrameHandle) -> std::result::Result<(), SinkError>;

    /// Finalizes the recording. Best-effort.
    fn finalize(&self);
}

/// Writes the encoded stream into a recording target.
pub struct RecordSink {
    writer: Arc<dyn ClipWriter>,
    target: String,
    closed: AtomicBool,
}

impl RecordSink {
    /// Opens the recording and returns the sink, or fails without leaving a
    /// half-open recording behind.
    pub fn create(
        writer: Arc<dyn ClipWriter>,
        params: &EncodeParams,
        target: impl Into<String>,
    ) -> Result<Arc<Self>> {
        let target = target.into();
        writer.open(params, &target)?;
        tracing::info!(target = %target, "recording started");
        Ok(Arc::new(Self { writer, target, closed: AtomicBool::new(false) }))
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl FrameSink for RecordSink {
    fn label(&self) -> &str {
        "record"
    }

    fn on_frame(&self, frame: &FrameHandle) -> std::result::Result<(), SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.writer.write(frame)
    }
}

impl Module for RecordSink {
    fn label(&self) -> &str {
        "record"
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.writer.finalize();
        tracing::info!(target = %self.target, "recording finalized");
    }
}

impl Drop for RecordSink {
    fn drop(&mut self) {
        self.close();
    }
}
