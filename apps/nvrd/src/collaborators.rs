// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Collaborator implementations for hardware-free runs.
//!
//! The appliance core keeps transports and container writers behind
//! traits. On a real unit those come from the vendor stack; when running
//! on the simulated platform we plug in these stand-ins: a publisher that
//! logs instead of speaking a wire protocol, and a writer that records a
//! plain-text stream index instead of muxing a container.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use nvrkit_core::frame::FrameHandle;
use nvrkit_core::params::EncodeParams;
use nvrkit_core::sink::SinkError;
use nvrkit_stages::{ClipWriter, MotionAnalyzer, MotionEvent, StreamPublisher};

/// Analyzer stand-in that sees no motion. The slot where the vendor's
/// analytics unit plugs in on real hardware.
#[derive(Default)]
pub struct NullAnalyzer;

impl MotionAnalyzer for NullAnalyzer {
    fn analyze(&self, _frame: &FrameHandle) -> Result<Option<MotionEvent>, SinkError> {
        Ok(None)
    }
}

/// Publisher that logs each frame instead of pushing it to a server.
#[derive(Default)]
pub struct DebugPublisher;

impl StreamPublisher for DebugPublisher {
    fn start(&self, params: &EncodeParams, url: &str) -> Result<(), SinkError> {
        tracing::info!(url, codec = ?params.codec.codec, "debug publisher session open");
        Ok(())
    }

    fn publish(&self, frame: &FrameHandle) -> Result<(), SinkError> {
        tracing::debug!(sequence = frame.sequence, pts_us = frame.pts_us, "frame published");
        Ok(())
    }

    fn stop(&self) {
        tracing::info!("debug publisher session closed");
    }
}

/// Writes one line per encoded frame into `<dir>/stream.idx`.
#[derive(Default)]
pub struct IndexWriter {
    out: Mutex<Option<BufWriter<File>>>,
}

impl ClipWriter for IndexWriter {
    fn open(&self, params: &EncodeParams, target: &str) -> Result<(), SinkError> {
        let dir = PathBuf::from(target);
        std::fs::create_dir_all(&dir).map_err(|e| SinkError(format!("create {target}: {e}")))?;
        let path = dir.join("stream.idx");
        let file = File::create(&path).map_err(|e| SinkError(format!("open {}: {e}", path.display())))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "# {}x{} @ {} fps", params.width, params.height, params.frame_rate)
            .map_err(|e| SinkError(e.to_string()))?;
        *self.lock_out() = Some(writer);
        Ok(())
    }

    fn write(&self, frame: &FrameHandle) -> Result<(), SinkError> {
        let mut guard = self.lock_out();
        let Some(writer) = guard.as_mut() else {
            return Err(SinkError::from("index writer is not open"));
        };
        writeln!(writer, "{} {} {}x{}", frame.sequence, frame.pts_us, frame.width, frame.height)
            .map_err(|e| SinkError(e.to_string()))
    }

    fn finalize(&self) {
        if let Some(mut writer) = self.lock_out().take() {
            if let Err(e) = writer.flush() {
                tracing::error!(error = %e, "flushing stream index failed");
            }
        }
    }
}

impl IndexWriter {
    fn lock_out(&self) -> std::sync::MutexGuard<'_, Option<BufWriter<File>>> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_writer_records_one_line_per_frame() {
        let dir = std::env::temp_dir().join(format!("nvrd-idx-{}", std::process::id()));
        let writer = IndexWriter::default();
        writer.open(&EncodeParams::default(), &dir.to_string_lossy()).expect("open");

        let frame = FrameHandle {
            buffer: 3,
            sequence: 3,
            pts_us: 99_999,
            width: 1920,
            height: 1080,
            format: nvrkit_core::frame::PixelFormat::Nv12,
        };
        writer.write(&frame).expect("write");
        writer.finalize();

        let contents = std::fs::read_to_string(dir.join("stream.idx")).expect("read back");
        assert!(contents.contains("3 99999 1920x1080"));
        std::fs::remove_dir_all(dir).expect("cleanup");
    }
}
