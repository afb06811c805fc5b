// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Motion detection sink.
//!
//! The analysis itself is a collaborator behind [`MotionAnalyzer`]; this
//! module adapts it to the frame-sink seam, owns the attach/detach
//! lifecycle, and forwards events to an optional listener. Frames arriving
//! after `close` are dropped quietly, which makes detaching from a running
//! stage race-free.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nvrkit_core::frame::FrameHandle;
use nvrkit_core::module::Module;
use nvrkit_core::sink::{FrameSink, SinkError};

/// Result of analysing one low-rate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionEvent {
    pub pts_us: u64,
    pub sequence: u64,
    /// Activity measure in 0..=100 reported by the analyzer.
    pub level: u8,
}

/// Analyses low-rate frames for motion. Implemented outside this core,
/// typically on top of the platform's analytics unit.
pub trait MotionAnalyzer: Send + Sync {
    /// Returns an event when the frame shows activity.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the frame could not be analysed; the
    /// producer logs it and continues.
    fn analyze(&self, frame: &FrameHandle) -> Result<Option<MotionEvent>, SinkError>;
}

/// Callback invoked for every reported motion event.
pub type EventListener = Box<dyn Fn(MotionEvent) + Send + Sync>;

/// Adapts a [`MotionAnalyzer`] to the detection slot of the process stage.
pub struct MotionDetector {
    analyzer: Arc<dyn MotionAnalyzer>,
    listener: Option<EventListener>,
    closed: AtomicBool,
}

impl MotionDetector {
    pub fn create(analyzer: Arc<dyn MotionAnalyzer>, listener: Option<EventListener>) -> Arc<Self> {
        Arc::new(Self { analyzer, listener, closed: AtomicBool::new(false) })
    }
}

impl FrameSink for MotionDetector {
    fn label(&self) -> &str {
        "motion-detector"
    }

    fn on_frame(&self, frame: &FrameHandle) -> Result<(), SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(event) = self.analyzer.analyze(frame)? {
            tracing::info!(
                level = event.level,
                pts_us = event.pts_us,
                sequence = event.sequence,
                "motion detected"
            );
            if let Some(listener) = &self.listener {
                listener(event);
            }
        }
        Ok(())
    }
}

impl Module for MotionDetector {
    fn label(&self) -> &str {
        "motion-detector"
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("motion detector closed");
    }
}

impl Drop for MotionDetector {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Flags every Nth frame as motion.
    struct EveryNth(u64);

    impl MotionAnalyzer for EveryNth {
        fn analyze(&self, frame: &FrameHandle) -> Result<Option<MotionEvent>, SinkError> {
            if frame.sequence % self.0 == 0 {
                Ok(Some(MotionEvent { pts_us: frame.pts_us, sequence: frame.sequence, level: 80 }))
            } else {
                Ok(None)
            }
        }
    }

    fn frame(seq: u64) -> FrameHandle {
        FrameHandle {
            buffer: seq,
            sequence: seq,
            pts_us: seq * 200_000,
            width: 640,
            height: 360,
            format: nvrkit_core::frame::PixelFormat::Nv12,
        }
    }

    #[test]
    fn events_reach_the_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = {
            let seen = Arc::clone(&seen);
            Box::new(move |event: MotionEvent| {
                seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(event);
            })
        };
        let detector = MotionDetector::create(Arc::new(EveryNth(2)), Some(listener));

        for seq in 0..4 {
            detector.on_frame(&frame(seq)).expect("analyze");
        }

        let events = seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 0);
        assert_eq!(events[1].sequence, 2);
    }

    #[test]
    fn closed_detector_drops_frames() {
        struct Counting(AtomicUsize);
        impl MotionAnalyzer for Counting {
            fn analyze(&self, _frame: &FrameHandle) -> Result<Option<MotionEvent>, SinkError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }

        let analyzer = Arc::new(Counting(AtomicUsize::new(0)));
        let detector = MotionDetector::create(Arc::clone(&analyzer) as Arc<dyn MotionAnalyzer>, None);

        detector.on_frame(&frame(0)).expect("analyze");
        detector.close();
        detector.close();
        detector.on_frame(&frame(1)).expect("dropped quietly");

        assert_eq!(analyzer.0.load(Ordering::SeqCst), 1);
    }
}
