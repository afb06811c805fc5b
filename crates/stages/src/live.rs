// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Live-streaming sink.
//!
//! The wire protocol stays behind [`StreamPublisher`]; this module owns
//! session lifecycle (connect on create, disconnect on close) and adapts
//! the publisher to the frame-sink seam so it plugs into the encoder's
//! fan-out chain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nvrkit_core::error::Result;
use nvrkit_core::frame::FrameHandle;
use nvrkit_core::module::Module;
use nvrkit_core::params::EncodeParams;
use nvrkit_core::sink::{FrameSink, SinkError};

/// Network stream session. Implemented outside this core.
pub trait StreamPublisher: Send + Sync {
    /// Opens the session towards `url`, negotiating with the stream
    /// parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the session cannot be established.
    fn start(&self, params: &EncodeParams, url: &str) -> std::result::Result<(), SinkError>;

    /// Pushes one encoded frame into the session.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the frame cannot be sent; the fan-out
    /// chain logs it and keeps going.
    fn publish(&self, frame: &FrameHandle) -> std::result::Result<(), SinkError>;

    /// Closes the session. Best-effort.
    fn stop(&self);
}

/// Publishes the encoded stream to one URL.
pub struct LiveSink {
    publisher: Arc<dyn StreamPublisher>,
    url: String,
    closed: AtomicBool,
}

impl LiveSink {
    /// Opens the session and returns the sink, or fails without leaving a
    /// session behind.
    pub fn create(
        publisher: Arc<dyn StreamPublisher>,
        params: &EncodeParams,
        url: impl Into<String>,
    ) -> Result<Arc<Self>> {
        let url = url.into();
        publisher.start(params, &url)?;
        tracing::info!(url = %url, "live stream started");
        Ok(Arc::new(Self { publisher, url, closed: AtomicBool::new(false) }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FrameSink for LiveSink {
    fn label(&self) -> &str {
        "live"
    }

    fn on_frame(&self, frame: &FrameHandle) -> std::result::Result<(), SinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.publisher.publish(frame)
    }
}

impl Module for LiveSink {
    fn label(&self) -> &str {
        "live"
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.publisher.stop();
        tracing::info!(url = %self.url, "live stream stopped");
    }
}

impl Drop for LiveSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakePublisher {
        started: AtomicBool,
        stopped: AtomicUsize,
        published: AtomicUsize,
        refuse: AtomicBool,
    }

    impl StreamPublisher for FakePublisher {
        fn start(&self, _params: &EncodeParams, url: &str) -> std::result::Result<(), SinkError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(SinkError::from(format!("cannot reach {url}")));
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn publish(&self, _frame: &FrameHandle) -> std::result::Result<(), SinkError> {
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn frame() -> FrameHandle {
        FrameHandle {
            buffer: 0,
            sequence: 0,
            pts_us: 0,
            width: 1920,
            height: 1080,
            format: nvrkit_core::frame::PixelFormat::Nv12,
        }
    }

    #[test]
    fn create_opens_the_session_and_close_stops_it_once() {
        let publisher = Arc::new(FakePublisher::default());
        let sink = LiveSink::create(
            Arc::clone(&publisher) as Arc<dyn StreamPublisher>,
            &EncodeParams::default(),
            "rtmp://example/live/main",
        )
        .expect("create");
        assert!(publisher.started.load(Ordering::SeqCst));

        sink.on_frame(&frame()).expect("publish");
        assert_eq!(publisher.published.load(Ordering::SeqCst), 1);

        sink.close();
        sink.close();
        assert_eq!(publisher.stopped.load(Ordering::SeqCst), 1);

        // Frames after close are dropped, not published.
        sink.on_frame(&frame()).expect("dropped quietly");
        assert_eq!(publisher.published.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn a_refused_session_fails_create() {
        let publisher = Arc::new(FakePublisher::default());
        publisher.refuse.store(true, Ordering::SeqCst);

        let result = LiveSink::create(
            Arc::clone(&publisher) as Arc<dyn StreamPublisher>,
            &EncodeParams::default(),
            "rtmp://unreachable/live",
        );
        assert!(result.is_err());
        assert!(!publisher.started.load(Ordering::SeqCst));
    }
}
