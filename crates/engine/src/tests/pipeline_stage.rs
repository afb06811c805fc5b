// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;
use std::time::Duration;

use nvrkit_core::error::NvrKitError;
use nvrkit_core::platform::MediaPlatform;
use nvrkit_core::sink::FrameSink;
use nvrkit_core::state::StageState;

use super::plan_of;
use crate::pipeline_stage::PipelineStage;
use crate::test_utils::{test_frame, wait_for, MockPlatform, RecordingSink, SinkBehavior};

const TICK: Duration = Duration::from_millis(10);
const PATIENCE: Duration = Duration::from_secs(2);

fn stage_on(platform: &Arc<MockPlatform>, name: &str) -> PipelineStage {
    PipelineStage::with_poll_timeout(name, Arc::clone(platform) as Arc<dyn MediaPlatform>, TICK)
}

#[test]
fn frames_reach_the_sink_in_poll_order_and_stop_after_detach() {
    let platform = Arc::new(MockPlatform::new());
    let stage = stage_on(&platform, "process");
    stage.initialize(&plan_of(&["out"]), "out").expect("initialize");
    assert_eq!(stage.state(), StageState::Running);

    let channel = platform.poll_channel().expect("depth setup identifies the poll channel");
    let sink = Arc::new(RecordingSink::new("a"));
    stage.set_sink(Some(Arc::clone(&sink) as Arc<dyn FrameSink>));

    for seq in 0..3 {
        platform.push_frame(channel, test_frame(seq));
    }
    assert!(wait_for(PATIENCE, || sink.frame_count() == 3));
    let sequences: Vec<u64> = sink.frames().iter().map(|f| f.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2]);

    stage.set_sink(None);
    for seq in 3..5 {
        platform.push_frame(channel, test_frame(seq));
    }
    // Detached frames are still polled and released, just not delivered.
    assert!(wait_for(PATIENCE, || platform.releases().len() == 5));
    assert_eq!(sink.frame_count(), 3);

    stage.close();
    assert_eq!(stage.state(), StageState::Stopped);
    let after_first_close = platform.calls().len();
    stage.close();
    assert_eq!(platform.calls().len(), after_first_close);

    assert!(platform.violations().is_empty());
    assert_eq!(platform.outstanding_frames(), 0);
}

#[test]
fn empty_polls_never_stop_the_loop_and_never_release() {
    let platform = Arc::new(MockPlatform::new());
    let stage = stage_on(&platform, "process");
    stage.initialize(&plan_of(&["out"]), "out").expect("initialize");

    // Several poll timeouts worth of nothing.
    std::thread::sleep(TICK * 8);
    assert_eq!(stage.state(), StageState::Running);
    assert!(platform.releases().is_empty());

    // The loop is still alive and picks up the next frame.
    let channel = platform.poll_channel().expect("poll channel");
    let sink = Arc::new(RecordingSink::new("late"));
    stage.set_sink(Some(Arc::clone(&sink) as Arc<dyn FrameSink>));
    platform.push_frame(channel, test_frame(0));
    assert!(wait_for(PATIENCE, || sink.frame_count() == 1));

    stage.close();
    assert!(platform.violations().is_empty());
}

#[test]
fn fatal_poll_failure_stops_the_worker_but_close_still_tears_down() {
    let platform = Arc::new(MockPlatform::new());
    let stage = stage_on(&platform, "process");
    stage.initialize(&plan_of(&["out"]), "out").expect("initialize");

    let channel = platform.poll_channel().expect("poll channel");
    platform.push_poll_error(channel, 0x77);
    assert!(wait_for(PATIENCE, || stage.state() == StageState::Stopped));

    // The thread is gone; close must still join and release the hardware.
    stage.close();
    assert_eq!(platform.live_channels(), 0);
    assert!(platform.violations().is_empty());
}

#[test]
fn every_polled_frame_is_released_exactly_once_with_or_without_a_sink() {
    let platform = Arc::new(MockPlatform::new());
    let stage = stage_on(&platform, "process");
    stage.initialize(&plan_of(&["out"]), "out").expect("initialize");
    let channel = platform.poll_channel().expect("poll channel");

    // No sink attached.
    platform.push_frame(channel, test_frame(0));
    assert!(wait_for(PATIENCE, || platform.releases().len() == 1));

    // Failing sink.
    let sink = Arc::new(RecordingSink::new("broken"));
    sink.set_behavior(SinkBehavior::Fail);
    stage.set_sink(Some(Arc::clone(&sink) as Arc<dyn FrameSink>));
    platform.push_frame(channel, test_frame(1));
    assert!(wait_for(PATIENCE, || platform.releases().len() == 2));
    assert_eq!(sink.frame_count(), 0);

    assert_eq!(platform.releases(), vec![(channel, 0), (channel, 1)]);
    stage.close();
    assert!(platform.violations().is_empty());
}

#[test]
fn a_panicking_sink_does_not_leak_the_frame_or_kill_the_loop() {
    let platform = Arc::new(MockPlatform::new());
    let stage = stage_on(&platform, "process");
    stage.initialize(&plan_of(&["out"]), "out").expect("initialize");
    let channel = platform.poll_channel().expect("poll channel");

    let sink = Arc::new(RecordingSink::new("panicky"));
    sink.set_behavior(SinkBehavior::Panic);
    stage.set_sink(Some(Arc::clone(&sink) as Arc<dyn FrameSink>));

    platform.push_frame(channel, test_frame(0));
    assert!(wait_for(PATIENCE, || platform.releases().len() == 1));
    assert_eq!(stage.state(), StageState::Running);

    // Back to normal, the same loop keeps delivering.
    sink.set_behavior(SinkBehavior::Accept);
    platform.push_frame(channel, test_frame(1));
    assert!(wait_for(PATIENCE, || sink.frame_count() == 1));

    stage.close();
    assert_eq!(platform.outstanding_frames(), 0);
    assert!(platform.violations().is_empty());
}

#[test]
fn initialize_twice_is_rejected() {
    let platform = Arc::new(MockPlatform::new());
    let stage = stage_on(&platform, "process");
    stage.initialize(&plan_of(&["out"]), "out").expect("initialize");

    let err = stage.initialize(&plan_of(&["out"]), "out").expect_err("must fail");
    assert!(matches!(err, NvrKitError::DuplicateInitialization(ref name) if name == "process"));

    stage.close();
    assert!(platform.violations().is_empty());
}

#[test]
fn initialize_failure_releases_the_prefix_and_starts_no_thread() {
    let platform = Arc::new(MockPlatform::new());
    let stage = stage_on(&platform, "process");
    platform.fail_nth("enable_channel", 2, 0x21);

    let err = stage.initialize(&plan_of(&["group", "detect"]), "detect").expect_err("must fail");
    assert!(matches!(
        err,
        NvrKitError::Stage(nvrkit_core::error::StageError::ActivationFailed { ref channel, .. })
            if channel == "detect"
    ));

    // The first channel was disabled and destroyed exactly once; the second
    // was created but never enabled, so it was only destroyed.
    assert_eq!(platform.live_channels(), 0);
    assert_eq!(stage.state(), StageState::Stopped);
    assert!(platform.poll_channel().is_none(), "no depth setup, no worker");
    assert!(platform.violations().is_empty());

    // Close after a failed initialize is a no-op.
    let calls = platform.calls().len();
    stage.close();
    assert_eq!(platform.calls().len(), calls);
}

#[test]
fn sinks_can_be_swapped_while_the_loop_runs() {
    let platform = Arc::new(MockPlatform::new());
    let stage = stage_on(&platform, "process");
    stage.initialize(&plan_of(&["out"]), "out").expect("initialize");
    let channel = platform.poll_channel().expect("poll channel");

    let first = Arc::new(RecordingSink::new("first"));
    stage.set_sink(Some(Arc::clone(&first) as Arc<dyn FrameSink>));
    platform.push_frame(channel, test_frame(0));
    assert!(wait_for(PATIENCE, || first.frame_count() == 1));

    let second = Arc::new(RecordingSink::new("second"));
    stage.set_sink(Some(Arc::clone(&second) as Arc<dyn FrameSink>));
    platform.push_frame(channel, test_frame(1));
    assert!(wait_for(PATIENCE, || second.frame_count() == 1));
    assert_eq!(first.frame_count(), 1);

    stage.close();
    assert_eq!(platform.releases().len(), 2);
    assert!(platform.violations().is_empty());
}

#[test]
fn dropping_the_stage_closes_it() {
    let platform = Arc::new(MockPlatform::new());
    {
        let stage = stage_on(&platform, "process");
        stage.initialize(&plan_of(&["out"]), "out").expect("initialize");
    }
    assert_eq!(platform.live_channels(), 0);
    assert!(platform.violations().is_empty());
}
