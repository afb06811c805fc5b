// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use nvrkit_core::error::StageError;
use nvrkit_core::platform::ChannelId;

use super::plan_of;
use crate::stage_controller::StageController;
use crate::test_utils::{MockPlatform, PlatformCall};

#[test]
fn start_runs_create_configure_enable_per_channel_in_plan_order() {
    let platform = Arc::new(MockPlatform::new());
    let controller = StageController::new("process", platform.clone());

    controller.start_stage(&plan_of(&["group", "scaled", "detect"])).expect("start");

    let c = |n| ChannelId(n);
    assert_eq!(
        platform.calls(),
        vec![
            PlatformCall::Create(c(0)),
            PlatformCall::Configure(c(0)),
            PlatformCall::Enable(c(0)),
            PlatformCall::Create(c(1)),
            PlatformCall::Configure(c(1)),
            PlatformCall::Enable(c(1)),
            PlatformCall::Create(c(2)),
            PlatformCall::Configure(c(2)),
            PlatformCall::Enable(c(2)),
        ]
    );
    assert!(controller.is_active());
    assert_eq!(controller.channel("scaled"), Some(c(1)));
    assert_eq!(controller.channel("nope"), None);
}

#[test]
fn stop_releases_in_exact_reverse_creation_order() {
    let platform = Arc::new(MockPlatform::new());
    let controller = StageController::new("process", platform.clone());

    controller.start_stage(&plan_of(&["group", "scaled", "detect"])).expect("start");
    controller.stop_stage();

    let c = |n| ChannelId(n);
    let teardown: Vec<_> = platform.calls().into_iter().skip(9).collect();
    assert_eq!(
        teardown,
        vec![
            PlatformCall::Disable(c(2)),
            PlatformCall::Destroy(c(2)),
            PlatformCall::Disable(c(1)),
            PlatformCall::Destroy(c(1)),
            PlatformCall::Disable(c(0)),
            PlatformCall::Destroy(c(0)),
        ]
    );
    assert!(!controller.is_active());
    assert_eq!(controller.channel("group"), None);
    assert!(platform.violations().is_empty());
}

#[test]
fn stop_twice_is_a_no_op_and_never_double_destroys() {
    let platform = Arc::new(MockPlatform::new());
    let controller = StageController::new("capture", platform.clone());

    controller.start_stage(&plan_of(&["dev", "out"])).expect("start");
    controller.stop_stage();
    let after_first = platform.calls().len();
    controller.stop_stage();

    assert_eq!(platform.calls().len(), after_first);
    assert!(platform.violations().is_empty());
}

#[test]
fn create_failure_is_categorised_and_leaves_no_record_of_the_failed_channel() {
    let platform = Arc::new(MockPlatform::new());
    let controller = StageController::new("process", platform.clone());
    platform.fail_nth("create_channel", 2, 0x30);

    let err = controller.start_stage(&plan_of(&["group", "scaled"])).expect_err("must fail");
    match err {
        StageError::ResourceCreationFailed { stage, channel, source } => {
            assert_eq!(stage, "process");
            assert_eq!(channel, "scaled");
            assert_eq!(source.code, 0x30);
        },
        other => panic!("unexpected error: {other:?}"),
    }

    // Only the first channel exists; teardown releases exactly it.
    controller.stop_stage();
    let c = |n| ChannelId(n);
    let teardown: Vec<_> = platform.calls().into_iter().skip(3).collect();
    assert_eq!(teardown, vec![PlatformCall::Disable(c(0)), PlatformCall::Destroy(c(0))]);
    assert!(platform.violations().is_empty());
}

#[test]
fn configure_failure_records_the_channel_so_teardown_destroys_it_without_disable() {
    let platform = Arc::new(MockPlatform::new());
    let controller = StageController::new("encode", platform.clone());
    platform.fail_next("configure_channel", 0x41);

    let err = controller.start_stage(&plan_of(&["stream"])).expect_err("must fail");
    assert!(matches!(err, StageError::ConfigurationRejected { ref channel, .. } if channel == "stream"));

    controller.stop_stage();
    let calls = platform.calls();
    // Never enabled, so teardown skips disable and goes straight to destroy.
    assert!(!calls.contains(&PlatformCall::Disable(ChannelId(0))));
    assert!(calls.contains(&PlatformCall::Destroy(ChannelId(0))));
    assert!(platform.violations().is_empty());
}

#[test]
fn activation_failure_is_categorised() {
    let platform = Arc::new(MockPlatform::new());
    let controller = StageController::new("encode", platform.clone());
    platform.fail_next("enable_channel", 0x52);

    let err = controller.start_stage(&plan_of(&["stream"])).expect_err("must fail");
    match err {
        StageError::ActivationFailed { channel, source, .. } => {
            assert_eq!(channel, "stream");
            assert_eq!(source.code, 0x52);
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn second_start_without_stop_is_rejected() {
    let platform = Arc::new(MockPlatform::new());
    let controller = StageController::new("capture", platform.clone());

    controller.start_stage(&plan_of(&["dev"])).expect("start");
    let err = controller.start_stage(&plan_of(&["dev"])).expect_err("must fail");
    assert!(matches!(err, StageError::AlreadyActive { ref stage } if stage == "capture"));

    // A stopped controller accepts a fresh start.
    controller.stop_stage();
    controller.start_stage(&plan_of(&["dev"])).expect("restart");
    assert!(platform.violations().is_empty());
}
