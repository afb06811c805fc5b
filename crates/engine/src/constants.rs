// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared timing defaults for stage workers.

use std::time::Duration;

/// Default bounded wait for one poll against a hardware channel.
///
/// This also bounds cancellation latency: a stop request is observed at the
/// top of the next loop iteration, so a worker blocked in an empty poll
/// reacts within this window.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Queue depth requested on a polled channel before its worker starts.
///
/// Depth 1 means the platform holds at most the newest undelivered frame;
/// a slow consumer observes fresh frames instead of a growing backlog.
pub const POLL_CHANNEL_DEPTH: u32 = 1;
