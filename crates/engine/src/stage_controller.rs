// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Idempotent start/stop protocol for one hardware-backed stage.
//!
//! A stage brings up one or more channels on the media platform. The
//! controller runs the start protocol (create, configure, enable, in plan
//! order) and records every channel the moment it exists, so that teardown
//! can target exactly the prefix that came up, in exact reverse order.
//!
//! Start failures are reported with the sub-step's category and the vendor
//! code; the controller does not roll back on its own. Teardown is
//! best-effort: a hardware failure halfway through shutdown is logged and
//! must never stop the rest of the teardown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use nvrkit_core::error::StageError;
use nvrkit_core::platform::{ChannelId, ChannelSpec, MediaPlatform};

/// One channel the stage brings up, identified by a stable label.
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    pub label: &'static str,
    pub spec: ChannelSpec,
}

/// Creation-ordered channel plan for a stage. Teardown is the exact
/// reverse of this order.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub channels: Vec<ChannelPlan>,
}

#[derive(Debug)]
struct ActiveChannel {
    id: ChannelId,
    enabled: bool,
}

/// Wraps the create/configure/enable and disable/destroy protocol for one
/// stage as a pair of operations.
pub struct StageController {
    platform: Arc<dyn MediaPlatform>,
    stage: String,
    active: Mutex<IndexMap<&'static str, ActiveChannel>>,
}

impl StageController {
    pub fn new(stage: impl Into<String>, platform: Arc<dyn MediaPlatform>) -> Self {
        Self { platform, stage: stage.into(), active: Mutex::new(IndexMap::new()) }
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Runs create, configure, enable for every planned channel, in order.
    ///
    /// Channels are recorded as soon as they are created. When a sub-step
    /// fails, the returned error names the offending channel and sub-step,
    /// and a subsequent [`stop_stage`](Self::stop_stage) releases exactly
    /// the prefix that succeeded. No rollback happens here.
    ///
    /// # Errors
    ///
    /// [`StageError::AlreadyActive`] when called between a successful start
    /// and the matching stop; otherwise the failing sub-step's category
    /// with the vendor code preserved.
    pub fn start_stage(&self, plan: &StagePlan) -> Result<(), StageError> {
        let mut active = self.lock_active();
        if !active.is_empty() {
            return Err(StageError::AlreadyActive { stage: self.stage.clone() });
        }

        for ch in &plan.channels {
            let id = self.platform.create_channel(&ch.spec).map_err(|source| {
                StageError::ResourceCreationFailed {
                    stage: self.stage.clone(),
                    channel: ch.label.to_string(),
                    source,
                }
            })?;
            active.insert(ch.label, ActiveChannel { id, enabled: false });
            tracing::debug!(stage = %self.stage, channel = ch.label, %id, "channel created");

            self.platform.configure_channel(id, &ch.spec).map_err(|source| {
                StageError::ConfigurationRejected {
                    stage: self.stage.clone(),
                    channel: ch.label.to_string(),
                    source,
                }
            })?;

            self.platform.enable_channel(id).map_err(|source| StageError::ActivationFailed {
                stage: self.stage.clone(),
                channel: ch.label.to_string(),
                source,
            })?;
            if let Some(entry) = active.get_mut(ch.label) {
                entry.enabled = true;
            }
            tracing::debug!(stage = %self.stage, channel = ch.label, %id, "channel enabled");
        }

        Ok(())
    }

    /// Best-effort teardown of every recorded channel in exact reverse
    /// creation order: disable (if it was enabled), then destroy.
    ///
    /// Failures are logged and swallowed so the rest of the teardown always
    /// proceeds. Draining the record makes repeated calls no-ops.
    pub fn stop_stage(&self) {
        let mut active = self.lock_active();
        while let Some((label, ch)) = active.pop() {
            if ch.enabled {
                if let Err(e) = self.platform.disable_channel(ch.id) {
                    tracing::error!(
                        stage = %self.stage,
                        channel = label,
                        error = %e,
                        "disable failed during teardown"
                    );
                }
            }
            if let Err(e) = self.platform.destroy_channel(ch.id) {
                tracing::error!(
                    stage = %self.stage,
                    channel = label,
                    error = %e,
                    "destroy failed during teardown"
                );
            }
            tracing::debug!(stage = %self.stage, channel = label, id = %ch.id, "channel released");
        }
    }

    /// Resolves a planned channel by label. `None` before a start or after
    /// a stop.
    pub fn channel(&self, label: &str) -> Option<ChannelId> {
        self.lock_active().get(label).map(|ch| ch.id)
    }

    /// True between a successful start and the matching stop.
    pub fn is_active(&self) -> bool {
        !self.lock_active().is_empty()
    }

    fn lock_active(&self) -> MutexGuard<'_, IndexMap<&'static str, ActiveChannel>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
