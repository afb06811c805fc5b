// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Common lifecycle contract for stage-wrapping components.
//!
//! Every component that wraps hardware resources or a worker follows the
//! same pattern: an associated factory `create(...)` that returns
//! `Result<Arc<Self>, NvrKitError>`, and an idempotent [`Module::close`].
//!
//! The factory is all-or-nothing. It never hands out a partially
//! constructed object: either every sub-resource and worker is up, or the
//! attempt has been fully rolled back before the error is returned.
//!
//! Ownership is shared. The orchestrator may hand the same `Arc` to several
//! holders (a sink chain and a control surface, say); whichever owner
//! releases last triggers `close` through `Drop` if nobody called it
//! explicitly.

/// Lifecycle contract implemented by every stage-wrapping component.
pub trait Module: Send + Sync {
    /// Stable name used in logs and metrics.
    fn label(&self) -> &str;

    /// Stops workers and releases hardware resources.
    ///
    /// Idempotent: repeated calls after closure are no-ops. Safe to call
    /// from `Drop` and while a worker thread is still exiting.
    fn close(&self);
}
