// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Stage execution state machine.
//!
//! ```text
//! Stopped ──initialize──▶ Running ──close──▶ Stopping ──worker ack──▶ Stopped
//!                            │
//!                            └──fatal poll failure (worker)──▶ Stopped
//! ```
//!
//! The control thread performs `Stopped -> Running` exactly once per
//! lifecycle instance and requests `Running -> Stopping`; only the worker
//! (or the control thread for stages that never spawned one) performs the
//! terminal transition to `Stopped`. A worker that dies on a poll failure
//! goes straight to `Stopped`; that is a valid terminal state which a later
//! `close` must handle without blocking.

use std::sync::atomic::{AtomicU8, Ordering};

/// Execution state of a stage's acquisition worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StageState {
    /// No worker running. Initial and terminal state.
    Stopped = 0,
    /// The worker is polling the hardware channel.
    Running = 1,
    /// Stop requested; the worker exits at the top of its next iteration.
    Stopping = 2,
}

/// Lock-free cell holding a [`StageState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(StageState::Stopped as u8))
    }

    pub fn get(&self) -> StageState {
        match self.0.load(Ordering::Acquire) {
            1 => StageState::Running,
            2 => StageState::Stopping,
            _ => StageState::Stopped,
        }
    }

    /// `Stopped -> Running`. False when the stage is already live.
    pub fn try_start(&self) -> bool {
        self.0
            .compare_exchange(
                StageState::Stopped as u8,
                StageState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `Running -> Stopping`. False when the worker already stopped on its
    /// own (or never ran).
    pub fn request_stop(&self) -> bool {
        self.0
            .compare_exchange(
                StageState::Running as u8,
                StageState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Terminal transition, performed by the worker on exit.
    pub fn mark_stopped(&self) {
        self.0.store(StageState::Stopped as u8, Ordering::Release);
    }

    /// True while no stop has been requested. Workers check this at the top
    /// of every iteration.
    pub fn is_running(&self) -> bool {
        self.get() == StageState::Running
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stopped() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), StageState::Stopped);
        assert!(!cell.is_running());
    }

    #[test]
    fn start_happens_once() {
        let cell = StateCell::new();
        assert!(cell.try_start());
        assert!(!cell.try_start());
        assert_eq!(cell.get(), StageState::Running);
    }

    #[test]
    fn stop_request_only_interrupts_a_running_worker() {
        let cell = StateCell::new();
        assert!(!cell.request_stop());

        assert!(cell.try_start());
        assert!(cell.request_stop());
        assert_eq!(cell.get(), StageState::Stopping);

        cell.mark_stopped();
        assert_eq!(cell.get(), StageState::Stopped);
        assert!(!cell.request_stop());
    }

    #[test]
    fn worker_may_stop_unilaterally() {
        let cell = StateCell::new();
        assert!(cell.try_start());
        // Fatal poll failure path: no Stopping phase.
        cell.mark_stopped();
        assert!(!cell.request_stop());
        // The lifecycle can start again after a full stop.
        assert!(cell.try_start());
    }
}
