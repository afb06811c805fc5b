// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for NvrKit.
//!
//! The taxonomy separates lifecycle misuse, bad configuration, and failures
//! of the external platform (which always preserve the raw vendor code).
//! An empty poll is deliberately not represented here; see
//! [`PollError`](crate::platform::PollError).

use thiserror::Error;

use crate::platform::PlatformError;

/// Categorised failure of a stage start protocol.
///
/// Starting a stage runs create, configure, enable for each planned channel
/// in order; the first sub-step to fail decides the category. The stage name
/// and channel label identify the prefix that was already brought up, which
/// the caller's teardown path then releases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Allocating a channel failed. Nothing new to roll back for this
    /// channel.
    #[error("stage '{stage}': creating channel '{channel}' failed: {source}")]
    ResourceCreationFailed {
        stage: String,
        channel: String,
        #[source]
        source: PlatformError,
    },

    /// The platform refused the channel attributes. The channel exists and
    /// must be destroyed.
    #[error("stage '{stage}': configuration of channel '{channel}' rejected: {source}")]
    ConfigurationRejected {
        stage: String,
        channel: String,
        #[source]
        source: PlatformError,
    },

    /// Enabling the configured channel failed. The channel exists and must
    /// be destroyed.
    #[error("stage '{stage}': activating channel '{channel}' failed: {source}")]
    ActivationFailed {
        stage: String,
        channel: String,
        #[source]
        source: PlatformError,
    },

    /// A start was attempted while channels from a previous start are still
    /// up.
    #[error("stage '{stage}' already has active channels")]
    AlreadyActive { stage: String },
}

impl StageError {
    /// The platform failure behind this error, if any.
    pub const fn platform(&self) -> Option<&PlatformError> {
        match self {
            Self::ResourceCreationFailed { source, .. }
            | Self::ConfigurationRejected { source, .. }
            | Self::ActivationFailed { source, .. } => Some(source),
            Self::AlreadyActive { .. } => None,
        }
    }
}

/// Main error type for NvrKit operations.
#[derive(Debug, Error)]
pub enum NvrKitError {
    /// A module's factory or `initialize` was invoked on an already-live
    /// instance.
    #[error("module '{0}' is already initialized")]
    DuplicateInitialization(String),

    /// Configuration or parameter validation error.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// A stage start protocol failed part-way.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// A direct platform call failed outside a stage start protocol, e.g.
    /// bind/unbind or queue-depth setup.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// A sink module collaborator failed while being brought up.
    #[error("sink error: {0}")]
    Sink(#[from] crate::sink::SinkError),

    /// I/O error, e.g. spawning a worker thread.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results using [`NvrKitError`].
pub type Result<T> = std::result::Result<T, NvrKitError>;
