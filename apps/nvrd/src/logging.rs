// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Logging bootstrap for the appliance binary.

use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::LogConfig;

type DynLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn env_filter_or_level(default_level: tracing::Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
}

/// Initialize logging based on configuration.
///
/// Sets up console and/or daily-rotated file output. The returned guard
/// must be kept alive for the lifetime of the process so buffered file
/// output is flushed.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    let mut layers: Vec<DynLayer> = Vec::new();

    if config.console_enable {
        let console_level: tracing::Level = config.console_level.into();
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_filter(env_filter_or_level(console_level))
                .boxed(),
        );
    }

    let guard = if config.file_enable {
        std::fs::create_dir_all(&config.file_dir)?;
        let appender = tracing_appender::rolling::daily(&config.file_dir, "nvrd.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let file_level: tracing::Level = config.file_level.into();
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter_or_level(file_level))
                .boxed(),
        );
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry().with(layers).init();
    Ok(guard)
}
