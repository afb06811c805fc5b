// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Layered appliance configuration.
//!
//! Defaults, overridden by `nvrd.toml`, overridden by `NVRD_*` environment
//! variables (nested keys split on `__`, e.g. `NVRD_LOG__CONSOLE_LEVEL`).

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use nvrkit_stages::PipelineConfig;

const fn default_true() -> bool {
    true
}

fn default_file_dir() -> String {
    "logs".to_string()
}

/// Log verbosity, configurable per output.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Logging configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogConfig {
    /// Enable console logging
    #[serde(default = "default_true")]
    pub console_enable: bool,
    /// Console log level (RUST_LOG overrides when set)
    pub console_level: LogLevel,
    /// Enable daily-rotated file logging
    #[serde(default)]
    pub file_enable: bool,
    /// Directory for log files
    #[serde(default = "default_file_dir")]
    pub file_dir: String,
    /// File log level
    pub file_level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            console_level: LogLevel::Info,
            file_enable: false,
            file_dir: default_file_dir(),
            file_level: LogLevel::Debug,
        }
    }
}

/// Frame consumers to attach at startup.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SinkConfig {
    /// Publish the encoded stream to this URL. Empty disables live
    /// streaming.
    #[serde(default)]
    pub live_url: String,
    /// Write stream index files under this directory. Empty disables
    /// recording.
    #[serde(default)]
    pub record_dir: String,
    /// Attach the motion-detection sink to the process stage. Off by
    /// default until an analyzer backend is wired in.
    #[serde(default)]
    pub motion_detection: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self { live_url: String::new(), record_dir: String::new(), motion_detection: false }
    }
}

/// Complete appliance configuration.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sinks: SinkConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// A loaded configuration plus where it fell back to defaults.
pub struct LoadResult {
    pub config: Config,
    /// Set when the config file was missing and defaults were used.
    pub file_missing: Option<String>,
}

/// Loads the layered configuration.
///
/// # Errors
///
/// Returns a [`figment::Error`] when the file or environment contains
/// values that do not deserialize into [`Config`].
pub fn load(path: &str) -> Result<LoadResult, figment::Error> {
    let file_missing = (!std::path::Path::new(path).exists()).then(|| path.to_string());
    let config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NVRD_").split("__"))
        .extract()?;
    Ok(LoadResult { config, file_missing })
}

/// Renders the default configuration as TOML.
///
/// # Errors
///
/// Returns a [`toml::ser::Error`] when serialization fails.
pub fn generate_default() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let rendered = generate_default().expect("serialize defaults");
        let parsed: Config = toml::from_str(&rendered).expect("parse defaults");
        assert_eq!(parsed.pipeline, Config::default().pipeline);
        assert!(parsed.sinks.live_url.is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loaded = load("definitely-not-here.toml").expect("load");
        assert!(loaded.file_missing.is_some());
        assert_eq!(loaded.config.pipeline, PipelineConfig::default());
    }
}
