// SPDX-FileCopyrightText: © 2025 NvrKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! nvrd: the NvrKit video appliance.
//!
//! Builds the capture/process/encode pipeline on the simulated platform,
//! attaches the configured sinks, and runs until SIGINT. Teardown follows
//! construction in exact reverse order.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use nvrkit_core::platform::MediaPlatform;
use nvrkit_engine::SimulatedPlatform;
use nvrkit_stages::{LiveSink, MotionDetector, MotionEvent, RecordSink, VideoPipeline};

mod cli;
mod collaborators;
mod config;
mod logging;

fn main() {
    let cli = cli::Cli::parse();
    match cli.command.unwrap_or(cli::Commands::Run) {
        cli::Commands::Run => handle_run_command(&cli.config),
        cli::Commands::Config(cli::ConfigCommands::Default) => handle_config_default_command(),
    }
}

/// Handle the "run" command - start the appliance.
/// Exits the process on error with status code 1.
fn handle_run_command(config_path: &str) {
    let loaded = match config::load(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        },
    };

    let _log_guard = match logging::init_logging(&loaded.config.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(1);
        },
    };

    if let Some(missing) = &loaded.file_missing {
        warn!(config_path = %missing, "Config file not found, using defaults");
    }

    if let Err(e) = run(&loaded.config) {
        error!(error = %e, "Appliance failed");
        std::process::exit(1);
    }
}

/// Handle the "config default" command - print default config to stdout.
fn handle_config_default_command() {
    match config::generate_default() {
        Ok(toml_string) => {
            println!("# Default nvrd configuration file");
            println!("{toml_string}");
        },
        Err(e) => {
            eprintln!("Failed to generate default config: {e}");
            std::process::exit(1);
        },
    }
}

fn run(config: &config::Config) -> anyhow::Result<()> {
    let platform: Arc<dyn MediaPlatform> = Arc::new(SimulatedPlatform::new());

    let pipeline = VideoPipeline::create(Arc::clone(&platform), &config.pipeline)
        .context("building the video pipeline")?;

    if config.sinks.motion_detection {
        let detector = MotionDetector::create(
            Arc::new(collaborators::NullAnalyzer),
            Some(Box::new(|event: MotionEvent| {
                info!(level = event.level, pts_us = event.pts_us, "motion event");
            })),
        );
        pipeline.set_detection_sink(Some(detector));
    }

    if !config.sinks.live_url.is_empty() {
        let live = LiveSink::create(
            Arc::new(collaborators::DebugPublisher),
            &config.pipeline.encode,
            config.sinks.live_url.clone(),
        )
        .context("starting the live sink")?;
        pipeline.add_sink(live);
    }

    if !config.sinks.record_dir.is_empty() {
        let record = RecordSink::create(
            Arc::new(collaborators::IndexWriter::default()),
            &config.pipeline.encode,
            config.sinks.record_dir.clone(),
        )
        .context("starting the record sink")?;
        pipeline.add_sink(record);
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("installing the SIGINT handler")?;

    info!("pipeline running, press Ctrl-C to stop");
    loop {
        match shutdown_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(()) => {
                info!("received SIGINT, shutting down");
                break;
            },
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if pipeline.stalled() {
                    // Exit so a supervisor can restart the unit cleanly.
                    pipeline.shutdown();
                    anyhow::bail!("a pipeline stage stopped unexpectedly");
                }
            },
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    pipeline.shutdown();
    Ok(())
}
