//! flowpipe - configurable flow processing pipelines
//!
//! Loads a YAML pipeline definition, instantiates the declared segments,
//! wires them up, and runs until interrupted.
//!
//! # Usage
//!
//! ```bash
//! flowpipe -c config.yml
//! flowpipe -c config.yml -l debug
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flowpipe_pipeline::Pipeline;
use flowpipe_segments::default_registry;

/// Configurable NetFlow/IPFIX processing pipeline
#[derive(Parser, Debug)]
#[command(name = "flowpipe")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Location of the pipeline config file
    #[arg(short = 'c', long = "config", default_value = "config.yml")]
    config: PathBuf,

    /// Log level: one of 'debug', 'info', 'warning' or 'error'
    #[arg(short = 'l', long = "loglevel", default_value = "warning")]
    loglevel: String,

    /// Path to load segment plugins from, can be given multiple times
    #[arg(short = 'p', long = "plugin")]
    plugins: Vec<PathBuf>,

    /// Enable profiling: one of 'cpu', 'mem', 'memheap', 'memallocs'
    #[arg(long = "profiling")]
    profiling: Option<String>,

    /// Path to write profiling data to
    #[arg(long = "profiling-path", default_value = ".")]
    profiling_path: PathBuf,

    /// Duration of profiling
    #[arg(long = "profiling-duration", default_value = "60s", value_parser = humantime_duration)]
    profiling_duration: Duration,
}

fn humantime_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.loglevel) {
        eprintln!("invalid log level '{}': {e}", cli.loglevel);
        return ExitCode::FAILURE;
    }

    for plugin in &cli.plugins {
        // Segment plugins would need a dynamic loader; this build is
        // statically linked.
        tracing::error!(
            path = %plugin.display(),
            "loading segment plugins is unsupported in a statically linked build"
        );
        return ExitCode::FAILURE;
    }

    if let Some(profiling) = &cli.profiling {
        match profiling.as_str() {
            "cpu" | "mem" | "memheap" | "memallocs" => {
                tracing::warn!(
                    profiling = %profiling,
                    path = %cli.profiling_path.display(),
                    duration = ?cli.profiling_duration,
                    "profiling support is not compiled into this build"
                );
            }
            other => {
                tracing::error!(profiling = other, "unknown profiling type");
                return ExitCode::FAILURE;
            }
        }
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = format!("{e:#}");
            tracing::error!(error = %error, "startup failed");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn run(cli: &Cli) -> Result<()> {
    let config = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading config file {}", cli.config.display()))?;

    let registry = default_registry();
    let mut pipeline = Pipeline::from_config(&registry, &config)
        .with_context(|| format!("building pipeline from {}", cli.config.display()))?;

    pipeline.start();
    pipeline.auto_drain();
    tracing::info!(config = %cli.config.display(), "pipeline running");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    tracing::info!("interrupt received, closing pipeline");

    pipeline.close().await;
    Ok(())
}

/// Initialize the tracing subscriber from the CLI log level.
fn init_logging(level: &str) -> Result<()> {
    // The original flag vocabulary says "warning"; tracing says "warn".
    let level = match level {
        "warning" => "warn",
        other => other,
    };
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("warn"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {e}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}
