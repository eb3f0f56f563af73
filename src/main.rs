//! Affinity Engine CLI - declarative CPU affinity and priority
//!
//! Validates the configuration document, then applies it once or
//! periodically until interrupted with Ctrl+C.

use affinity_engine::bootstrap::Bootstrap;
use affinity_engine::config::{CliArgs, ConfigLoader, LogFormat, RuntimeConfig};
use affinity_engine::control::{AffinityControl, DryRunControl, SystemControl, TimedControl};
use affinity_engine::error::{exit_code, EngineError, Result};
use affinity_engine::scheduler::SchedulerHandle;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();
    let config = match RuntimeConfig::from_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(exit_code::GENERIC);
        }
    };

    init_logging(&config);
    tracing::info!("Starting affinity engine {}", affinity_engine::VERSION);

    // Handle result
    if let Err(e) = run(config) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(config: &RuntimeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level));

    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn run(config: RuntimeConfig) -> Result<()> {
    let loader = ConfigLoader::new(Some(config.config_path.as_path()));

    if !loader.validate_schema() {
        return Err(EngineError::Schema(format!(
            "{:?} does not match {:?}",
            loader.config_path(),
            loader.schema_path()
        )));
    }

    let handle = Bootstrap::new(loader).start(build_control(&config))?;

    // A single pass is short; only a periodic loop waits for Ctrl+C.
    if handle.is_periodic() {
        wait_for_worker(&handle)?;
    }

    let summary = handle.join()?;
    println!(
        "Applied {} pass(es), {} call(s), {} failed{}",
        summary.passes,
        summary.calls,
        summary.failures,
        if summary.cancelled { ", stopped by request" } else { "" }
    );

    Ok(())
}

fn build_control(config: &RuntimeConfig) -> Arc<dyn AffinityControl> {
    let control: Arc<dyn AffinityControl> = if config.dry_run {
        Arc::new(DryRunControl::new())
    } else {
        Arc::new(SystemControl::new())
    };

    match config.call_timeout {
        Some(timeout) => Arc::new(TimedControl::new(control, timeout)),
        None => control,
    }
}

/// Block until a periodic worker finishes, stopping it on Ctrl+C
fn wait_for_worker(handle: &SchedulerHandle) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| EngineError::io("tokio runtime", e))?;

    rt.block_on(async {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => {
                        tracing::info!("Interrupted, stopping scheduler");
                        handle.stop();
                    }
                    Err(e) => {
                        tracing::error!("Failed to listen for Ctrl+C: {}", e);
                        worker_finished(handle).await;
                    }
                }
            }
            _ = worker_finished(handle) => {}
        }
    });

    Ok(())
}

async fn worker_finished(handle: &SchedulerHandle) {
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    while !handle.is_finished() {
        ticker.tick().await;
    }
}
