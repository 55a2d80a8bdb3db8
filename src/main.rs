// src/main.rs

//! The main entry point for the bridge application.

use anyhow::{Result, anyhow};
use bedrock_bridge::config::Config;
use bedrock_bridge::core::logging::LogControl;
use bedrock_bridge::core::scheduler::Scheduler;
use bedrock_bridge::server;
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

const VERSION: &str = env!("BRIDGE_BUILD_VERSION");

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("bedrock-bridge version {VERSION}");
        return Ok(());
    }

    // Logging comes up first so that configuration warnings are visible.
    // RUST_LOG, when set, pins the filter; otherwise the configured level is
    // applied once the file has been read.
    let env_level = env::var("RUST_LOG").ok();
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(
        env_level.as_deref().unwrap_or("info"),
    ));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true),
        )
        .init();

    let config_path = flag_value(&args, "--config").unwrap_or("config.toml");
    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    if let Some(host) = flag_value(&args, "--host") {
        config.connection.host = host.to_string();
    }
    if let Some(port_str) = flag_value(&args, "--port") {
        match port_str.parse::<u16>() {
            Ok(port) => config.connection.port = port,
            Err(_) => {
                eprintln!("Invalid port number: {port_str}");
                std::process::exit(1);
            }
        }
    }

    let log_control = LogControl::new(
        Arc::new(reload_handle),
        env_level.clone().unwrap_or_else(|| config.log_level.clone()),
    );
    if env_level.is_none()
        && let Err(e) = log_control.set_level(&config.log_level)
    {
        error!("Ignoring configured log level '{}': {}", config.log_level, e);
    }
    if config.debug
        && let Err(e) = log_control.set_debug(true)
    {
        error!("Could not enable debug logging: {}", e);
    }

    info!("Starting bedrock-bridge {}.", VERSION);

    let workers = Scheduler::pool_size_for(config.scheduler.threads);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .thread_name("bridge-worker")
        .enable_all()
        .build()
        .map_err(|e| anyhow!("Failed to create the async runtime: {}", e))?;

    if let Err(e) = runtime.block_on(server::run(config, Some(log_control))) {
        error!("Bridge runtime error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

/// Returns the value following `flag`, if present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}
