//! trouped - the Troupe server daemon
//!
//! Hosts the agent fleet and workflow orchestrator behind the HTTP
//! surface. Exit codes: 0 clean shutdown, 1 fatal startup error,
//! 2 configuration error.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use troupe_core::RuntimeConfig;
use troupe_server::{init_telemetry, serve, AppState};

const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

#[derive(Debug, Parser)]
#[command(name = "trouped", version, about = "Troupe multi-agent orchestration server")]
struct Cli {
    /// HTTP listen address (host:port)
    #[arg(value_name = "ADDRESS")]
    address: Option<String>,

    /// YAML configuration file
    #[arg(long, short, value_name = "PATH", env = "TROUPE_CONFIG")]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> anyhow::Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => RuntimeConfig::default(),
    };

    // The command-line address wins over the file
    if let Some(address) = &cli.address {
        config.listen_address = Some(address.clone());
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {:#}", error);
            return ExitCode::from(2);
        }
    };

    let address: SocketAddr = match config
        .listen_address
        .clone()
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string())
        .parse()
    {
        Ok(address) => address,
        Err(e) => {
            eprintln!("configuration error: invalid listen address: {}", e);
            return ExitCode::from(2);
        }
    };

    let logs = match init_telemetry(&config.logging) {
        Ok(logs) => logs,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fatal: failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    let outcome: Result<(), String> = runtime.block_on(async move {
        let state = AppState::from_config(config, logs)
            .map_err(|e| format!("failed to initialize runtime: {}", e))?;

        let shutdown_state = state.clone();
        let shutdown = async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown_state.manager.stop_all();
        };

        serve(address, state.clone(), shutdown)
            .await
            .map_err(|e| format!("server error: {}", e))?;

        state.service.shutdown().await;
        Ok(())
    });

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("fatal: {}", message);
            ExitCode::from(1)
        }
    }
}
