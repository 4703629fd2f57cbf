//! Onebox host binary - runs frontend, matching and history in one process.
//!
//! Usage: `onebox [--config onebox.json] [--settle 5s]`
//!
//! A startup failure is fatal: it is logged and the process exits with
//! status 1.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use onebox_core::host::StandaloneConstructor;
use onebox_core::{HostConfig, Onebox, ServiceConstructors};

#[derive(Debug, Parser)]
#[command(name = "onebox", about = "Run every service in one process")]
struct Cli {
    /// JSON config file. Defaults apply when omitted.
    #[arg(long, env = "ONEBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Override the settle period (e.g. "5s", "500ms").
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    settle: Option<Duration>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(path) => match HostConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => HostConfig::default(),
    };
    if let Some(settle) = cli.settle {
        config.settle_period = settle;
    }

    onebox_core::observability::init_tracing_with(&config.observability);

    let constructors = ServiceConstructors::uniform(Arc::new(StandaloneConstructor));
    let mut onebox = match Onebox::new(config, constructors) {
        Ok(onebox) => onebox,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    if let Err(e) = onebox.start().await {
        tracing::error!(error = %e, "failed to start onebox");
        std::process::exit(1);
    }
    tracing::info!(
        frontend = onebox.frontend_address(),
        matching = onebox.matching_service_address(),
        history = onebox.history_service_address(),
        "ready, press Ctrl-C to stop"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C, stopping now");
    }
    onebox.stop().await;
}
