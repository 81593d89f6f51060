mod tape;

use std::sync::Arc;

use clap::Parser;

use siphon_clickhouse::{ClickHouseClient, ClickHouseConfig};
use siphon_engine::config::SiphonConfig;
use siphon_engine::supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "siphon-server", about = "Siphon time-series replication server")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "config.toml", env = "SIPHON_CONFIG")]
    config: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(config = %cli.config, "loading configuration");
    let config = match SiphonConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let destination = match ClickHouseClient::new(&ClickHouseConfig {
        host: config.destination.host.clone(),
        port: config.destination.port,
        user: config.destination.user.clone(),
        password: config.destination.password.clone(),
        tls: config.destination.tls,
        accept_invalid_certs: config.destination.accept_invalid_certs,
    }) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to build destination client");
            std::process::exit(1);
        }
    };
    let source = Arc::new(tape::TapeSource::new(config.source.tape_dir.clone()));

    let mut supervisor = Supervisor::new(
        source,
        Arc::new(destination),
        config.writer.settings(),
        config.destination.database.clone(),
    );
    for unit in &config.units {
        if let Err(e) = supervisor.start_unit(unit) {
            tracing::error!(unit = %unit.name, error = %e, "failed to start unit");
            std::process::exit(1);
        }
    }

    tracing::info!(units = supervisor.running(), "siphon-server started, press Ctrl+C to stop");

    loop {
        if supervisor.running() == 0 {
            tracing::info!("all units finished");
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down...");
                break;
            }
            exit = supervisor.next_exit() => {
                if let Some(exit) = exit {
                    match exit.result {
                        Ok(()) => tracing::info!(unit = %exit.key, "unit completed"),
                        Err(e) => tracing::error!(unit = %exit.key, error = %e, "unit failed; restart requires operator action"),
                    }
                }
            }
        }
    }

    supervisor.shutdown().await;
}
