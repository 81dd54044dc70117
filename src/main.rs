// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::ShowConfig => {
            let config = relay_config::load(cli.config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::Validate => {
            let config = relay_config::load(cli.config.as_deref())?;
            tracing::info!(
                bind_addr = %config.server.bind_addr,
                port = config.server.port,
                "configuration is valid"
            );
            Ok(())
        }
        Commands::Serve => serve(cli.config).await,
    }
}

async fn serve(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let config = relay_config::load(config_path.as_deref())?;
    let bind_addr = config.server.bind_addr.clone();
    let port = config.server.port;

    let app = relay_bootstrap::App::bootstrap(config).await?;
    let router = relay_gateway::build_router(app.state.clone());

    let listener = tokio::net::TcpListener::bind((bind_addr.as_str(), port)).await?;
    tracing::info!(%bind_addr, port, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

/// No TUI mode to protect here, unlike the interactive tool this server was
/// adapted from: tracing always goes to stderr, gated by `-v`/`RUST_LOG`.
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}
