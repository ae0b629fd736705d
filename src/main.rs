// src/main.rs
// Entry point: parses the CLI, builds the service, and dispatches to the
// selected mode.

use chatter_search::cli::{CliArgs, Command};
use chatter_search::config::AppConfig;
use chatter_search::search::SearchOverrides;
use chatter_search::{metrics, Service};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.logging.filter.clone()))
        .init();

    if let Err(e) = config.validate() {
        tracing::error!("configuration error: {}", e);
        return ExitCode::from(1);
    }

    let service = match Service::build(config).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("failed to build service: {}", e);
            return ExitCode::from(2);
        }
    };

    match run(args.command, service).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal runtime error: {}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(command: Command, mut service: Service) -> anyhow::Result<()> {
    match command {
        Command::Ingestion => {
            service.ingestion.start();
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutdown signal received, stopping ingestion worker");
            service.ingestion.shutdown();
            Ok(())
        }
        Command::Serve => {
            metrics::install();
            service.ingestion.start();

            let state = service.build_app_state();
            let listen_addr = service.config.server.listen_addr.clone();
            let router = chatter_search::server::build_router(state, &service.config.server);

            let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
            tracing::info!("listening on {}", listen_addr);

            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;

            service.ingestion.shutdown();
            Ok(())
        }
        Command::SearchOnce { query, top_k } => {
            let overrides = SearchOverrides {
                top_k,
                ..Default::default()
            };
            let response = service.search.search(&query, overrides).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}
