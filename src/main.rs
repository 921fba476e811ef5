//! protorpc - demo RPC server
//!
//! Serves `ArithService` and `EchoService` over the framed, checksummed,
//! snappy-compressed protorpc wire protocol.

use protorpc_protocol::Env;
use protorpc_server::config::CONFIG_ENV;
use protorpc_server::services::{ArithService, EchoService};
use protorpc_server::{Config, Server, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // File from PROTORPC_CONFIG if set, then env overrides
    let config_path = std::env::var(CONFIG_ENV).ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("Using default configuration ({})", e);
            Config::default()
        }
    };

    tracing::info!("Starting protorpc server");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Backlog: {}", config.network.backlog);

    let env = Env::current(config.env_name.as_str());
    let mut server = Server::new(ServerConfig::from(&config.network), env);
    server.add_service(ArithService)?;
    server.add_service(EchoService)?;
    for name in server.registry().method_names() {
        tracing::info!("  Method: {}", name);
    }

    let server = Arc::new(server);

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Blocks until shutdown
    server.bind_and_serve().await?;

    tracing::info!("Server stopped");
    Ok(())
}
