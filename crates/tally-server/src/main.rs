#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use server::config::{CliArgs, Role, ServerConfig};
use server::telemetry::init_telemetry;
use server::web::{SharedStore, run_web};
use server::worker::worker_loop;
use std::sync::Arc;
use tally_core::{CancellationToken, Store, store::RedisStore};
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    // An unreachable store at startup is fatal; there is no retry loop here.
    let store = connect_store(&config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let result = match config.role {
        Role::Web => run_web(&config, store, shutdown.cancelled_owned()).await,
        Role::Worker => {
            worker_loop(&config, store, shutdown).await;
            Ok(())
        }
    };

    providers.shutdown();
    result
}

async fn connect_store(config: &ServerConfig) -> anyhow::Result<SharedStore> {
    let connect = async {
        let store = RedisStore::connect(&config.store_addr, config.store_index).await?;
        store.ping().await?;
        Ok::<_, tally_core::Error>(store)
    };

    let store = tokio::time::timeout(config.startup_timeout, connect)
        .await
        .with_context(|| {
            format!(
                "store at {} did not answer within {:?}",
                config.store_addr, config.startup_timeout
            )
        })?
        .with_context(|| format!("store at {} is unreachable", config.store_addr))?;

    tracing::info!(addr = %config.store_addr, index = config.store_index, "Store reachable");
    Ok(Arc::new(store))
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting {:?} role with full config: {:#?}", config.role, config);
    } else {
        tracing::info!(
            "Starting {:?} role on {} against {}",
            config.role,
            config.hostname,
            config.store_addr
        );
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    shutdown.cancel();
}
