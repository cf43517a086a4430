use anyhow::{Context, Result};
use clap::Parser;
use common::WordCount;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use worker::config::{WorkerArgs, WorkerConfig};

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("no se pudo escuchar Ctrl-C: {:?}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=debug,reqwest=info")),
        )
        .init();

    let cfg = WorkerConfig::from_args(WorkerArgs::parse());

    let listener = TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .with_context(|| format!("no se pudo escuchar en {}:{}", cfg.host, cfg.port))?;

    worker::run(cfg, listener, Arc::new(WordCount), ctrl_c()).await
}
