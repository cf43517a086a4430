use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use master::config::{MasterArgs, MasterConfig};
use master::{build_router, inputs, run_job, AppState};

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
                .unwrap_or_else(|_| EnvFilter::new("master=debug,tower_http=info")),
        )
        .init();

    let args = MasterArgs::parse();
    let cfg = MasterConfig::from_args(&args)?;

    for dir in [cfg.intermediate_dir(), cfg.output_dir()] {
        fs::create_dir_all(&dir)
            .with_context(|| format!("no se pudo crear {}", dir.display()))?;
    }

    let job_inputs = inputs::resolve_inputs(&args.inputs, &cfg.chunks_dir())?;

    let listener = TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .with_context(|| format!("no se pudo escuchar en {}:{}", cfg.host, cfg.port))?;
    info!(
        "master escuchando en {} (reducers={}, min_workers={}, data={})",
        listener.local_addr()?,
        cfg.num_reducers,
        cfg.min_workers,
        cfg.data_dir.display()
    );

    let state = AppState::new(cfg);

    // loop de control en segundo plano; el servidor sigue atendiendo /status
    let job_state = state.clone();
    tokio::spawn(async move {
        run_job(job_state, job_inputs).await;
    });

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(ctrl_c())
        .await
        .context("error sirviendo HTTP")?;

    info!("master detenido");
    Ok(())
}
