pub mod config;
pub mod executor;
pub mod handlers;
pub mod master_client;

use anyhow::{Context, Result};
use common::{MapReduceApp, RegisterRequest};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::WorkerConfig;
use crate::handlers::{build_router, WorkerState};

const REGISTER_ATTEMPTS: u32 = 5;
const REGISTER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Ciclo de vida del worker:
/// - se registra en el master anunciando su dirección
/// - atiende /map y /reduce hasta que `shutdown` termina
pub async fn run<F>(
    config: WorkerConfig,
    listener: TcpListener,
    app: Arc<dyn MapReduceApp>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local = listener
        .local_addr()
        .context("no se pudo leer la dirección local")?;
    let hostname = hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().to_string());
    let address = config.advertised_address(local.port(), hostname.as_deref());

    let state = WorkerState::new(config, app)?;
    let cfg = state.config.clone();

    info!(
        "worker {} ({}) escuchando en {} (concurrency={}, master={})",
        cfg.worker_id,
        state.app.name(),
        address,
        cfg.concurrency,
        cfg.master_url
    );

    state
        .master
        .register_with_retry(
            &RegisterRequest {
                worker_id: cfg.worker_id,
                address,
                hostname,
            },
            REGISTER_ATTEMPTS,
            REGISTER_RETRY_DELAY,
        )
        .await
        .with_context(|| format!("no se pudo registrar en el master {}", cfg.master_url))?;

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("error sirviendo HTTP")?;

    info!("worker {} detenido", cfg.worker_id);
    Ok(())
}
