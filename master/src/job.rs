// master/src/job.rs

use common::{paths::reduce_output_file, JobPhase};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::dispatch::{Dispatcher, TaskRequest};
use crate::merge::{merge_outputs, MergeSummary};
use crate::state::{AppState, Assignment, Coordinator};

/// Loop de control del job:
/// - espera a `min_workers`
/// - despacha los map y espera a que terminen todos
/// - despacha los reduce con el manifest congelado y espera
/// - hace el merge final
///
/// Devuelve la fase terminal (DONE o FAILED).
pub async fn run_job(state: AppState, inputs: Vec<String>) -> JobPhase {
    let mut inflight = JoinSet::new();
    let phase = drive(&state, inputs, &mut inflight).await;

    // los despachos que queden siguen solos; el job ya terminó
    inflight.detach_all();
    phase
}

async fn drive(state: &AppState, inputs: Vec<String>, inflight: &mut JoinSet<()>) -> JobPhase {
    let coordinator = state.coordinator.clone();
    let cfg = state.config.clone();

    let dispatcher = match Dispatcher::new(cfg.dispatch_timeout) {
        Ok(d) => d,
        Err(e) => {
            coordinator.fail_job("dispatch", format!("{e:#}"));
            return coordinator.phase();
        }
    };

    info!("esperando {} workers...", cfg.min_workers);
    let registered = coordinator.wait_for_workers(cfg.min_workers).await;
    info!(
        "{} workers registrados; arrancando job {}",
        registered,
        coordinator.job_id()
    );

    /* -------- MAP -------- */
    let maps = match coordinator.begin_map_phase(inputs) {
        Ok(a) => a,
        Err(e) => {
            coordinator.fail_job("map", e.to_string());
            return coordinator.phase();
        }
    };
    spawn_dispatches(inflight, &dispatcher, &coordinator, maps, cfg.dispatch_stagger).await;
    coordinator.dispatch_finished(JobPhase::MapDispatch);

    if coordinator.wait_for_phase(&[JobPhase::ReduceDispatch]).await == JobPhase::Failed {
        return JobPhase::Failed;
    }

    /* -------- REDUCE -------- */
    let reduces = match coordinator.begin_reduce_phase() {
        Ok(a) => a,
        Err(e) => {
            coordinator.fail_job("reduce", e.to_string());
            return coordinator.phase();
        }
    };
    spawn_dispatches(inflight, &dispatcher, &coordinator, reduces, cfg.dispatch_stagger).await;
    coordinator.dispatch_finished(JobPhase::ReduceDispatch);

    if coordinator.wait_for_phase(&[JobPhase::Merging]).await == JobPhase::Failed {
        return JobPhase::Failed;
    }

    /* -------- MERGE -------- */
    let output_dir = cfg.output_dir();
    let outputs: Vec<PathBuf> = coordinator
        .reduce_outputs()
        .into_iter()
        .map(|(r, out)| {
            out.map(PathBuf::from)
                .unwrap_or_else(|| reduce_output_file(&output_dir, r))
        })
        .collect();
    let top_n = cfg.top_n;

    let merged =
        tokio::task::spawn_blocking(move || merge_outputs(&outputs, &output_dir, top_n)).await;

    match merged {
        Ok(Ok(summary)) => {
            log_summary(&summary);
            if let Err(e) = coordinator.finish(summary) {
                warn!("no se pudo cerrar el job: {}", e);
            }
        }
        Ok(Err(e)) => coordinator.fail_job("merge", e.to_string()),
        Err(e) => coordinator.fail_job("merge", format!("join error: {e}")),
    }

    let phase = coordinator.phase();
    info!("job {} terminó en {:?}", coordinator.job_id(), phase);
    phase
}

// Un despacho concurrente por tarea, con una pausa entre cada uno. Si el
// job falla a mitad de camino se deja de despachar.
async fn spawn_dispatches<T: TaskRequest>(
    inflight: &mut JoinSet<()>,
    dispatcher: &Dispatcher,
    coordinator: &Arc<Coordinator>,
    assignments: Vec<Assignment<T>>,
    stagger: Duration,
) {
    let total = assignments.len();

    for (i, assignment) in assignments.into_iter().enumerate() {
        if coordinator.phase() == JobPhase::Failed {
            warn!("job fallido; no se despachan las {} tareas restantes", total - i);
            return;
        }

        info!(
            "  {} -> worker {} ({})",
            assignment.request.task_id(),
            assignment.worker_id,
            assignment.address
        );

        let dispatcher = dispatcher.clone();
        let coordinator = coordinator.clone();
        inflight.spawn(async move {
            dispatcher.dispatch(&coordinator, assignment).await;
        });

        if i + 1 < total && !stagger.is_zero() {
            tokio::time::sleep(stagger).await;
        }
    }
}

fn log_summary(summary: &MergeSummary) {
    info!("=== Resultados finales ===");
    info!("Claves únicas: {}", summary.unique_keys);
    info!("Top {}:", summary.top.len());
    for (i, (key, value)) in summary.top.iter().enumerate() {
        info!("  {:>2}. {}: {}", i + 1, key, value);
    }
    info!("Archivo final: {}", summary.final_results.display());
}
