// master/src/state.rs

use chrono::{DateTime, Utc};
use common::{
    map_task_id, reduce_task_id, JobId, JobPhase, JobResults, MapCompleteRequest,
    MapTaskRequest, ReduceCompleteRequest, ReduceTaskRequest, ReducerId, RegisterRequest,
    StatusResponse, TaskFailure, TaskId, WorkerId, WorkerStatus, WorkerView,
    STATUS_ACKNOWLEDGED, STATUS_DUPLICATE, STATUS_IGNORED,
};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::MasterConfig;
use crate::merge::MergeSummary;
use crate::scheduler::{RoundRobin, Scheduler};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MasterConfig>,
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(config: MasterConfig) -> Self {
        Self::with_scheduler(config, Box::new(RoundRobin))
    }

    pub fn with_scheduler(config: MasterConfig, scheduler: Box<dyn Scheduler>) -> Self {
        let coordinator = Arc::new(Coordinator::new(config.num_reducers, scheduler));
        Self {
            config: Arc::new(config),
            coordinator,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub address: String,
    pub hostname: Option<String>,
    // se actualiza pero el scheduler no lo mira
    pub status: WorkerStatus,
    pub tasks_assigned: u64,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MapTask {
    pub task_num: u32,
    pub task_id: TaskId,
    pub input_file: String,
    pub worker: Option<WorkerId>,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct ReduceTask {
    pub reducer_id: ReducerId,
    pub task_id: TaskId,
    pub worker: Option<WorkerId>,
    /// Copia del manifest congelado, se llena al despachar el reduce
    pub input_files: Vec<String>,
    pub output_file: Option<String>,
    pub completed: bool,
}

/// Tarea lista para mandar a un worker.
#[derive(Debug, Clone)]
pub struct Assignment<T> {
    pub worker_id: WorkerId,
    pub address: String,
    pub request: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Progreso registrado, todavía faltan tareas de la fase
    Recorded { done: usize, total: usize },
    /// Última tarea de la fase. Se devuelve una sola vez por fase.
    PhaseComplete,
    Duplicate,
    /// El job ya falló; el reporte no cambia nada
    Ignored,
}

impl Completion {
    pub fn ack_status(&self) -> &'static str {
        match self {
            Completion::Recorded { .. } | Completion::PhaseComplete => STATUS_ACKNOWLEDGED,
            Completion::Duplicate => STATUS_DUPLICATE,
            Completion::Ignored => STATUS_IGNORED,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("tarea desconocida: {0}")]
    UnknownTask(TaskId),
    #[error("reducer {reducer} fuera de rango [0, {num_reducers})")]
    ReducerOutOfRange { reducer: ReducerId, num_reducers: u32 },
    #[error("operación inválida en fase {0:?}")]
    InvalidPhase(JobPhase),
    #[error("no hay workers registrados")]
    NoWorkers,
}

struct JobState {
    job_id: JobId,
    phase: JobPhase,
    num_reducers: u32,
    workers: Vec<WorkerRecord>,
    map_tasks: Vec<MapTask>,
    reduce_tasks: Vec<ReduceTask>,
    /// reducer -> archivos de partición; sólo crece durante la fase map
    manifest: BTreeMap<ReducerId, Vec<String>>,
    completed_maps: usize,
    completed_reduces: usize,
    reduce_dispatched: bool,
    failures: Vec<TaskFailure>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    summary: Option<MergeSummary>,
}

impl JobState {
    fn new(num_reducers: u32) -> Self {
        let reduce_tasks = (0..num_reducers)
            .map(|r| ReduceTask {
                reducer_id: r,
                task_id: reduce_task_id(r),
                worker: None,
                input_files: Vec::new(),
                output_file: None,
                completed: false,
            })
            .collect();

        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            phase: JobPhase::Registering,
            num_reducers,
            workers: Vec::new(),
            map_tasks: Vec::new(),
            reduce_tasks,
            manifest: BTreeMap::new(),
            completed_maps: 0,
            completed_reduces: 0,
            reduce_dispatched: false,
            failures: Vec::new(),
            started_at: None,
            finished_at: None,
            summary: None,
        }
    }

    // Busy mientras tenga alguna tarea asignada sin completar
    fn refresh_worker_status(&mut self, worker_id: Option<WorkerId>) {
        let Some(id) = worker_id else {
            return;
        };
        let busy = self
            .map_tasks
            .iter()
            .any(|t| t.worker == Some(id) && !t.completed)
            || self
                .reduce_tasks
                .iter()
                .any(|t| t.worker == Some(id) && !t.completed);

        if let Some(w) = self.workers.iter_mut().find(|w| w.id == id) {
            w.status = if busy {
                WorkerStatus::Busy
            } else {
                WorkerStatus::Idle
            };
        }
    }

    fn task_completed(&self, task_id: &str) -> Option<bool> {
        self.map_tasks
            .iter()
            .find(|t| t.task_id == task_id)
            .map(|t| t.completed)
            .or_else(|| {
                self.reduce_tasks
                    .iter()
                    .find(|t| t.task_id == task_id)
                    .map(|t| t.completed)
            })
    }

    fn fail(&mut self, failure: TaskFailure) {
        self.failures.push(failure);
        if self.phase != JobPhase::Failed {
            self.phase = JobPhase::Failed;
            self.finished_at = Some(Utc::now());
        }
    }
}

/// Estado compartido del job.
///
/// Toda mutación pasa por un único mutex: incrementar el contador, tocar
/// el manifest y chequear la transición de fase ocurren juntos, así dos
/// reportes simultáneos no pueden disparar la misma transición dos veces.
/// Cada cambio despierta al loop de control vía `progress`.
pub struct Coordinator {
    state: Mutex<JobState>,
    scheduler: Box<dyn Scheduler>,
    progress: Notify,
}

impl Coordinator {
    pub fn new(num_reducers: u32, scheduler: Box<dyn Scheduler>) -> Self {
        Self {
            state: Mutex::new(JobState::new(num_reducers.max(1))),
            scheduler,
            progress: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pick_worker(&self, task_index: usize, workers: &[WorkerRecord]) -> Result<usize, CoordinatorError> {
        self.scheduler
            .next_worker_for(task_index, workers)
            .filter(|&idx| idx < workers.len())
            .ok_or(CoordinatorError::NoWorkers)
    }

    pub fn job_id(&self) -> JobId {
        self.lock().job_id.clone()
    }

    pub fn phase(&self) -> JobPhase {
        self.lock().phase
    }

    pub fn worker_count(&self) -> usize {
        self.lock().workers.len()
    }

    /// Registra un worker (o actualiza su dirección si el id ya existía).
    /// Devuelve cuántos workers hay registrados.
    pub fn register(&self, req: RegisterRequest) -> usize {
        let count = {
            let mut st = self.lock();

            if let Some(existing) = st.workers.iter_mut().find(|w| w.id == req.worker_id) {
                warn!(
                    "worker {} se registró de nuevo: {} -> {}",
                    req.worker_id, existing.address, req.address
                );
                existing.address = req.address;
                if req.hostname.is_some() {
                    existing.hostname = req.hostname;
                }
            } else {
                info!("✓ worker {} registrado en {}", req.worker_id, req.address);
                st.workers.push(WorkerRecord {
                    id: req.worker_id,
                    address: req.address,
                    hostname: req.hostname,
                    status: WorkerStatus::Idle,
                    tasks_assigned: 0,
                    registered_at: Utc::now(),
                });
            }

            st.workers.len()
        };

        self.progress.notify_one();
        count
    }

    /// REGISTERING -> MAP_DISPATCH: crea una MapTask por entrada y las
    /// reparte con el scheduler. Sin entradas el job pasa directo a
    /// REDUCE_DISPATCH.
    pub fn begin_map_phase(
        &self,
        inputs: Vec<String>,
    ) -> Result<Vec<Assignment<MapTaskRequest>>, CoordinatorError> {
        let mut guard = self.lock();
        let st = &mut *guard;

        if st.phase != JobPhase::Registering {
            return Err(CoordinatorError::InvalidPhase(st.phase));
        }

        // primero elegimos todos los workers, después mutamos
        let picks = (0..inputs.len())
            .map(|i| self.pick_worker(i, &st.workers))
            .collect::<Result<Vec<usize>, _>>()?;
        if st.workers.is_empty() {
            return Err(CoordinatorError::NoWorkers);
        }

        st.started_at = Some(Utc::now());
        info!("=== Fase MAP con {} tareas (job {}) ===", inputs.len(), st.job_id);

        let mut assignments = Vec::with_capacity(inputs.len());
        for (i, (input_file, pick)) in inputs.into_iter().zip(picks).enumerate() {
            let task_num = i as u32;
            let task_id = map_task_id(task_num);

            let worker = &mut st.workers[pick];
            worker.status = WorkerStatus::Busy;
            worker.tasks_assigned += 1;

            st.map_tasks.push(MapTask {
                task_num,
                task_id: task_id.clone(),
                input_file: input_file.clone(),
                worker: Some(worker.id),
                completed: false,
            });

            assignments.push(Assignment {
                worker_id: worker.id,
                address: worker.address.clone(),
                request: MapTaskRequest {
                    task_id,
                    input_file,
                    num_reducers: st.num_reducers,
                    task_num,
                },
            });
        }

        st.phase = if st.map_tasks.is_empty() {
            info!("sin tareas MAP; pasando directo a REDUCE");
            JobPhase::ReduceDispatch
        } else {
            JobPhase::MapDispatch
        };

        drop(guard);
        self.progress.notify_one();
        Ok(assignments)
    }

    /// Marca el fin del despacho: MAP_DISPATCH -> MAP_WAIT o
    /// REDUCE_DISPATCH -> REDUCE_WAIT. No hace nada si la fase ya avanzó.
    pub fn dispatch_finished(&self, from: JobPhase) {
        let next = match from {
            JobPhase::MapDispatch => JobPhase::MapWait,
            JobPhase::ReduceDispatch => JobPhase::ReduceWait,
            _ => return,
        };

        let mut st = self.lock();
        let reduce_ready = from != JobPhase::ReduceDispatch || st.reduce_dispatched;
        if st.phase == from && reduce_ready {
            st.phase = next;
            debug!("fase {:?} -> {:?}", from, next);
        }
    }

    pub fn record_map_complete(
        &self,
        req: MapCompleteRequest,
    ) -> Result<Completion, CoordinatorError> {
        let mut guard = self.lock();
        let st = &mut *guard;

        let idx = st
            .map_tasks
            .iter()
            .position(|t| t.task_id == req.task_id)
            .ok_or_else(|| CoordinatorError::UnknownTask(req.task_id.clone()))?;

        if st.map_tasks[idx].completed {
            warn!("reporte duplicado de {}, se ignora", req.task_id);
            return Ok(Completion::Duplicate);
        }
        if st.phase == JobPhase::Failed {
            return Ok(Completion::Ignored);
        }
        if !matches!(st.phase, JobPhase::MapDispatch | JobPhase::MapWait) {
            return Err(CoordinatorError::InvalidPhase(st.phase));
        }
        if let Some(&reducer) = req
            .intermediate_files
            .keys()
            .find(|&&r| r >= st.num_reducers)
        {
            return Err(CoordinatorError::ReducerOutOfRange {
                reducer,
                num_reducers: st.num_reducers,
            });
        }

        for (reducer, files) in req.intermediate_files {
            st.manifest.entry(reducer).or_default().extend(files);
        }

        let task = &mut st.map_tasks[idx];
        task.completed = true;
        let worker = task.worker;
        st.completed_maps += 1;
        st.refresh_worker_status(worker);

        let done = st.completed_maps;
        let total = st.map_tasks.len();
        info!("✓ tarea MAP {} completa ({}/{})", req.task_id, done, total);

        let outcome = if done == total {
            st.phase = JobPhase::ReduceDispatch;
            info!("=== Todas las tareas MAP completas; arrancando REDUCE ===");
            Completion::PhaseComplete
        } else {
            Completion::Recorded { done, total }
        };

        drop(guard);
        self.progress.notify_one();
        Ok(outcome)
    }

    /// REDUCE_DISPATCH: arma una tarea por reducer con la lista de archivos
    /// del manifest, que a esta altura ya no cambia. Sólo se puede llamar una
    /// vez y sólo con todas las tareas map completas.
    pub fn begin_reduce_phase(
        &self,
    ) -> Result<Vec<Assignment<ReduceTaskRequest>>, CoordinatorError> {
        let mut guard = self.lock();
        let st = &mut *guard;

        if st.phase != JobPhase::ReduceDispatch || st.reduce_dispatched {
            return Err(CoordinatorError::InvalidPhase(st.phase));
        }
        debug_assert!(st.map_tasks.iter().all(|t| t.completed));

        let picks = (0..st.num_reducers as usize)
            .map(|i| self.pick_worker(i, &st.workers))
            .collect::<Result<Vec<usize>, _>>()?;

        st.reduce_dispatched = true;
        info!("Fase REDUCE con {} reducers", st.num_reducers);

        let mut assignments = Vec::with_capacity(picks.len());
        for (task, pick) in st.reduce_tasks.iter_mut().zip(picks) {
            let worker = &mut st.workers[pick];
            worker.status = WorkerStatus::Busy;
            worker.tasks_assigned += 1;

            task.input_files = st.manifest.get(&task.reducer_id).cloned().unwrap_or_default();
            task.worker = Some(worker.id);

            assignments.push(Assignment {
                worker_id: worker.id,
                address: worker.address.clone(),
                request: ReduceTaskRequest {
                    task_id: task.task_id.clone(),
                    reducer_id: task.reducer_id,
                    input_files: task.input_files.clone(),
                },
            });
        }

        drop(guard);
        self.progress.notify_one();
        Ok(assignments)
    }

    pub fn record_reduce_complete(
        &self,
        req: ReduceCompleteRequest,
    ) -> Result<Completion, CoordinatorError> {
        let mut guard = self.lock();
        let st = &mut *guard;

        let idx = st
            .reduce_tasks
            .iter()
            .position(|t| t.task_id == req.task_id)
            .ok_or_else(|| CoordinatorError::UnknownTask(req.task_id.clone()))?;

        if st.reduce_tasks[idx].completed {
            warn!("reporte duplicado de {}, se ignora", req.task_id);
            return Ok(Completion::Duplicate);
        }
        if st.phase == JobPhase::Failed {
            return Ok(Completion::Ignored);
        }
        if !st.reduce_dispatched
            || !matches!(st.phase, JobPhase::ReduceDispatch | JobPhase::ReduceWait)
        {
            return Err(CoordinatorError::InvalidPhase(st.phase));
        }

        let task = &mut st.reduce_tasks[idx];
        task.completed = true;
        task.output_file = Some(req.output_file.clone());
        let worker = task.worker;
        st.completed_reduces += 1;
        st.refresh_worker_status(worker);

        let done = st.completed_reduces;
        let total = st.reduce_tasks.len();
        info!(
            "✓ tarea REDUCE {} completa -> {} ({}/{})",
            req.task_id, req.output_file, done, total
        );

        let outcome = if done == total {
            st.phase = JobPhase::Merging;
            info!("=== Todas las tareas REDUCE completas ===");
            Completion::PhaseComplete
        } else {
            Completion::Recorded { done, total }
        };

        drop(guard);
        self.progress.notify_one();
        Ok(outcome)
    }

    /// Un despacho falló o venció su timeout: sin reintentos, el job pasa a
    /// FAILED. Devuelve `true` si este fallo fue el que marcó el job.
    pub fn record_failure(&self, task_id: &str, worker_id: Option<WorkerId>, reason: String) -> bool {
        let failed_now = {
            let mut st = self.lock();

            match st.task_completed(task_id) {
                None => {
                    warn!("fallo reportado para tarea desconocida {}", task_id);
                    return false;
                }
                Some(true) => {
                    debug!("tarea {} ya estaba completa, se ignora el fallo: {}", task_id, reason);
                    return false;
                }
                Some(false) => {}
            }
            if st.phase == JobPhase::Done {
                return false;
            }

            let first = st.phase != JobPhase::Failed;
            st.fail(TaskFailure {
                task_id: task_id.to_string(),
                worker_id,
                reason: reason.clone(),
            });
            if first {
                error!("job {} FALLIDO: tarea {} -> {}", st.job_id, task_id, reason);
            }
            first
        };

        self.progress.notify_one();
        failed_now
    }

    /// Falla el job por algo que no es una tarea (ej: el merge).
    pub fn fail_job(&self, stage: &str, reason: String) {
        {
            let mut st = self.lock();
            if st.phase.is_terminal() {
                return;
            }
            error!("job {} FALLIDO en {}: {}", st.job_id, stage, reason);
            st.fail(TaskFailure {
                task_id: stage.to_string(),
                worker_id: None,
                reason,
            });
        }
        self.progress.notify_one();
    }

    /// Salidas reportadas por cada reducer, en orden de reducer.
    pub fn reduce_outputs(&self) -> Vec<(ReducerId, Option<String>)> {
        self.lock()
            .reduce_tasks
            .iter()
            .map(|t| (t.reducer_id, t.output_file.clone()))
            .collect()
    }

    /// MERGING -> DONE
    pub fn finish(&self, summary: MergeSummary) -> Result<(), CoordinatorError> {
        {
            let mut st = self.lock();
            if st.phase != JobPhase::Merging {
                return Err(CoordinatorError::InvalidPhase(st.phase));
            }
            st.phase = JobPhase::Done;
            st.finished_at = Some(Utc::now());
            st.summary = Some(summary);
        }
        self.progress.notify_one();
        Ok(())
    }

    pub fn status(&self) -> StatusResponse {
        let st = self.lock();

        StatusResponse {
            workers: st.workers.len(),
            map_progress: format!("{}/{}", st.completed_maps, st.map_tasks.len()),
            reduce_progress: format!("{}/{}", st.completed_reduces, st.num_reducers),
            phase: st.phase,
            job_id: st.job_id.clone(),
            started_at: st.started_at,
            finished_at: st.finished_at,
            failures: st.failures.clone(),
            worker_list: st
                .workers
                .iter()
                .map(|w| WorkerView {
                    worker_id: w.id,
                    address: w.address.clone(),
                    hostname: w.hostname.clone(),
                    status: w.status,
                    tasks_assigned: w.tasks_assigned,
                    registered_at: w.registered_at,
                })
                .collect(),
        }
    }

    pub fn results(&self) -> Option<JobResults> {
        let st = self.lock();
        let summary = st.summary.as_ref()?;

        Some(JobResults {
            job_id: st.job_id.clone(),
            final_results: summary.final_results.to_string_lossy().to_string(),
            unique_keys: summary.unique_keys,
            top: summary.top.iter().cloned().map(Into::into).collect(),
        })
    }

    async fn wait_until<F>(&self, ready: F)
    where
        F: Fn(&JobState) -> bool,
    {
        loop {
            let done = {
                let st = self.lock();
                ready(&st)
            };
            if done {
                return;
            }
            // notify_one guarda el permiso si nadie espera: no se pierden avisos
            self.progress.notified().await;
        }
    }

    pub async fn wait_for_workers(&self, min: usize) -> usize {
        self.wait_until(|st| st.workers.len() >= min).await;
        self.worker_count()
    }

    /// Espera hasta que la fase sea alguna de `targets` (o FAILED).
    pub async fn wait_for_phase(&self, targets: &[JobPhase]) -> JobPhase {
        self.wait_until(|st| st.phase == JobPhase::Failed || targets.contains(&st.phase))
            .await;
        self.phase()
    }
}
