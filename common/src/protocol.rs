//! Mensajes JSON entre master y workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type JobId = String;
pub type TaskId = String;
pub type WorkerId = u32;
pub type ReducerId = u32;

pub const STATUS_REGISTERED: &str = "registered";
pub const STATUS_READY: &str = "ready";
pub const STATUS_ACCEPTED: &str = "accepted";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_ACKNOWLEDGED: &str = "acknowledged";
pub const STATUS_DUPLICATE: &str = "duplicate";
pub const STATUS_IGNORED: &str = "ignored";

pub fn map_task_id(task_num: u32) -> TaskId {
    format!("map-{}", task_num)
}

pub fn reduce_task_id(reducer_id: ReducerId) -> TaskId {
    format!("reduce-{}", reducer_id)
}

/* --------- Registro --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub worker_id: WorkerId,
    /// URL base donde el worker recibe tareas, ej: http://127.0.0.1:5001
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub status: String,
    pub master: String,
}

/* --------- Tareas (master -> worker) --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapTaskRequest {
    pub task_id: TaskId,
    pub input_file: String,
    pub num_reducers: u32,
    pub task_num: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceTaskRequest {
    pub task_id: TaskId,
    pub reducer_id: ReducerId,
    pub input_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResponse {
    /// El worker encoló la tarea; el resultado llega después por
    /// /map_complete, /reduce_complete o /task_failed.
    pub fn accepted() -> Self {
        Self {
            status: STATUS_ACCEPTED.to_string(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: STATUS_FAILED.to_string(),
            error: Some(error.into()),
        }
    }
}

/* --------- Reportes (worker -> master) --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapCompleteRequest {
    pub task_id: TaskId,
    /// reducer -> archivos de partición producidos por esta tarea
    pub intermediate_files: BTreeMap<ReducerId, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceCompleteRequest {
    pub task_id: TaskId,
    pub output_file: String,
}

/// La tarea falló ya aceptada (I/O, parseo, panic en el executor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailedRequest {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub status: String,
}

impl AckResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/* --------- Estado del job --------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Registering,
    MapDispatch,
    MapWait,
    ReduceDispatch,
    ReduceWait,
    Merging,
    Done,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerView {
    pub worker_id: WorkerId,
    pub address: String,
    pub hostname: Option<String>,
    pub status: WorkerStatus,
    pub tasks_assigned: u64,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task_id: TaskId,
    pub worker_id: Option<WorkerId>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub workers: usize,
    /// "completadas/total"
    pub map_progress: String,
    pub reduce_progress: String,

    pub phase: JobPhase,
    pub job_id: JobId,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failures: Vec<TaskFailure>,
    pub worker_list: Vec<WorkerView>,
}
