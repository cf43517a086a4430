use crate::state::WorkerRecord;

/// Estrategia de asignación: qué worker recibe la tarea `task_index`.
///
/// Devuelve una posición dentro de `workers`, o `None` si no hay a quién
/// asignarle.
pub trait Scheduler: Send + Sync {
    fn next_worker_for(&self, task_index: usize, workers: &[WorkerRecord]) -> Option<usize>;
}

/// Round-robin puro: `task_index % workers.len()`. No mira carga ni estado.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl Scheduler for RoundRobin {
    fn next_worker_for(&self, task_index: usize, workers: &[WorkerRecord]) -> Option<usize> {
        if workers.is_empty() {
            None
        } else {
            Some(task_index % workers.len())
        }
    }
}
