// master/src/dispatch.rs

use anyhow::{Context, Result};
use common::{MapTaskRequest, ReduceTaskRequest, TaskResponse, STATUS_ACCEPTED};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::state::{Assignment, Coordinator};

/// Tarea que se puede mandar a un worker.
pub trait TaskRequest: Serialize + Send + Sync + 'static {
    const ROUTE: &'static str;

    fn task_id(&self) -> &str;
}

impl TaskRequest for MapTaskRequest {
    const ROUTE: &'static str = "/map";

    fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl TaskRequest for ReduceTaskRequest {
    const ROUTE: &'static str = "/reduce";

    fn task_id(&self) -> &str {
        &self.task_id
    }
}

/// Cliente HTTP para mandar tareas. El worker responde `accepted` apenas
/// recibe la tarea, así que el timeout sólo cubre la entrega, no la
/// ejecución ni el tiempo en cola detrás de otras tareas.
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("no se pudo crear el cliente HTTP de despacho")?;
        Ok(Self { client })
    }

    async fn send<T: TaskRequest>(&self, assignment: &Assignment<T>) -> Result<TaskResponse> {
        let url = format!("{}{}", assignment.address.trim_end_matches('/'), T::ROUTE);

        let resp = self
            .client
            .post(&url)
            .json(&assignment.request)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let code = resp.status();
        let body = resp
            .json::<TaskResponse>()
            .await
            .with_context(|| format!("POST {url} respondió {code} con un cuerpo inválido"))?;

        if code.is_success() {
            Ok(body)
        } else {
            Ok(TaskResponse::failed(
                body.error.unwrap_or_else(|| format!("HTTP {code}")),
            ))
        }
    }

    /// Entrega la tarea al worker. Si no la acepta (error de red, timeout,
    /// status de error) la tarea queda fallida en el coordinador. El
    /// resultado llega después por /map_complete, /reduce_complete o
    /// /task_failed.
    pub async fn dispatch<T: TaskRequest>(&self, coordinator: &Coordinator, assignment: Assignment<T>) {
        let task_id = assignment.request.task_id();

        let reason = match self.send(&assignment).await {
            Ok(resp) if resp.status == STATUS_ACCEPTED => {
                debug!("{} aceptada por worker {}", task_id, assignment.worker_id);
                return;
            }
            Ok(resp) => resp.error.unwrap_or(resp.status),
            Err(e) => format!("{e:#}"),
        };

        warn!(
            "despacho de {} a worker {} ({}) falló: {}",
            task_id, assignment.worker_id, assignment.address, reason
        );
        coordinator.record_failure(task_id, Some(assignment.worker_id), reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterConfig;
    use crate::handlers::build_router;
    use crate::scheduler::RoundRobin;
    use crate::state::AppState;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use common::{JobPhase, RegisterRequest, STATUS_IGNORED};
    use std::env;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    fn register(coordinator: &Coordinator, address: String) {
        coordinator.register(RegisterRequest {
            worker_id: 0,
            address,
            hostname: None,
        });
    }

    // Acepta conexiones y nunca contesta
    async fn silent_worker() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn worker_inalcanzable_falla_el_job() {
        let coordinator = Coordinator::new(1, Box::new(RoundRobin));
        register(&coordinator, "http://127.0.0.1:1".to_string());
        let mut assignments = coordinator
            .begin_map_phase(vec!["chunk-0.txt".to_string()])
            .unwrap();

        let dispatcher = Dispatcher::new(Duration::from_secs(5)).unwrap();
        dispatcher.dispatch(&coordinator, assignments.remove(0)).await;

        let status = coordinator.status();
        assert_eq!(status.phase, JobPhase::Failed);
        assert_eq!(status.failures[0].task_id, "map-0");
        assert_eq!(status.failures[0].worker_id, Some(0));
    }

    #[tokio::test]
    async fn worker_que_no_contesta_vence_el_timeout() {
        let dir = env::temp_dir().join("mapreduce-master-dispatch");
        let state = AppState::new(MasterConfig::new(dir, 1, 1));
        register(&state.coordinator, silent_worker().await);
        let mut assignments = state
            .coordinator
            .begin_map_phase(vec!["chunk-0.txt".to_string()])
            .unwrap();

        let dispatcher = Dispatcher::new(Duration::from_millis(200)).unwrap();
        tokio::time::timeout(
            Duration::from_secs(10),
            dispatcher.dispatch(&state.coordinator, assignments.remove(0)),
        )
        .await
        .unwrap();

        let status = state.coordinator.status();
        assert_eq!(status.phase, JobPhase::Failed);
        assert_eq!(status.failures.len(), 1);
        assert_eq!(status.failures[0].task_id, "map-0");

        // el reporte que llega tarde no revive el job
        let resp = build_router(state.clone())
            .oneshot(
                Request::post("/map_complete")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"task_id":"map-0","intermediate_files":{"0":["map-0-reduce-0.txt"]}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let ack: common::AckResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(ack.status, STATUS_IGNORED);
        assert_eq!(state.coordinator.status().map_progress, "0/1");
    }
}
