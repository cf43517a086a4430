use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    MapCompleteRequest, MapReduceApp, MapTaskRequest, ReduceCompleteRequest, ReduceTaskRequest,
    TaskFailedRequest, TaskResponse,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::executor;
use crate::master_client::MasterClient;

#[derive(Clone)]
pub struct WorkerState {
    pub config: Arc<WorkerConfig>,
    pub app: Arc<dyn MapReduceApp>,
    pub master: MasterClient,
    /// Slots de ejecución (WORKER_CONCURRENCY)
    pub slots: Arc<Semaphore>,
}

impl WorkerState {
    pub fn new(config: WorkerConfig, app: Arc<dyn MapReduceApp>) -> anyhow::Result<Self> {
        let master = MasterClient::new(&config.master_url, config.master_timeout)?;
        let slots = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Ok(Self {
            config: Arc::new(config),
            app,
            master,
            slots,
        })
    }
}

pub fn build_router(state: WorkerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/map", post(accept_map))
        .route("/reduce", post(accept_reduce))
        .with_state(state)
}

/// Cómo terminó una tarea que corrió en segundo plano.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Ejecutada y reportada al master
    Reported,
    /// El executor falló; se avisó al master por /task_failed
    Failed(String),
    /// Ejecutada, pero el reporte al master no llegó
    Unreported(String),
}

type TaskReply = (StatusCode, Json<TaskResponse>);

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Las tareas se aceptan enseguida y corren en segundo plano: el master no
// espera la ejecución, sólo que el worker la reciba.
async fn accept_map(State(state): State<WorkerState>, Json(req): Json<MapTaskRequest>) -> TaskReply {
    if req.num_reducers == 0 {
        warn!("[worker {}] {} rechazada: num_reducers = 0", state.config.worker_id, req.task_id);
        return (
            StatusCode::BAD_REQUEST,
            Json(TaskResponse::failed("num_reducers tiene que ser al menos 1")),
        );
    }

    info!("[worker {}] aceptada {} ({})", state.config.worker_id, req.task_id, req.input_file);
    tokio::spawn(run_map_task(state, req));
    (StatusCode::ACCEPTED, Json(TaskResponse::accepted()))
}

async fn accept_reduce(
    State(state): State<WorkerState>,
    Json(req): Json<ReduceTaskRequest>,
) -> TaskReply {
    info!(
        "[worker {}] aceptada {} ({} archivos)",
        state.config.worker_id,
        req.task_id,
        req.input_files.len()
    );
    tokio::spawn(run_reduce_task(state, req));
    (StatusCode::ACCEPTED, Json(TaskResponse::accepted()))
}

/* ---------------- ejecución en segundo plano ---------------- */

// Corre la función bloqueante en el pool de blocking y aplana el JoinError
async fn run_blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(anyhow::anyhow!("panic o join error: {e}")),
    }
}

async fn report_failure(state: &WorkerState, task_id: &str, reason: String) -> TaskOutcome {
    let worker_id = state.config.worker_id;
    warn!("[worker {}] error en {}: {}", worker_id, task_id, reason);

    let report = TaskFailedRequest {
        task_id: task_id.to_string(),
        worker_id,
        reason: reason.clone(),
    };
    if let Err(e) = state.master.task_failed(&report).await {
        warn!("[worker {}] no se pudo avisar el fallo de {}: {:#}", worker_id, task_id, e);
    }
    TaskOutcome::Failed(reason)
}

pub async fn run_map_task(state: WorkerState, req: MapTaskRequest) -> TaskOutcome {
    let worker_id = state.config.worker_id;

    // el semáforo nunca se cierra
    let Ok(_permit) = state.slots.clone().acquire_owned().await else {
        return report_failure(&state, &req.task_id, "worker cerrando".to_string()).await;
    };

    info!("[worker {}] ejecutando {} ({})", worker_id, req.task_id, req.input_file);

    let app = state.app.clone();
    let dir = state.config.intermediate_dir.clone();
    let task = req.clone();
    let produced = match run_blocking(move || executor::run_map(app.as_ref(), &task, &dir)).await {
        Ok(p) => p,
        Err(e) => return report_failure(&state, &req.task_id, format!("{e:#}")).await,
    };

    let files: usize = produced.values().map(Vec::len).sum();
    info!(
        "[worker {}]   {} -> {} archivos intermedios para {} reducers",
        worker_id,
        req.task_id,
        files,
        produced.len()
    );

    let report = MapCompleteRequest {
        task_id: req.task_id.clone(),
        intermediate_files: produced,
    };
    match state.master.map_complete(&report).await {
        Ok(ack) => {
            info!("[worker {}] {} reportada (status={})", worker_id, req.task_id, ack.status);
            TaskOutcome::Reported
        }
        Err(e) => {
            warn!("[worker {}] no se pudo reportar {}: {:#}", worker_id, req.task_id, e);
            TaskOutcome::Unreported(format!("{e:#}"))
        }
    }
}

pub async fn run_reduce_task(state: WorkerState, req: ReduceTaskRequest) -> TaskOutcome {
    let worker_id = state.config.worker_id;

    let Ok(_permit) = state.slots.clone().acquire_owned().await else {
        return report_failure(&state, &req.task_id, "worker cerrando".to_string()).await;
    };

    info!("[worker {}] ejecutando {}", worker_id, req.task_id);

    let app = state.app.clone();
    let dir = state.config.output_dir.clone();
    let task = req.clone();
    let output_file =
        match run_blocking(move || executor::run_reduce(app.as_ref(), &task, &dir)).await {
            Ok(path) => path,
            Err(e) => return report_failure(&state, &req.task_id, format!("{e:#}")).await,
        };

    let report = ReduceCompleteRequest {
        task_id: req.task_id.clone(),
        output_file,
    };
    match state.master.reduce_complete(&report).await {
        Ok(ack) => {
            info!(
                "[worker {}] {} -> {} (status={})",
                worker_id, req.task_id, report.output_file, ack.status
            );
            TaskOutcome::Reported
        }
        Err(e) => {
            warn!("[worker {}] no se pudo reportar {}: {:#}", worker_id, req.task_id, e);
            TaskOutcome::Unreported(format!("{e:#}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use common::{map_task_id, reduce_task_id, WordCount, STATUS_ACCEPTED, STATUS_FAILED};
    use std::{env, fs, path::PathBuf, time::Duration};
    use tower::ServiceExt;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("worker_handler_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    // master inexistente: el puerto 1 rechaza la conexión enseguida
    fn state_without_master(data_dir: PathBuf) -> WorkerState {
        let cfg = WorkerConfig::new(9, "http://127.0.0.1:1", data_dir);
        WorkerState::new(cfg, Arc::new(WordCount)).unwrap()
    }

    fn map_request(task_num: u32, input: &PathBuf, num_reducers: u32) -> MapTaskRequest {
        MapTaskRequest {
            task_id: map_task_id(task_num),
            input_file: input.to_string_lossy().to_string(),
            num_reducers,
            task_num,
        }
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, TaskResponse) {
        let resp = app
            .oneshot(
                Request::post(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_responde_ok() {
        let app = build_router(state_without_master(temp_dir("health")));
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn map_se_acepta_enseguida_y_corre_en_segundo_plano() {
        let tmp = temp_dir("map_accepted");
        let input = tmp.join("in.txt");
        fs::write(&input, "the cat sat").unwrap();
        let app = build_router(state_without_master(tmp.clone()));

        let body = serde_json::to_value(map_request(4, &input, 1)).unwrap();
        let (status, resp) = post_json(app, "/map", body).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(resp.status, STATUS_ACCEPTED);

        let expected = tmp.join("intermediate").join("map-4-reduce-0.txt");
        for _ in 0..100 {
            if expected.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("no apareció {}", expected.display());
    }

    #[tokio::test]
    async fn map_con_cero_reducers_se_rechaza() {
        let tmp = temp_dir("map_zero");
        let app = build_router(state_without_master(tmp.clone()));

        let body = serde_json::to_value(map_request(0, &tmp.join("in.txt"), 0)).unwrap();
        let (status, resp) = post_json(app, "/map", body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp.status, STATUS_FAILED);
    }

    #[tokio::test]
    async fn map_con_entrada_inexistente_termina_en_failed() {
        let tmp = temp_dir("map_missing");
        let state = state_without_master(tmp.clone());

        let outcome = run_map_task(state, map_request(0, &tmp.join("no_existe.txt"), 2)).await;

        match outcome {
            TaskOutcome::Failed(reason) => assert!(reason.contains("no_existe.txt")),
            other => panic!("esperaba Failed, llegó {:?}", other),
        }
    }

    #[tokio::test]
    async fn map_sin_master_escribe_archivos_pero_no_reporta() {
        let tmp = temp_dir("map_no_master");
        let input = tmp.join("in.txt");
        fs::write(&input, "the cat sat").unwrap();
        let state = state_without_master(tmp.clone());

        let outcome = run_map_task(state, map_request(4, &input, 1)).await;

        assert!(matches!(outcome, TaskOutcome::Unreported(_)));
        assert!(tmp.join("intermediate").join("map-4-reduce-0.txt").exists());
    }

    #[tokio::test]
    async fn reduce_sin_archivos_escribe_salida_vacia() {
        let tmp = temp_dir("reduce_empty");
        let state = state_without_master(tmp.clone());

        let req = ReduceTaskRequest {
            task_id: reduce_task_id(3),
            reducer_id: 3,
            input_files: vec![],
        };
        let outcome = run_reduce_task(state, req).await;

        // el reduce corrió; sólo falló el reporte al master
        assert!(matches!(outcome, TaskOutcome::Unreported(_)));
        let out = tmp.join("output").join("reduce-3.txt");
        assert_eq!(fs::read_to_string(out).unwrap(), "");
    }
}
