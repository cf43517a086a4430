// master/src/handlers.rs

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use common::{
    AckResponse, JobResults, MapCompleteRequest, ReduceCompleteRequest, RegisterRequest,
    RegisterResponse, StatusResponse, TaskFailedRequest, STATUS_ACKNOWLEDGED, STATUS_IGNORED,
    STATUS_READY, STATUS_REGISTERED,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::state::{AppState, Completion, CoordinatorError};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/register", post(register))
        .route("/map_complete", post(map_complete))
        .route("/reduce_complete", post(reduce_complete))
        .route("/task_failed", post(task_failed))
        .route("/status", get(status))
        .route("/results", get(results))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type Rejection = (StatusCode, String);

fn reject(route: &str, e: CoordinatorError) -> Rejection {
    let code = match e {
        CoordinatorError::UnknownTask(_) => StatusCode::NOT_FOUND,
        CoordinatorError::ReducerOutOfRange { .. } => StatusCode::BAD_REQUEST,
        CoordinatorError::InvalidPhase(_) => StatusCode::CONFLICT,
        CoordinatorError::NoWorkers => StatusCode::SERVICE_UNAVAILABLE,
    };
    warn!("{} rechazado ({}): {}", route, code, e);
    (code, e.to_string())
}

fn ack(completion: Completion) -> Json<AckResponse> {
    Json(AckResponse::new(completion.ack_status()))
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Json<RegisterResponse> {
    let total = state.coordinator.register(req);
    debug!("{}/{} workers registrados", total, state.config.min_workers);

    Json(RegisterResponse {
        status: STATUS_REGISTERED.to_string(),
        master: STATUS_READY.to_string(),
    })
}

async fn map_complete(
    State(state): State<AppState>,
    Json(req): Json<MapCompleteRequest>,
) -> Result<Json<AckResponse>, Rejection> {
    state
        .coordinator
        .record_map_complete(req)
        .map(ack)
        .map_err(|e| reject("/map_complete", e))
}

async fn reduce_complete(
    State(state): State<AppState>,
    Json(req): Json<ReduceCompleteRequest>,
) -> Result<Json<AckResponse>, Rejection> {
    state
        .coordinator
        .record_reduce_complete(req)
        .map(ack)
        .map_err(|e| reject("/reduce_complete", e))
}

// Un worker aceptó la tarea y después falló al ejecutarla
async fn task_failed(
    State(state): State<AppState>,
    Json(req): Json<TaskFailedRequest>,
) -> Json<AckResponse> {
    let failed_now = state
        .coordinator
        .record_failure(&req.task_id, Some(req.worker_id), req.reason);

    Json(AckResponse::new(if failed_now {
        STATUS_ACKNOWLEDGED
    } else {
        STATUS_IGNORED
    }))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.coordinator.status())
}

// 404 hasta que el job llegue a DONE
async fn results(State(state): State<AppState>) -> Result<Json<JobResults>, StatusCode> {
    state
        .coordinator
        .results()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
