use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use common::{
    CreatePlanRequest, JobCompleteRequest, JobCompleteResponse, JobLeaseRequest,
    JobLeaseResponse, Plan, PlanReport, WorkerHeartbeatRequest, WorkerHeartbeatResponse,
    WorkerMetrics, WorkerRegisterRequest, WorkerRegisterResponse,
};
use std::time::SystemTime;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::{OrchestratorError, Result};
use crate::planner;
use crate::pool;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/plans", post(create_plan).get(list_plans))
        .route("/api/v1/plans/:id", get(get_plan))
        .route("/api/v1/plans/:id/results", get(get_plan_results))
        .route("/api/v1/plans/:id/cancel", post(cancel_plan))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/workers/heartbeat", post(worker_heartbeat))
        .route("/api/v1/jobs/lease", post(lease_job))
        .route("/api/v1/jobs/complete", post(complete_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- planes ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<Json<Plan>> {
    Ok(Json(planner::create_plan(&state, req).await?))
}

async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<Plan>>> {
    Ok(Json(planner::list_plans(&state).await?))
}

async fn get_plan(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Plan>> {
    Ok(Json(planner::get_plan(&state, &id).await?))
}

// Estado, salida y último error de cada tarea del plan
async fn get_plan_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlanReport>> {
    Ok(Json(planner::plan_report(&state, &id).await?))
}

async fn cancel_plan(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Plan>> {
    Ok(Json(planner::cancel_plan(&state, &id).await?))
}

/* ---------------- workers ---------------- */

async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerMetrics>> {
    Json(state.worker_metrics())
}

// Registra un worker remoto nuevo
async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Json<WorkerRegisterResponse> {
    let worker_id = uuid::Uuid::new_v4().to_string();
    let max_concurrency = req.max_concurrency.max(1);
    state.register_worker(&worker_id, &req.hostname, max_concurrency, false);

    info!(
        "worker registrado: {} en {} (max_concurrency={})",
        worker_id, req.hostname, max_concurrency
    );
    Json(WorkerRegisterResponse { worker_id })
}

// Heartbeat de worker: además renueva los leases de sus jobs
async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<WorkerHeartbeatRequest>,
) -> Result<Json<WorkerHeartbeatResponse>> {
    let known = state.with_worker(&req.worker_id, |meta| {
        meta.last_heartbeat = SystemTime::now();
        if meta.dead {
            info!("worker {} volvió a dar señales", req.worker_id);
            meta.dead = false;
        }
    });
    if !known {
        return Err(OrchestratorError::WorkerNotFound(req.worker_id));
    }

    let renewed = state
        .queue
        .renew(&req.worker_id, state.config.lease_timeout)
        .await?;
    if renewed > 0 {
        debug!("worker {}: {} leases renovados", req.worker_id, renewed);
    }

    Ok(Json(WorkerHeartbeatResponse { ok: true }))
}

/* ---------------- jobs ---------------- */

// Entrega el próximo job al worker si todavía tiene capacidad
async fn lease_job(
    State(state): State<AppState>,
    Json(req): Json<JobLeaseRequest>,
) -> Result<Json<JobLeaseResponse>> {
    let mut capacity = None;
    state.with_worker(&req.worker_id, |meta| {
        capacity = Some((meta.active_jobs, meta.max_concurrency, meta.dead));
    });
    let Some((active, max, dead)) = capacity else {
        return Err(OrchestratorError::WorkerNotFound(req.worker_id));
    };

    if dead || active >= max {
        debug!(
            "worker {} pidió job pero tiene {}/{} en vuelo (dead={})",
            req.worker_id, active, max, dead
        );
        return Ok(Json(JobLeaseResponse { job: None }));
    }

    let job = pool::claim_next(&state, &req.worker_id).await?;
    if let Some(job) = &job {
        info!(
            "asignando job {} al worker {} ({}/{} en vuelo -> +1)",
            job.key(),
            req.worker_id,
            active,
            max
        );
    }

    Ok(Json(JobLeaseResponse { job }))
}

// Worker reporta el resultado de un job
async fn complete_job(
    State(state): State<AppState>,
    Json(req): Json<JobCompleteRequest>,
) -> Result<Json<JobCompleteResponse>> {
    info!(
        "worker {} terminó job {} (ok={}, {} ms)",
        req.worker_id,
        req.key,
        req.outcome.is_success(),
        req.duration_ms
    );

    pool::report_outcome(&state, &req.worker_id, req.key, req.outcome, req.duration_ms).await?;
    Ok(Json(JobCompleteResponse { ok: true }))
}
