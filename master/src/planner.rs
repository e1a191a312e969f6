// master/src/planner.rs

use common::{build_plan, decompose, CreatePlanRequest, Plan, PlanReport, TaskReport};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::aggregator::Command;
use crate::error::{OrchestratorError, Result};
use crate::state::AppState;

/// Descompone el objetivo, arma el plan, lo guarda y pide el primer
/// despacho. Las fallas de encolado no hacen fallar la creación.
pub async fn create_plan(state: &AppState, req: CreatePlanRequest) -> Result<Plan> {
    let goal = req.goal.trim();
    if goal.is_empty() {
        return Err(OrchestratorError::Validation(vec![
            "goal: el objetivo no puede estar vacío".to_string(),
        ]));
    }

    let owner_id = req
        .user_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let subgoals = decompose(goal);
    let (mut plan, tasks) = build_plan(goal, &subgoals, &owner_id)?;
    plan.mode = req.mode;
    plan.constraints = req.constraints;

    for task in &tasks {
        state.store.put_task(task).await?;
    }
    state.store.put_plan(&plan).await?;

    info!(
        "plan {} creado ({:?}, {} tareas) para {}",
        plan.id,
        plan.kind,
        tasks.len(),
        plan.owner_id
    );

    let (respond_to, rx) = oneshot::channel();
    state
        .commands
        .send(Command::Dispatch {
            plan_id: plan.id.clone(),
            respond_to,
        })
        .await
        .map_err(|_| OrchestratorError::LoopUnavailable)?;

    match rx.await {
        Ok(Ok(report)) if !report.failures.is_empty() => {
            for failure in &report.failures {
                warn!(
                    "plan {}: tarea {} quedó pendiente: {}",
                    plan.id, failure.task_id, failure.error
                );
            }
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("plan {}: el primer despacho falló: {}", plan.id, e),
        Err(_) => return Err(OrchestratorError::LoopUnavailable),
    }

    get_plan(state, &plan.id).await
}

pub async fn get_plan(state: &AppState, plan_id: &str) -> Result<Plan> {
    state
        .store
        .get_plan(plan_id)
        .await?
        .ok_or_else(|| OrchestratorError::PlanNotFound(plan_id.to_string()))
}

pub async fn list_plans(state: &AppState) -> Result<Vec<Plan>> {
    Ok(state.store.list_plans().await?)
}

/// Plan con el estado, la salida y el último error de cada tarea.
pub async fn plan_report(state: &AppState, plan_id: &str) -> Result<PlanReport> {
    let plan = get_plan(state, plan_id).await?;
    let tasks = state.store.list_tasks(plan_id).await?;

    Ok(PlanReport {
        plan,
        tasks: tasks.iter().map(TaskReport::from).collect(),
    })
}

pub async fn cancel_plan(state: &AppState, plan_id: &str) -> Result<Plan> {
    let (respond_to, rx) = oneshot::channel();
    state
        .commands
        .send(Command::Cancel {
            plan_id: plan_id.to_string(),
            respond_to,
        })
        .await
        .map_err(|_| OrchestratorError::LoopUnavailable)?;

    rx.await.map_err(|_| OrchestratorError::LoopUnavailable)?
}
