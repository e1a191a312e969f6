// master/src/pool.rs

use common::{run_job, Job, JobKey, JobOutcome, TaskExecutor};
use std::{sync::Arc, time::SystemTime};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::aggregator::{Command, TaskEvent};
use crate::error::{OrchestratorError, Result};
use crate::state::AppState;

/// Toma el próximo job para `consumer`. Los jobs cuya tarea no existe,
/// ya terminó o avanzó a otro intento se confirman y se descartan sin
/// ejecutarse.
pub async fn claim_next(state: &AppState, consumer: &str) -> Result<Option<Job>> {
    loop {
        let Some(job) = state
            .queue
            .lease(consumer, state.config.lease_timeout)
            .await?
        else {
            return Ok(None);
        };

        let task = state.store.get_task(&job.task_id).await?;
        let runnable = match &task {
            Some(task) => !task.status.is_terminal() && job.attempt >= task.retry_count,
            None => false,
        };

        if runnable {
            state.with_worker(consumer, |meta| meta.record_start());
            debug!("{} tomó el job {}", consumer, job.key());
            return Ok(Some(job));
        }

        info!(
            "descartando job {} (tarea {})",
            job.key(),
            task.map(|t| format!("{:?}, intento actual {}", t.status, t.retry_count))
                .unwrap_or_else(|| "inexistente".to_string())
        );
        state.queue.ack(&job.key()).await?;
    }
}

/// Manda el resultado al loop de agregación y después confirma el job.
/// Si el loop no recibe, el job queda tomado y se re-entrega al vencer
/// el lease.
pub async fn report_outcome(
    state: &AppState,
    worker_id: &str,
    key: JobKey,
    outcome: JobOutcome,
    duration_ms: u64,
) -> Result<()> {
    let success = outcome.is_success();

    state
        .commands
        .send(Command::Outcome(TaskEvent {
            key: key.clone(),
            worker_id: worker_id.to_string(),
            outcome,
            duration_ms,
        }))
        .await
        .map_err(|_| OrchestratorError::LoopUnavailable)?;

    if !state.queue.ack(&key).await? {
        debug!("job {} ya no estaba tomado al confirmar", key);
    }
    state.with_worker(worker_id, |meta| meta.record_finish(success, duration_ms));

    Ok(())
}

/// Arranca `count` consumidores dentro del master.
pub fn spawn_local_workers(
    state: &AppState,
    executor: Arc<dyn TaskExecutor>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    (1..=count)
        .map(|i| {
            let worker_id = format!("local-{}", i);
            state.register_worker(&worker_id, "master", 1, true);
            tokio::spawn(run_local_worker(state.clone(), executor.clone(), worker_id))
        })
        .collect()
}

async fn run_local_worker(state: AppState, executor: Arc<dyn TaskExecutor>, worker_id: String) {
    info!("consumidor local {} iniciado", worker_id);

    loop {
        state.with_worker(&worker_id, |meta| meta.last_heartbeat = SystemTime::now());

        match claim_next(&state, &worker_id).await {
            Ok(Some(job)) => {
                let key = job.key();
                info!("{} ejecutando job {}", worker_id, key);

                let (outcome, duration_ms) =
                    run_job(executor.as_ref(), &job, state.config.job_timeout).await;

                match report_outcome(&state, &worker_id, key.clone(), outcome, duration_ms).await {
                    Ok(()) => {}
                    Err(OrchestratorError::LoopUnavailable) => {
                        warn!("{}: loop de agregación cerrado, se detiene", worker_id);
                        return;
                    }
                    Err(e) => warn!("{}: no se pudo reportar {}: {}", worker_id, key, e),
                }
            }
            Ok(None) => sleep(state.config.poll_interval).await,
            Err(e) => {
                warn!("{}: error tomando jobs: {}", worker_id, e);
                sleep(state.config.poll_interval).await;
            }
        }
    }
}
