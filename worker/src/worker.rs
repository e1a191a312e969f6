use anyhow::{Context, Result};
use common::{
    run_job, Job, JobCompleteRequest, JobLeaseRequest, JobLeaseResponse, TaskExecutor,
    WorkerHeartbeatRequest, WorkerId, WorkerRegisterRequest, WorkerRegisterResponse,
};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::executor::SimulatedExecutor;

/// Loop principal del worker.
/// - Se registra en el master.
/// - Hace heartbeats periódicos (que además renuevan sus leases).
/// - Pide jobs mientras tenga "slots" libres.
/// - Ejecuta cada job en paralelo (hasta WORKER_CONCURRENCY).
pub async fn run(config: WorkerConfig) -> Result<()> {
    let client = Client::new();
    let config = Arc::new(config);

    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let WorkerRegisterResponse { worker_id } = client
        .post(config.url("/api/v1/workers/register"))
        .json(&WorkerRegisterRequest {
            hostname,
            max_concurrency: config.concurrency,
        })
        .send()
        .await
        .context("no se pudo contactar al master para registrarse")?
        .error_for_status()?
        .json()
        .await?;

    info!(
        "worker {} registrado con concurrency={} contra {}",
        worker_id, config.concurrency, config.master_base_url
    );

    tokio::spawn(heartbeat_loop(
        client.clone(),
        config.clone(),
        worker_id.clone(),
    ));

    let executor: Arc<dyn TaskExecutor> = Arc::new(SimulatedExecutor::new(config.simulated_work));
    let sem = Arc::new(Semaphore::new(config.concurrency as usize));

    loop {
        // --------- Control de concurrencia local ---------
        let permit = match sem.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                // sin capacidad para jobs nuevos; esperamos un poco
                sleep(config.poll_interval).await;
                continue;
            }
        };

        let job = match lease(&client, &config, &worker_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!("error pidiendo job al master: {:#}", e);
                drop(permit);
                sleep(config.poll_interval).await;
                continue;
            }
        };

        let Some(job) = job else {
            // no hay job: devolvemos el permiso y dormimos
            drop(permit);
            debug!("worker {} pidió job pero no hay", worker_id);
            sleep(config.poll_interval).await;
            continue;
        };

        info!(
            "tengo job {} ({}, intento {})",
            job.key(),
            job.kind.as_str(),
            job.attempt
        );

        let client = client.clone();
        let config = config.clone();
        let executor = executor.clone();
        let worker_id = worker_id.clone();

        tokio::spawn(async move {
            let (outcome, duration_ms) = run_job(executor.as_ref(), &job, config.job_timeout).await;
            if outcome.is_success() {
                info!("terminé job {} en {} ms", job.key(), duration_ms);
            } else {
                warn!("job {} falló: {:?}", job.key(), outcome);
            }

            let report = JobCompleteRequest {
                worker_id,
                key: job.key(),
                outcome,
                duration_ms,
            };
            if let Err(e) = complete(&client, &config, &report).await {
                // sin ack el master re-entrega el job cuando vence el lease
                warn!("no se pudo reportar el job {}: {:#}", report.key, e);
            }

            // liberar el "slot" de concurrencia al terminar
            drop(permit);
        });
    }
}

async fn lease(client: &Client, config: &WorkerConfig, worker_id: &str) -> Result<Option<Job>> {
    let resp: JobLeaseResponse = client
        .post(config.url("/api/v1/jobs/lease"))
        .json(&JobLeaseRequest {
            worker_id: worker_id.to_string(),
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(resp.job)
}

async fn complete(client: &Client, config: &WorkerConfig, report: &JobCompleteRequest) -> Result<()> {
    client
        .post(config.url("/api/v1/jobs/complete"))
        .json(report)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

async fn heartbeat_loop(client: Client, config: Arc<WorkerConfig>, worker_id: WorkerId) {
    loop {
        sleep(config.heartbeat_interval).await;

        let res = client
            .post(config.url("/api/v1/workers/heartbeat"))
            .json(&WorkerHeartbeatRequest {
                worker_id: worker_id.clone(),
            })
            .send()
            .await;

        match res {
            Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                warn!("el master no conoce al worker {} (¿se reinició?)", worker_id)
            }
            Ok(resp) if !resp.status().is_success() => {
                warn!("heartbeat rechazado: {}", resp.status())
            }
            Ok(_) => debug!("heartbeat ok"),
            Err(e) => warn!("error enviando heartbeat: {}", e),
        }
    }
}
