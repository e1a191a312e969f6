// master/src/state.rs

use common::{WorkerId, WorkerMetrics};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::SystemTime,
};
use tokio::sync::mpsc;

use crate::aggregator::Command;
use crate::config::Config;
use crate::queue::JobQueue;
use crate::store::PlanStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PlanStore>,
    pub queue: Arc<dyn JobQueue>,
    // canal hacia el loop de agregación (único que escribe planes y tareas)
    pub commands: mpsc::Sender<Command>,
    pub workers: Arc<Mutex<HashMap<WorkerId, WorkerMeta>>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PlanStore>,
        queue: Arc<dyn JobQueue>,
        commands: mpsc::Sender<Command>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            queue,
            commands,
            workers: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Alta de un worker (remoto o consumidor local)
    pub fn register_worker(&self, worker_id: &str, hostname: &str, max_concurrency: u32, local: bool) {
        if let Ok(mut workers) = self.workers.lock() {
            workers.insert(
                worker_id.to_string(),
                WorkerMeta::new(hostname.to_string(), max_concurrency, local),
            );
        }
    }

    /// Aplica `f` a la metadata del worker, si existe.
    pub fn with_worker<F>(&self, worker_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut WorkerMeta),
    {
        match self.workers.lock() {
            Ok(mut workers) => match workers.get_mut(worker_id) {
                Some(meta) => {
                    f(meta);
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn worker_metrics(&self) -> Vec<WorkerMetrics> {
        let now = SystemTime::now();
        let Ok(workers) = self.workers.lock() else {
            return Vec::new();
        };

        let mut out: Vec<WorkerMetrics> = workers
            .iter()
            .map(|(wid, meta)| meta.metrics(wid, now))
            .collect();
        out.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        out
    }
}

#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub hostname: String,
    pub local: bool,
    pub last_heartbeat: SystemTime,
    pub dead: bool,
    pub max_concurrency: u32,

    // Métricas
    pub active_jobs: u32,
    pub jobs_started: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub total_job_time_ms: u64,
}

impl WorkerMeta {
    pub fn new(hostname: String, max_concurrency: u32, local: bool) -> Self {
        Self {
            hostname,
            local,
            last_heartbeat: SystemTime::now(),
            dead: false,
            max_concurrency,
            active_jobs: 0,
            jobs_started: 0,
            jobs_succeeded: 0,
            jobs_failed: 0,
            total_job_time_ms: 0,
        }
    }

    pub fn record_start(&mut self) {
        self.active_jobs += 1;
        self.jobs_started += 1;
    }

    pub fn record_finish(&mut self, success: bool, duration_ms: u64) {
        self.active_jobs = self.active_jobs.saturating_sub(1);
        self.total_job_time_ms += duration_ms;
        if success {
            self.jobs_succeeded += 1;
        } else {
            self.jobs_failed += 1;
        }
    }

    fn metrics(&self, worker_id: &str, now: SystemTime) -> WorkerMetrics {
        let finished = self.jobs_succeeded + self.jobs_failed;
        WorkerMetrics {
            worker_id: worker_id.to_string(),
            hostname: self.hostname.clone(),
            local: self.local,
            dead: self.dead,
            max_concurrency: self.max_concurrency,
            last_heartbeat_secs_ago: now
                .duration_since(self.last_heartbeat)
                .unwrap_or_default()
                .as_secs(),
            active_jobs: self.active_jobs,
            jobs_started: self.jobs_started,
            jobs_succeeded: self.jobs_succeeded,
            jobs_failed: self.jobs_failed,
            avg_job_ms: if finished > 0 {
                Some(self.total_job_time_ms as f64 / finished as f64)
            } else {
                None
            },
        }
    }
}
