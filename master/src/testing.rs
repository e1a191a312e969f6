//! Dobles de prueba compartidos por los tests del master.

use async_trait::async_trait;
use common::{
    build_plan, decompose, ExecutionError, Job, JobKey, Plan, Task, TaskExecutor, TaskInput,
    TaskKind, TaskOutput,
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, timeout},
};

use crate::aggregator::{self, Command};
use crate::config::Config;
use crate::queue::{JobQueue, MemoryQueue, QueueError, QueueStats};
use crate::state::AppState;
use crate::store::{MemoryStore, PlanStore};

/// Config con tiempos chicos para que los tests no esperen de más.
pub fn test_config() -> Config {
    Config {
        local_workers: 0,
        job_timeout: Duration::from_secs(2),
        retry_base_delay: Duration::from_millis(10),
        poll_interval: Duration::from_millis(5),
        ..Config::default()
    }
}

pub fn plan_de(goal: &str) -> (Plan, Vec<Task>) {
    build_plan(goal, &decompose(goal), "u1").unwrap()
}

pub async fn guardar(store: &dyn PlanStore, plan: &Plan, tasks: &[Task]) {
    store.put_plan(plan).await.unwrap();
    for t in tasks {
        store.put_task(t).await.unwrap();
    }
}

/// AppState con store y cola en memoria y el loop de agregación corriendo.
pub fn harness(queue: Arc<dyn JobQueue>, config: Config) -> AppState {
    let store: Arc<dyn PlanStore> = Arc::new(MemoryStore::new());
    let config = Arc::new(config);
    let (commands, _loop) = aggregator::spawn(store.clone(), queue.clone(), config.clone());
    AppState::new(store, queue, commands, config)
}

pub fn default_harness() -> AppState {
    harness(Arc::new(MemoryQueue::new()), test_config())
}

/// El loop procesa en orden: cuando responde, todo lo enviado antes ya
/// se aplicó.
pub async fn flush(tx: &mpsc::Sender<Command>) {
    let (respond_to, rx) = oneshot::channel();
    tx.send(Command::Dispatch {
        plan_id: "__flush__".to_string(),
        respond_to,
    })
    .await
    .unwrap();
    let _ = rx.await.unwrap();
}

pub async fn wait_for_plan<F>(store: &dyn PlanStore, plan_id: &str, pred: F) -> Plan
where
    F: Fn(&Plan) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            if let Some(plan) = store.get_plan(plan_id).await.unwrap() {
                if pred(&plan) {
                    return plan;
                }
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("el plan no llegó al estado esperado")
}

pub async fn wait_for_task<F>(store: &dyn PlanStore, task_id: &str, pred: F) -> Task
where
    F: Fn(&Task) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            if let Some(task) = store.get_task(task_id).await.unwrap() {
                if pred(&task) {
                    return task;
                }
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("la tarea no llegó al estado esperado")
}

/* ---------------- executor con guion ---------------- */

/// Falla las primeras `failures` llamadas y después responde bien.
/// Con `hang` nunca responde.
pub struct ScriptedExecutor {
    failures: u32,
    hang: bool,
    calls: AtomicU32,
}

impl ScriptedExecutor {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures,
            hang: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn ok() -> Self {
        Self::failing(0)
    }

    pub fn hanging() -> Self {
        Self {
            failures: 0,
            hang: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, kind: TaskKind, input: &TaskInput) -> Result<TaskOutput, ExecutionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if self.hang {
            std::future::pending::<()>().await;
        }
        if call < self.failures {
            return Err(ExecutionError::Failed(format!("falla programada #{}", call + 1)));
        }

        Ok(TaskOutput {
            content: format!("[{}] {}", kind.as_str(), input.prompt().unwrap_or("ok")),
            data: None,
        })
    }
}

/* ---------------- cola que rechaza encolados ---------------- */

/// Cola en memoria que no confirma el encolado de ciertas tareas (o de
/// ninguna, si está caída).
#[derive(Default)]
pub struct FlakyQueue {
    inner: MemoryQueue,
    rejected: Mutex<HashSet<String>>,
    down: AtomicBool,
}

impl FlakyQueue {
    pub fn rejecting(task_ids: &[&str]) -> Self {
        Self {
            rejected: Mutex::new(task_ids.iter().map(|s| s.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn down() -> Self {
        Self {
            down: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn accept_all(&self) {
        self.down.store(false, Ordering::SeqCst);
        self.rejected.lock().unwrap().clear();
    }
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        if self.down.load(Ordering::SeqCst) || self.rejected.lock().unwrap().contains(&job.task_id) {
            return Err(QueueError::Unavailable("broker sin respuesta".to_string()));
        }
        self.inner.enqueue(job).await
    }

    async fn lease(&self, consumer: &str, lease_for: Duration) -> Result<Option<Job>, QueueError> {
        self.inner.lease(consumer, lease_for).await
    }

    async fn ack(&self, key: &JobKey) -> Result<bool, QueueError> {
        self.inner.ack(key).await
    }

    async fn renew(&self, consumer: &str, lease_for: Duration) -> Result<usize, QueueError> {
        self.inner.renew(consumer, lease_for).await
    }

    async fn requeue_expired(&self) -> Result<Vec<JobKey>, QueueError> {
        self.inner.requeue_expired().await
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.inner.stats().await
    }
}
