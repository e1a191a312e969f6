// master/src/aggregator.rs

use chrono::Utc;
use common::{JobKey, JobOutcome, Plan, PlanId, PlanStatus, Task, TaskId, TaskStatus, WorkerId};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::{OrchestratorError, Result};
use crate::queue::JobQueue;
use crate::store::PlanStore;

/// Resultado de un job tal como lo reporta el consumidor que lo ejecutó
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub key: JobKey,
    pub worker_id: WorkerId,
    pub outcome: JobOutcome,
    pub duration_ms: u64,
}

/// Mensajes que entiende el loop de agregación
#[derive(Debug)]
pub enum Command {
    Dispatch {
        plan_id: PlanId,
        respond_to: oneshot::Sender<Result<DispatchReport>>,
    },
    Outcome(TaskEvent),
    RetryDue {
        plan_id: PlanId,
    },
    Redispatch,
    Cancel {
        plan_id: PlanId,
        respond_to: oneshot::Sender<Result<Plan>>,
    },
}

/// Arranca el loop de agregación. El loop termina cuando se sueltan
/// todos los `Sender` fuertes.
pub fn spawn(
    store: Arc<dyn PlanStore>,
    queue: Arc<dyn JobQueue>,
    config: Arc<Config>,
) -> (mpsc::Sender<Command>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.event_channel_capacity);

    let aggregator = Aggregator {
        dispatcher: Dispatcher::new(store.clone(), queue),
        store,
        config,
        self_tx: tx.downgrade(),
    };
    let handle = tokio::spawn(aggregator.run(rx));

    (tx, handle)
}

/// Único escritor de planes y tareas después de creados. Procesa los
/// comandos de a uno, así que no hace falta lockear nada acá.
pub struct Aggregator {
    store: Arc<dyn PlanStore>,
    dispatcher: Dispatcher,
    config: Arc<Config>,
    // débil: los timers de reintento no mantienen vivo el loop
    self_tx: mpsc::WeakSender<Command>,
}

impl Aggregator {
    pub async fn run(self, mut rx: mpsc::Receiver<Command>) {
        info!("loop de agregación iniciado");

        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }

        info!("loop de agregación terminado");
    }

    async fn handle(&self, command: Command) {
        match command {
            Command::Dispatch {
                plan_id,
                respond_to,
            } => {
                let result = self.dispatch_plan(&plan_id).await;
                let _ = respond_to.send(result);
            }
            Command::Outcome(event) => {
                let key = event.key.clone();
                if let Err(e) = self.apply_event(event).await {
                    warn!("no se pudo aplicar el resultado de {}: {}", key, e);
                }
            }
            Command::RetryDue { plan_id } => {
                debug!("reintento vencido para plan {}", plan_id);
                if let Err(e) = self.dispatch_plan(&plan_id).await {
                    warn!("error redespachando plan {}: {}", plan_id, e);
                }
            }
            Command::Redispatch => self.redispatch_all().await,
            Command::Cancel {
                plan_id,
                respond_to,
            } => {
                let result = self.cancel_plan(&plan_id).await;
                let _ = respond_to.send(result);
            }
        }
    }

    async fn load(&self, plan_id: &str) -> Result<(Plan, Vec<Task>)> {
        let plan = self
            .store
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| OrchestratorError::PlanNotFound(plan_id.to_string()))?;
        let tasks = self.store.list_tasks(plan_id).await?;
        Ok((plan, tasks))
    }

    async fn dispatch_plan(&self, plan_id: &str) -> Result<DispatchReport> {
        let (mut plan, mut tasks) = self.load(plan_id).await?;
        let report = self.dispatcher.dispatch(&mut plan, &mut tasks).await?;

        if !report.failures.is_empty() {
            warn!(
                "plan {}: {} tareas quedaron pendientes por fallas de encolado",
                plan_id,
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Barrido de planes no terminales; recupera fallas de encolado previas.
    async fn redispatch_all(&self) {
        let plans = match self.store.list_plans().await {
            Ok(plans) => plans,
            Err(e) => {
                warn!("redispatch: no se pudieron listar planes: {}", e);
                return;
            }
        };

        for plan in plans.iter().filter(|p| !p.status.is_terminal()) {
            match self.dispatch_plan(&plan.id).await {
                Ok(report) if report.enqueued > 0 => {
                    info!("redispatch: plan {} encoló {} jobs", plan.id, report.enqueued)
                }
                Ok(_) => {}
                Err(e) => warn!("redispatch: plan {}: {}", plan.id, e),
            }
        }
    }

    async fn apply_event(&self, event: TaskEvent) -> Result<()> {
        let key = event.key;

        let Some(mut task) = self.store.get_task(&key.task_id).await? else {
            debug!("evento {} para tarea desconocida, se ignora", key);
            return Ok(());
        };

        // at-least-once: duplicados y entregas viejas no cambian nada
        if task.plan_id != key.plan_id
            || task.status != TaskStatus::Running
            || task.retry_count != key.attempt
        {
            debug!(
                "evento {} ignorado (tarea {:?}, intento actual {})",
                key, task.status, task.retry_count
            );
            return Ok(());
        }

        let mut plan = self
            .store
            .get_plan(&task.plan_id)
            .await?
            .ok_or_else(|| OrchestratorError::PlanNotFound(task.plan_id.clone()))?;
        let now = Utc::now();
        task.duration_ms = Some(event.duration_ms);

        match event.outcome {
            JobOutcome::Succeeded { output } => {
                task.status = TaskStatus::Completed;
                task.output = Some(output);
                task.finished_at = Some(now);

                plan.progress.completed += 1;
                plan.progress.recompute();

                info!(
                    "tarea {} completada por {} ({} ms)",
                    key, event.worker_id, event.duration_ms
                );
            }
            JobOutcome::Failed { error } => {
                task.error = Some(error.clone());

                if task.can_retry() {
                    task.retry_count += 1;
                    task.status = TaskStatus::Pending;

                    let delay = self.config.retry_delay(task.retry_count);
                    task.not_before = Some(now + to_chrono(delay));
                    self.schedule_retry(task.plan_id.clone(), delay);

                    warn!(
                        "tarea {} falló en {}: {} (reintento {}/{} en {:?})",
                        key, event.worker_id, error, task.retry_count, task.max_retries, delay
                    );
                } else {
                    task.status = TaskStatus::Failed;
                    task.finished_at = Some(now);

                    plan.progress.failed += 1;
                    plan.progress.recompute();

                    warn!(
                        "tarea {} FALLÓ sin reintentos restantes: {}",
                        key, error
                    );
                }
            }
        }

        task.touch();
        self.store.put_task(&task).await?;

        let mut tasks = self.store.list_tasks(&plan.id).await?;
        if task.status == TaskStatus::Failed {
            self.cancel_dependents(&task.id, &mut tasks).await?;
        }

        // dependientes que quedaron listos
        if task.status == TaskStatus::Completed {
            self.dispatcher.dispatch(&mut plan, &mut tasks).await?;
        }

        evaluate_terminal(&mut plan, &tasks);
        plan.touch();
        self.store.put_plan(&plan).await?;
        Ok(())
    }

    /// Cancela los dependientes transitivos pendientes de una tarea fallida.
    async fn cancel_dependents(&self, failed: &TaskId, tasks: &mut [Task]) -> Result<()> {
        let mut blocked: HashSet<TaskId> = HashSet::from([failed.clone()]);

        loop {
            let mut changed = false;

            for task in tasks.iter_mut() {
                if task.status.is_terminal() || task.status == TaskStatus::Running {
                    continue;
                }
                let Some(dep) = task
                    .dependencies
                    .iter()
                    .find(|d| blocked.contains(*d))
                    .cloned()
                else {
                    continue;
                };

                task.error = Some(format!("cancelada: la dependencia {} no terminó", dep));
                task.status = TaskStatus::Cancelled;
                task.finished_at = Some(Utc::now());
                task.touch();
                self.store.put_task(task).await?;

                info!("tarea {} cancelada por dependencia fallida", task.id);
                blocked.insert(task.id.clone());
                changed = true;
            }

            if !changed {
                return Ok(());
            }
        }
    }

    async fn cancel_plan(&self, plan_id: &str) -> Result<Plan> {
        let (mut plan, tasks) = self.load(plan_id).await?;
        if plan.status.is_terminal() {
            return Ok(plan);
        }

        let now = Utc::now();
        for mut task in tasks.into_iter().filter(|t| !t.status.is_terminal()) {
            task.status = TaskStatus::Cancelled;
            task.finished_at = Some(now);
            task.touch();
            self.store.put_task(&task).await?;
        }

        plan.finish(PlanStatus::Cancelled);
        self.store.put_plan(&plan).await?;
        info!("plan {} CANCELADO", plan_id);

        Ok(plan)
    }

    fn schedule_retry(&self, plan_id: PlanId, delay: Duration) {
        let weak = self.self_tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            if let Some(tx) = weak.upgrade() {
                if tx.send(Command::RetryDue { plan_id }).await.is_err() {
                    debug!("loop de agregación cerrado, se descarta el reintento");
                }
            }
        });
    }
}

/// `completed` cuando todas las tareas terminaron bien; `failed` cuando
/// alguna falló y ya no queda nada en curso.
fn evaluate_terminal(plan: &mut Plan, tasks: &[Task]) {
    if plan.status.is_terminal() {
        return;
    }

    if tasks.iter().all(|t| t.status == TaskStatus::Completed) {
        plan.finish(PlanStatus::Completed);
        info!("plan {} COMPLETADO", plan.id);
    } else if tasks.iter().any(|t| t.status == TaskStatus::Failed)
        && tasks.iter().all(|t| t.status.is_terminal())
    {
        plan.finish(PlanStatus::Failed);
        warn!("plan {} FALLÓ", plan.id);
    }
}

fn to_chrono(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}
