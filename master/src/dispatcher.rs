use chrono::Utc;
use common::{Job, Plan, PlanStatus, Task, TaskId, TaskStatus};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

use crate::queue::JobQueue;
use crate::store::{PlanStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub task_id: TaskId,
    pub error: String,
}

/// Resultado de una pasada de despacho. Las fallas de encolado no abortan
/// la pasada: la tarea queda `pending` y se reintenta en otra pasada.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub enqueued: usize,
    pub failures: Vec<DispatchFailure>,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn PlanStore>,
    queue: Arc<dyn JobQueue>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn PlanStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Encola las tareas listas del plan. `tasks` tiene que ser el conjunto
    /// completo de tareas del plan (hace falta para saber qué está listo).
    /// Cada tarea pasa a `running` recién cuando el broker confirma.
    pub async fn dispatch(
        &self,
        plan: &mut Plan,
        tasks: &mut [Task],
    ) -> Result<DispatchReport, StoreError> {
        let mut report = DispatchReport::default();
        if plan.status.is_terminal() {
            return Ok(report);
        }

        let now = Utc::now();
        let statuses: HashMap<TaskId, TaskStatus> =
            tasks.iter().map(|t| (t.id.clone(), t.status)).collect();

        let mut ready: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_ready(now, |id| statuses.get(id).copied()))
            .map(|(i, _)| i)
            .collect();

        // prioridad más alta primero, después el orden dentro del plan
        ready.sort_by(|&a, &b| {
            tasks[b]
                .priority
                .cmp(&tasks[a].priority)
                .then(tasks[a].order.cmp(&tasks[b].order))
        });

        for i in ready {
            let task = &mut tasks[i];
            let job = Job::for_task(task);
            let key = job.key();

            match self.queue.enqueue(job).await {
                Ok(()) => {
                    task.status = TaskStatus::Running;
                    task.started_at = Some(Utc::now());
                    task.not_before = None;
                    task.touch();
                    self.store.put_task(task).await?;

                    report.enqueued += 1;
                    info!("job {} encolado ({})", key, task.title);
                }
                Err(e) => {
                    warn!("no se pudo encolar el job {}: {}", key, e);
                    report.failures.push(DispatchFailure {
                        task_id: task.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.enqueued > 0 && plan.status == PlanStatus::Pending {
            plan.status = PlanStatus::Running;
            if plan.started_at.is_none() {
                plan.started_at = Some(Utc::now());
            }
            plan.touch();
            self.store.put_plan(plan).await?;
            info!("plan {} pasa a RUNNING", plan.id);
        }

        Ok(report)
    }
}
