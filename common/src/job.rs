use serde::{Deserialize, Serialize};
use std::fmt;

use crate::plan::PlanId;
use crate::task::{Task, TaskId, TaskInput, TaskKind};

/// Identidad de un job para deduplicar: (plan, tarea, intento).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub plan_id: PlanId,
    pub task_id: TaskId,
    pub attempt: u32,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.plan_id, self.task_id, self.attempt)
    }
}

/// Sobre que viaja por la cola. Se reconstruye desde la tarea en cada
/// despacho; la cola nunca es la fuente de verdad.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub plan_id: PlanId,
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub input: TaskInput,
    pub attempt: u32,
}

impl Job {
    /// El intento es el `retry_count` actual de la tarea.
    pub fn for_task(task: &Task) -> Self {
        Self {
            plan_id: task.plan_id.clone(),
            task_id: task.id.clone(),
            kind: task.kind,
            input: task.input.clone(),
            attempt: task.retry_count,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            plan_id: self.plan_id.clone(),
            task_id: self.task_id.clone(),
            attempt: self.attempt,
        }
    }
}
