use serde::{Deserialize, Serialize};

use crate::plan::Plan;
use crate::task::{Task, TaskId, TaskOutput, TaskStatus};

/// Estado de una tarea tal como se le muestra al usuario
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub output: Option<TaskOutput>,
    /// Último error registrado, aunque la tarea haya terminado bien después
    pub error: Option<String>,
}

impl From<&Task> for TaskReport {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            output: task.output.clone(),
            error: task.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub plan: Plan,
    /// En el mismo orden que `plan.tasks`
    pub tasks: Vec<TaskReport>,
}

impl PlanReport {
    /// Tareas que terminaron en `failed`, con su error
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Failed)
    }
}
