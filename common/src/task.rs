use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::plan::PlanId;

pub type TaskId = String;

/// Presupuesto de reintentos por defecto para cada tarea.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Planning,
    Execution,
    Coordination,
    Validation,
    Cleanup,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Planning => "planning",
            TaskKind::Execution => "execution",
            TaskKind::Coordination => "coordination",
            TaskKind::Validation => "validation",
            TaskKind::Cleanup => "cleanup",
        }
    }
}

/// El orden de las variantes importa: `Critical` compara como la mayor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl TaskStatus {
    /// `Failed` sólo llega a guardarse cuando ya no quedan reintentos,
    /// así que acá lo tratamos como terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Entrada tipada de la tarea, una variante por tipo de tarea.
/// `Raw` queda sólo para payloads que vienen de afuera sin esquema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskInput {
    Planning {
        prompt: String,
    },
    Execution {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
    },
    Coordination {
        subtasks: Vec<TaskId>,
    },
    Validation {
        target: TaskId,
        criteria: String,
    },
    Cleanup {
        #[serde(default)]
        resources: Vec<String>,
    },
    Raw {
        payload: Value,
    },
}

impl TaskInput {
    /// Texto principal que se le pasa a la capacidad de ejecución.
    pub fn prompt(&self) -> Option<&str> {
        match self {
            TaskInput::Planning { prompt } | TaskInput::Execution { prompt, .. } => Some(prompt),
            TaskInput::Validation { criteria, .. } => Some(criteria),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskOutput {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub plan_id: PlanId,
    pub kind: TaskKind,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,

    /// Tareas del mismo plan que tienen que estar `completed` antes
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    pub input: TaskInput,
    pub output: Option<TaskOutput>,
    /// Último mensaje de error registrado
    pub error: Option<String>,

    pub retry_count: u32,
    pub max_retries: u32,

    /// Posición de la tarea dentro del plan (0-indexed)
    pub order: u32,

    /// No despachar antes de este instante (backoff de reintentos)
    pub not_before: Option<DateTime<Utc>>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Duración del último intento
    pub duration_ms: Option<u64>,
}

impl Task {
    /// Lista para despachar: pendiente, sin backoff vigente y con todas
    /// sus dependencias completadas según `status_of`.
    pub fn is_ready<F>(&self, now: DateTime<Utc>, status_of: F) -> bool
    where
        F: Fn(&str) -> Option<TaskStatus>,
    {
        if self.status != TaskStatus::Pending {
            return false;
        }
        if matches!(self.not_before, Some(t) if t > now) {
            return false;
        }
        self.dependencies
            .iter()
            .all(|dep| status_of(dep) == Some(TaskStatus::Completed))
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
