use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

pub type PlanId = String;
pub type UserId = String;

/// Pedido de creación de plan (lo que manda el cliente)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub goal: String,

    /// Por ahora sólo metadata, no cambia la descomposición
    #[serde(default)]
    pub mode: PlanMode,

    /// Dueño del plan; si no viene, el master genera uno anónimo
    #[serde(default)]
    pub user_id: Option<UserId>,

    #[serde(default)]
    pub constraints: Option<PlanConstraints>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    Lightning,
    #[default]
    Standard,
    Custom,
}

/// `Adaptive` existe en el modelo pero ningún productor lo usa todavía.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    Simple,
    Complex,
    Adaptive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Progress {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub percentage: u32,
}

impl Progress {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// percentage = round(completed / total * 100), 0 si no hay tareas
    pub fn recompute(&mut self) {
        self.percentage = if self.total == 0 {
            0
        } else {
            (f64::from(self.completed) / f64::from(self.total) * 100.0).round() as u32
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PlanConstraints {
    pub max_duration_secs: Option<u64>,
    pub max_cost: Option<f64>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

/// Contexto del plan: el objetivo original tal cual lo mandó el usuario
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanContext {
    pub goal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: PlanId,
    pub title: String,
    pub description: String,
    pub kind: PlanKind,
    pub owner_id: UserId,
    #[serde(default)]
    pub mode: PlanMode,
    pub status: PlanStatus,

    /// Ids de las tareas, en orden
    pub tasks: Vec<TaskId>,
    pub progress: Progress,

    pub context: PlanContext,
    pub constraints: Option<PlanConstraints>,

    /// -------- Tiempos del plan --------
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Plan {
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Pasa el plan a un estado terminal y marca la hora de fin.
    pub fn finish(&mut self, status: PlanStatus) {
        self.status = status;
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn porcentaje_redondea_al_entero_mas_cercano() {
        let mut p = Progress::new(3);
        p.completed = 1;
        p.recompute();
        assert_eq!(p.percentage, 33);

        p.completed = 2;
        p.recompute();
        assert_eq!(p.percentage, 67);

        p.completed = 3;
        p.recompute();
        assert_eq!(p.percentage, 100);
    }

    #[test]
    fn porcentaje_es_cero_sin_tareas() {
        let mut p = Progress::new(0);
        p.recompute();
        assert_eq!(p.percentage, 0);
    }

    #[test]
    fn porcentaje_ignora_las_fallidas() {
        let mut p = Progress::new(4);
        p.completed = 1;
        p.failed = 3;
        p.recompute();
        assert_eq!(p.percentage, 25);
    }

    #[test]
    fn create_plan_request_usa_modo_standard_por_defecto() {
        let req: CreatePlanRequest = serde_json::from_str(r#"{"goal":"algo"}"#).unwrap();
        assert_eq!(req.mode, PlanMode::Standard);
        assert!(req.user_id.is_none());
        assert!(req.constraints.is_none());
    }

    #[test]
    fn estados_terminales_del_plan() {
        assert!(!PlanStatus::Pending.is_terminal());
        assert!(!PlanStatus::Running.is_terminal());
        assert!(PlanStatus::Completed.is_terminal());
        assert!(PlanStatus::Failed.is_terminal());
        assert!(PlanStatus::Cancelled.is_terminal());
    }
}
