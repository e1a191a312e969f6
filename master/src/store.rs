use async_trait::async_trait;
use common::{Plan, PlanId, Task, TaskId};
use std::{
    collections::HashMap,
    sync::RwLock,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no encontrado: {0}")]
    NotFound(String),

    #[error("error interno del store: {0}")]
    Internal(String),
}

/// Almacenamiento clave-valor de planes y tareas. Se crea en `main` y se
/// inyecta en el `AppState`; nadie accede a un singleton global.
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get_plan(&self, id: &str) -> Result<Option<Plan>, StoreError>;

    async fn put_plan(&self, plan: &Plan) -> Result<(), StoreError>;

    /// Todos los planes, el más nuevo primero
    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError>;

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError>;

    async fn put_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Tareas del plan en el orden de `plan.tasks`
    async fn list_tasks(&self, plan_id: &str) -> Result<Vec<Task>, StoreError>;
}

/// Implementación en memoria
#[derive(Default)]
pub struct MemoryStore {
    plans: RwLock<HashMap<PlanId, Plan>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Internal(e.to_string())
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn get_plan(&self, id: &str) -> Result<Option<Plan>, StoreError> {
        let plans = self.plans.read().map_err(poisoned)?;
        Ok(plans.get(id).cloned())
    }

    async fn put_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let mut plans = self.plans.write().map_err(poisoned)?;
        plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let plans = self.plans.read().map_err(poisoned)?;
        let mut out: Vec<Plan> = plans.values().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().map_err(poisoned)?;
        Ok(tasks.get(id).cloned())
    }

    async fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn list_tasks(&self, plan_id: &str) -> Result<Vec<Task>, StoreError> {
        let task_ids = {
            let plans = self.plans.read().map_err(poisoned)?;
            match plans.get(plan_id) {
                Some(plan) => plan.tasks.clone(),
                None => return Err(StoreError::NotFound(plan_id.to_string())),
            }
        };

        let tasks = self.tasks.read().map_err(poisoned)?;
        task_ids
            .iter()
            .map(|id| {
                tasks
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(id.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use common::{build_plan, PlanStatus};

    fn plan_con_tareas(goal: &str) -> (Plan, Vec<Task>) {
        let subgoals = common::decompose(goal);
        build_plan(goal, &subgoals, "user-1").unwrap()
    }

    #[tokio::test]
    async fn guarda_y_lee_planes_y_tareas() {
        let store = MemoryStore::new();
        let (plan, tasks) = plan_con_tareas("Uno. Dos.");

        store.put_plan(&plan).await.unwrap();
        for t in &tasks {
            store.put_task(t).await.unwrap();
        }

        let leido = store.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(leido, plan);

        let listadas = store.list_tasks(&plan.id).await.unwrap();
        assert_eq!(listadas, tasks);

        assert!(store.get_plan("no-existe").await.unwrap().is_none());
        assert!(store.get_task("no-existe").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_reemplaza_el_registro() {
        let store = MemoryStore::new();
        let (mut plan, _) = plan_con_tareas("Uno.");
        store.put_plan(&plan).await.unwrap();

        plan.status = PlanStatus::Running;
        store.put_plan(&plan).await.unwrap();

        let leido = store.get_plan(&plan.id).await.unwrap().unwrap();
        assert_eq!(leido.status, PlanStatus::Running);
    }

    #[tokio::test]
    async fn lista_planes_del_mas_nuevo_al_mas_viejo() {
        let store = MemoryStore::new();
        let (mut viejo, _) = plan_con_tareas("Viejo.");
        let (mut nuevo, _) = plan_con_tareas("Nuevo.");
        viejo.created_at = Utc::now() - Duration::seconds(60);
        nuevo.created_at = Utc::now();

        store.put_plan(&viejo).await.unwrap();
        store.put_plan(&nuevo).await.unwrap();

        let planes = store.list_plans().await.unwrap();
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0].id, nuevo.id);
        assert_eq!(planes[1].id, viejo.id);
    }

    #[tokio::test]
    async fn list_tasks_de_plan_inexistente_es_not_found() {
        let store = MemoryStore::new();
        let err = store.list_tasks("nada").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
