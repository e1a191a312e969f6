use chrono::Utc;
use serde_json::{json, Map};

use crate::error::BuildError;
use crate::plan::{Plan, PlanContext, PlanKind, PlanMode, PlanStatus, Progress};
use crate::task::{Priority, Task, TaskInput, TaskKind, TaskStatus, DEFAULT_MAX_RETRIES};

/// Arista (from, to): el sub-objetivo `to` depende de `from`. Son índices
/// dentro de la lista de sub-objetivos.
pub type Edge = (usize, usize);

const PLAN_TITLE_CHARS: usize = 120;
const TASK_TITLE_CHARS: usize = 100;

/// Arma el plan y sus tareas con la topología plana por defecto.
pub fn build_plan(
    goal: &str,
    subgoals: &[String],
    owner_id: &str,
) -> Result<(Plan, Vec<Task>), BuildError> {
    build_plan_with_edges(goal, subgoals, owner_id, &[])
}

/// Igual que [`build_plan`] pero acepta aristas de dependencia. Valida todo
/// antes de crear nada: o sale el plan completo o sale un error.
pub fn build_plan_with_edges(
    goal: &str,
    subgoals: &[String],
    owner_id: &str,
    edges: &[Edge],
) -> Result<(Plan, Vec<Task>), BuildError> {
    let mut violations = Vec::new();

    if owner_id.trim().is_empty() {
        violations.push("owner_id: falta el dueño del plan".to_string());
    }
    if subgoals.is_empty() {
        violations.push("subgoals: se necesita al menos un sub-objetivo".to_string());
    }
    for (i, sg) in subgoals.iter().enumerate() {
        if sg.trim().is_empty() {
            violations.push(format!("subgoals[{i}]: sub-objetivo vacío"));
        }
    }

    if !violations.is_empty() {
        return Err(BuildError::Invalid { violations });
    }

    check_acyclic(subgoals.len(), edges)?;

    let now = Utc::now();
    let plan_id = uuid::Uuid::new_v4().to_string();

    let mut tasks: Vec<Task> = subgoals
        .iter()
        .enumerate()
        .map(|(i, sg)| Task {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan_id.clone(),
            kind: TaskKind::Planning,
            title: format!("Step: {}", truncate_chars(sg, TASK_TITLE_CHARS)),
            description: sg.clone(),
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            input: TaskInput::Planning {
                prompt: format!("Research: {sg}"),
            },
            output: None,
            error: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            order: i as u32,
            not_before: None,
            metadata: {
                let mut m = Map::new();
                m.insert("subgoal".to_string(), json!(sg));
                m
            },
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            duration_ms: None,
        })
        .collect();

    for &(from, to) in edges {
        let dep_id = tasks[from].id.clone();
        if !tasks[to].dependencies.contains(&dep_id) {
            tasks[to].dependencies.push(dep_id);
        }
    }

    let kind = if subgoals.len() == 1 {
        PlanKind::Simple
    } else {
        PlanKind::Complex
    };

    let plan = Plan {
        id: plan_id,
        title: format!("Plan: {}", truncate_chars(goal, PLAN_TITLE_CHARS)),
        description: format!("Auto-generated plan for: {goal}"),
        kind,
        owner_id: owner_id.to_string(),
        mode: PlanMode::default(),
        status: PlanStatus::Pending,
        tasks: tasks.iter().map(|t| t.id.clone()).collect(),
        progress: Progress::new(tasks.len() as u32),
        context: PlanContext {
            goal: goal.to_string(),
        },
        constraints: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        finished_at: None,
    };

    Ok((plan, tasks))
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Chequeo de aciclicidad con DFS de tres colores. Un nodo gris que se
/// vuelve a visitar cierra un ciclo; el camino se devuelve en el error.
pub fn check_acyclic(nodes: usize, edges: &[Edge]) -> Result<(), BuildError> {
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); nodes];
    for &(from, to) in edges {
        if from >= nodes || to >= nodes {
            return Err(BuildError::UnknownDependency {
                task: to,
                dependency: from,
            });
        }
        adj[from].push(to);
    }

    let mut color = vec![Color::White; nodes];
    let mut stack = Vec::new();

    for start in 0..nodes {
        if color[start] == Color::White {
            visit(start, &adj, &mut color, &mut stack)?;
        }
    }

    Ok(())
}

fn visit(
    node: usize,
    adj: &[Vec<usize>],
    color: &mut [Color],
    stack: &mut Vec<usize>,
) -> Result<(), BuildError> {
    color[node] = Color::Gray;
    stack.push(node);

    for &next in &adj[node] {
        match color[next] {
            Color::Gray => {
                let pos = stack.iter().position(|&n| n == next).unwrap_or(0);
                let mut path = stack[pos..].to_vec();
                path.push(next);
                return Err(BuildError::Cycle { path });
            }
            Color::White => visit(next, adj, color, stack)?,
            Color::Black => {}
        }
    }

    stack.pop();
    color[node] = Color::Black;
    Ok(())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::decompose;

    fn subs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn objetivo_corto_genera_plan_simple() {
        let goal = "Summarize recent AI research";
        let (plan, tasks) = build_plan(goal, &decompose(goal), "user-1").unwrap();

        assert_eq!(plan.kind, PlanKind::Simple);
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[0].description, goal);
        assert_eq!(plan.context.goal, goal);
    }

    #[test]
    fn tres_oraciones_generan_plan_complejo() {
        let goal = "Research competitors. Draft outline. Write summary.";
        let (plan, tasks) = build_plan(goal, &decompose(goal), "user-1").unwrap();

        assert_eq!(plan.kind, PlanKind::Complex);
        assert_eq!(tasks.len(), 3);
        assert_eq!(plan.progress.total, 3);
        assert_eq!(plan.progress.completed, 0);
        assert_eq!(plan.progress.failed, 0);
        assert_eq!(plan.progress.percentage, 0);
        assert_eq!(plan.tasks, tasks.iter().map(|t| t.id.clone()).collect::<Vec<_>>());
    }

    #[test]
    fn tareas_usan_los_valores_por_defecto() {
        let (plan, tasks) = build_plan("g", &subs(&["a", "b"]), "u").unwrap();

        for (i, t) in tasks.iter().enumerate() {
            assert_eq!(t.plan_id, plan.id);
            assert_eq!(t.kind, TaskKind::Planning);
            assert_eq!(t.priority, Priority::Medium);
            assert_eq!(t.max_retries, 3);
            assert_eq!(t.retry_count, 0);
            assert!(t.dependencies.is_empty());
            assert_eq!(t.order, i as u32);
        }
        assert_eq!(tasks[0].title, "Step: a");
        assert_eq!(
            tasks[0].input,
            TaskInput::Planning {
                prompt: "Research: a".to_string()
            }
        );
    }

    #[test]
    fn titulos_se_recortan_por_caracteres() {
        let largo = "ñ".repeat(300);
        let (plan, tasks) = build_plan(&largo, &[largo.clone()], "u").unwrap();

        assert_eq!(plan.title.chars().count(), "Plan: ".len() + 120);
        assert_eq!(tasks[0].title.chars().count(), "Step: ".len() + 100);
    }

    #[test]
    fn junta_todas_las_violaciones_en_un_solo_error() {
        let err = build_plan("g", &subs(&["ok", "  ", ""]), "").unwrap_err();

        match err {
            BuildError::Invalid { violations } => {
                assert_eq!(violations.len(), 3);
                assert!(violations[0].starts_with("owner_id"));
                assert!(violations[1].starts_with("subgoals[1]"));
                assert!(violations[2].starts_with("subgoals[2]"));
            }
            other => panic!("error inesperado: {other:?}"),
        }
    }

    #[test]
    fn sin_sub_objetivos_es_invalido() {
        let err = build_plan("g", &[], "u").unwrap_err();
        assert!(matches!(err, BuildError::Invalid { .. }));
    }

    #[test]
    fn aristas_validas_se_convierten_en_dependencias() {
        let (_, tasks) =
            build_plan_with_edges("g", &subs(&["a", "b", "c"]), "u", &[(0, 1), (0, 2), (1, 2)])
                .unwrap();

        assert!(tasks[0].dependencies.is_empty());
        assert_eq!(tasks[1].dependencies, vec![tasks[0].id.clone()]);
        assert_eq!(
            tasks[2].dependencies,
            vec![tasks[0].id.clone(), tasks[1].id.clone()]
        );
    }

    #[test]
    fn rechaza_ciclos() {
        let err = build_plan_with_edges("g", &subs(&["a", "b", "c"]), "u", &[(0, 1), (1, 2), (2, 0)])
            .unwrap_err();

        match err {
            BuildError::Cycle { path } => assert_eq!(path, vec![0, 1, 2, 0]),
            other => panic!("error inesperado: {other:?}"),
        }
    }

    #[test]
    fn rechaza_auto_dependencia() {
        let err = build_plan_with_edges("g", &subs(&["a"]), "u", &[(0, 0)]).unwrap_err();
        assert_eq!(err, BuildError::Cycle { path: vec![0, 0] });
    }

    #[test]
    fn rechaza_indices_desconocidos() {
        let err = build_plan_with_edges("g", &subs(&["a", "b"]), "u", &[(5, 1)]).unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownDependency {
                task: 1,
                dependency: 5
            }
        );
    }

    #[test]
    fn diamante_no_es_ciclo() {
        assert!(check_acyclic(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]).is_ok());
    }
}
