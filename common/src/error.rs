use std::time::Duration;

use thiserror::Error;

/// Errores al armar el plan y su grafo de tareas. Cualquiera de ellos
/// rechaza la creación completa: no se devuelve un plan a medias.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("plan inválido: {}", .violations.join("; "))]
    Invalid { violations: Vec<String> },

    #[error("la tarea {task} depende de un índice desconocido {dependency}")]
    UnknownDependency { task: usize, dependency: usize },

    #[error("dependencias cíclicas: {path:?}")]
    Cycle { path: Vec<usize> },
}

/// Fallo de la capacidad de ejecución externa.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}
