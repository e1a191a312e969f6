use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::BuildError;
use serde_json::json;
use thiserror::Error;

use crate::queue::QueueError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("pedido inválido: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("plan {0} no encontrado")]
    PlanNotFound(String),

    #[error("worker {0} no registrado")]
    WorkerNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("el loop de agregación no está disponible")]
    LoopUnavailable,
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl OrchestratorError {
    fn status(&self) -> StatusCode {
        match self {
            OrchestratorError::Validation(_) | OrchestratorError::Build(_) => {
                StatusCode::BAD_REQUEST
            }
            OrchestratorError::PlanNotFound(_) | OrchestratorError::WorkerNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            OrchestratorError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            OrchestratorError::LoopUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::Store(_) | OrchestratorError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Vec<String> {
        match self {
            OrchestratorError::Validation(violations)
            | OrchestratorError::Build(BuildError::Invalid { violations }) => violations.clone(),
            _ => Vec::new(),
        }
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "details": self.details(),
        }));
        (status, body).into_response()
    }
}
