use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::error::ExecutionError;
use crate::job::Job;
use crate::task::{TaskInput, TaskKind, TaskOutput};
use crate::worker::JobOutcome;

/// Capacidad externa que ejecuta el trabajo de una tarea (modelo, tools, etc).
/// Puede tardar lo que quiera o fallar; el timeout lo pone quien llama.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, kind: TaskKind, input: &TaskInput)
        -> Result<TaskOutput, ExecutionError>;
}

/// Ejecutor de prueba: devuelve un resumen armado a partir de la entrada.
#[derive(Debug, Clone, Default)]
pub struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(
        &self,
        kind: TaskKind,
        input: &TaskInput,
    ) -> Result<TaskOutput, ExecutionError> {
        let content = match input {
            TaskInput::Raw { payload } => format!("[{}] {}", kind.as_str(), payload),
            other => match other.prompt() {
                Some(prompt) => format!("[{}] {}", kind.as_str(), prompt),
                None => format!("[{}] ok", kind.as_str()),
            },
        };

        Ok(TaskOutput {
            content,
            data: serde_json::to_value(input).ok(),
        })
    }
}

/// Ejecuta el job acotado por `limit`; un timeout cuenta como falla.
/// Devuelve el resultado y la duración en ms.
pub async fn run_job(executor: &dyn TaskExecutor, job: &Job, limit: Duration) -> (JobOutcome, u64) {
    let started = Instant::now();

    let result = match timeout(limit, executor.execute(job.kind, &job.input)).await {
        Ok(result) => result,
        Err(_) => Err(ExecutionError::TimedOut(limit)),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    let outcome = match result {
        Ok(output) => JobOutcome::Succeeded { output },
        Err(e) => JobOutcome::Failed {
            error: e.to_string(),
        },
    };
    (outcome, duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Colgado;

    #[async_trait]
    impl TaskExecutor for Colgado {
        async fn execute(&self, _: TaskKind, _: &TaskInput) -> Result<TaskOutput, ExecutionError> {
            std::future::pending().await
        }
    }

    fn job() -> Job {
        Job {
            plan_id: "p".to_string(),
            task_id: "t".to_string(),
            kind: TaskKind::Execution,
            input: TaskInput::Execution {
                prompt: "hacer algo".to_string(),
                tool: None,
            },
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn run_job_envuelve_la_salida() {
        let (outcome, _) = run_job(&EchoExecutor, &job(), Duration::from_secs(1)).await;
        match outcome {
            JobOutcome::Succeeded { output } => assert_eq!(output.content, "[execution] hacer algo"),
            other => panic!("esperaba éxito, vino {:?}", other),
        }
    }

    #[tokio::test]
    async fn run_job_corta_por_timeout() {
        let (outcome, _) = run_job(&Colgado, &job(), Duration::from_millis(10)).await;
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                error: "timed out after 10ms".to_string()
            }
        );
    }

    #[tokio::test]
    async fn echo_devuelve_el_prompt_con_el_tipo() {
        let out = EchoExecutor
            .execute(
                TaskKind::Planning,
                &TaskInput::Planning {
                    prompt: "Research: x".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(out.content, "[planning] Research: x");
        assert!(out.data.is_some());
    }

    #[tokio::test]
    async fn echo_acepta_entradas_sin_prompt() {
        let out = EchoExecutor
            .execute(TaskKind::Cleanup, &TaskInput::Cleanup { resources: vec![] })
            .await
            .unwrap();

        assert_eq!(out.content, "[cleanup] ok");
    }
}
