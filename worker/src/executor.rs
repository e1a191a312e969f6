use async_trait::async_trait;
use common::{EchoExecutor, ExecutionError, TaskExecutor, TaskInput, TaskKind, TaskOutput};
use std::time::Duration;
use tokio::time::sleep;

/// Ejecutor del worker: espera `delay` (la "llamada al modelo") y
/// después responde como el `EchoExecutor`.
pub struct SimulatedExecutor {
    delay: Duration,
    inner: EchoExecutor,
}

impl SimulatedExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: EchoExecutor,
        }
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, kind: TaskKind, input: &TaskInput) -> Result<TaskOutput, ExecutionError> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.inner.execute(kind, input).await
    }
}
