//! Tipos compartidos entre master, worker y client: modelo de planes y
//! tareas, descomposición de objetivos, armado del grafo de tareas y los
//! mensajes que viajan entre el master y los workers.

pub mod dag;
pub mod decompose;
pub mod error;
pub mod executor;
pub mod job;
pub mod plan;
pub mod results;
pub mod task;
pub mod worker;

pub use dag::{build_plan, build_plan_with_edges, check_acyclic, Edge};
pub use decompose::{decompose, MAX_SUBGOALS};
pub use error::{BuildError, ExecutionError};
pub use executor::{run_job, EchoExecutor, TaskExecutor};
pub use job::{Job, JobKey};
pub use plan::{
    CreatePlanRequest, Plan, PlanConstraints, PlanContext, PlanId, PlanKind, PlanMode,
    PlanStatus, Progress, UserId,
};
pub use results::{PlanReport, TaskReport};
pub use task::{
    Priority, Task, TaskId, TaskInput, TaskKind, TaskOutput, TaskStatus, DEFAULT_MAX_RETRIES,
};
pub use worker::{
    JobCompleteRequest, JobCompleteResponse, JobLeaseRequest, JobLeaseResponse, JobOutcome,
    WorkerHeartbeatRequest, WorkerHeartbeatResponse, WorkerId, WorkerMetrics,
    WorkerRegisterRequest, WorkerRegisterResponse,
};
