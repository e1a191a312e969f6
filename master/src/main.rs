mod aggregator;
mod config;
mod dispatcher;
mod error;
mod failover;
mod handlers;
mod planner;
mod pool;
mod queue;
mod state;
mod store;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use common::{EchoExecutor, TaskExecutor};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::queue::{JobQueue, MemoryQueue};
use crate::state::AppState;
use crate::store::{MemoryStore, PlanStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,tower_http=info")),
        )
        .init();

    let config = Arc::new(Config::from_env());
    info!("configuración: {:?}", config);

    let store: Arc<dyn PlanStore> = Arc::new(MemoryStore::new());
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new());

    // loop de agregación: único escritor de planes y tareas
    let (commands, _aggregator) = aggregator::spawn(store.clone(), queue.clone(), config.clone());
    let state = AppState::new(store, queue, commands, config.clone());

    // consumidores dentro del master
    let executor: Arc<dyn TaskExecutor> = Arc::new(EchoExecutor);
    pool::spawn_local_workers(&state, executor, config.local_workers);

    // tolerancia a fallos en segundo plano
    tokio::spawn(failover::run_failover_loop(state.clone()));

    // router HTTP
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.addr))?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
