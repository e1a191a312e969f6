use std::time::SystemTime;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::aggregator::Command;
use crate::error::{OrchestratorError, Result};
use crate::state::AppState;

/// Loop principal de tolerancia a fallos:
/// - detecta workers remotos muertos (sin heartbeat)
/// - devuelve a la cola los jobs con lease vencido
/// - pide un barrido de despacho al loop de agregación
pub async fn run_failover_loop(state: AppState) {
    loop {
        sleep(state.config.failover_sweep_interval).await;

        match sweep_once(&state).await {
            Ok(_) => {}
            Err(OrchestratorError::LoopUnavailable) => {
                warn!("failover: loop de agregación cerrado, se detiene");
                return;
            }
            Err(e) => warn!("error en failover sweep: {}", e),
        }
    }
}

/// Una pasada de chequeo. Devuelve los workers que quedaron marcados
/// como muertos en esta pasada.
pub async fn sweep_once(state: &AppState) -> Result<Vec<String>> {
    let now = SystemTime::now();
    let newly_dead = mark_dead_workers(state, now);

    // jobs de consumidores caídos: vuelven a la cola con la misma key
    let requeued = state.queue.requeue_expired().await?;
    for key in &requeued {
        info!("re-entregando job {} (lease vencido)", key);
    }

    state
        .commands
        .send(Command::Redispatch)
        .await
        .map_err(|_| OrchestratorError::LoopUnavailable)?;

    Ok(newly_dead)
}

fn mark_dead_workers(state: &AppState, now: SystemTime) -> Vec<String> {
    let timeout = state.config.worker_heartbeat_timeout;
    let mut newly_dead = Vec::new();

    let Ok(mut workers) = state.workers.lock() else {
        warn!("failover: lock de workers envenenado");
        return newly_dead;
    };

    for (worker_id, meta) in workers.iter_mut() {
        // los consumidores locales viven lo mismo que el master
        if meta.dead || meta.local {
            continue;
        }

        match now.duration_since(meta.last_heartbeat) {
            Ok(elapsed) if elapsed > timeout => {
                meta.dead = true;
                newly_dead.push(worker_id.clone());
                warn!(
                    "marcando worker {} como DEAD (sin heartbeat hace {:?})",
                    worker_id, elapsed
                );
            }
            // last_heartbeat en el futuro? raro, lo ignoramos.
            _ => continue,
        }
    }

    newly_dead
}
