// master/src/queue.rs

use async_trait::async_trait;
use common::{Job, JobKey, WorkerId};
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker no disponible: {0}")]
    Unavailable(String),

    #[error("error interno de la cola: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
}

/// Cola durable de jobs: entrega at-least-once, como mucho un consumidor
/// activo por job, ack explícito y re-entrega si el consumidor desaparece.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// `Ok` es el ack del broker. Encolar una key que ya está en cola o
    /// tomada es un no-op que igual se confirma.
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// Toma el próximo job para `consumer` durante `lease_for`.
    async fn lease(&self, consumer: &str, lease_for: Duration) -> Result<Option<Job>, QueueError>;

    /// Borra el job del broker. Devuelve false si ya no estaba tomado.
    async fn ack(&self, key: &JobKey) -> Result<bool, QueueError>;

    /// Extiende los leases del consumidor; devuelve cuántos renovó.
    async fn renew(&self, consumer: &str, lease_for: Duration) -> Result<usize, QueueError>;

    /// Devuelve a la cola los jobs cuyo lease venció.
    async fn requeue_expired(&self) -> Result<Vec<JobKey>, QueueError>;

    async fn stats(&self) -> Result<QueueStats, QueueError>;
}

#[derive(Debug)]
struct Leased {
    job: Job,
    consumer: WorkerId,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    // jobs esperando consumidor
    pending: VecDeque<Job>,
    // jobs tomados pero sin ack
    in_flight: HashMap<JobKey, Leased>,
}

/// Broker en memoria
#[derive(Debug, Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, QueueError> {
        self.inner
            .lock()
            .map_err(|_| QueueError::Internal("lock de la cola envenenado".to_string()))
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let key = job.key();
        let mut inner = self.lock()?;

        let duplicated = inner.in_flight.contains_key(&key)
            || inner.pending.iter().any(|j| j.key() == key);
        if !duplicated {
            inner.pending.push_back(job);
        }
        Ok(())
    }

    async fn lease(&self, consumer: &str, lease_for: Duration) -> Result<Option<Job>, QueueError> {
        let mut inner = self.lock()?;

        let Some(job) = inner.pending.pop_front() else {
            return Ok(None);
        };

        inner.in_flight.insert(
            job.key(),
            Leased {
                job: job.clone(),
                consumer: consumer.to_string(),
                deadline: Instant::now() + lease_for,
            },
        );
        Ok(Some(job))
    }

    async fn ack(&self, key: &JobKey) -> Result<bool, QueueError> {
        let mut inner = self.lock()?;
        Ok(inner.in_flight.remove(key).is_some())
    }

    async fn renew(&self, consumer: &str, lease_for: Duration) -> Result<usize, QueueError> {
        let mut inner = self.lock()?;
        let deadline = Instant::now() + lease_for;

        let mut renewed = 0;
        for leased in inner.in_flight.values_mut() {
            if leased.consumer == consumer {
                leased.deadline = deadline;
                renewed += 1;
            }
        }
        Ok(renewed)
    }

    async fn requeue_expired(&self) -> Result<Vec<JobKey>, QueueError> {
        let mut inner = self.lock()?;
        let now = Instant::now();

        let expired: Vec<JobKey> = inner
            .in_flight
            .iter()
            .filter(|(_, leased)| leased.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        // los re-entregados van adelante: ya esperaron una vez
        for key in &expired {
            if let Some(leased) = inner.in_flight.remove(key) {
                inner.pending.push_front(leased.job);
            }
        }

        Ok(expired)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let inner = self.lock()?;
        Ok(QueueStats {
            pending: inner.pending.len(),
            in_flight: inner.in_flight.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{TaskInput, TaskKind};

    fn job(task: &str, attempt: u32) -> Job {
        Job {
            plan_id: "p1".to_string(),
            task_id: task.to_string(),
            kind: TaskKind::Planning,
            input: TaskInput::Planning {
                prompt: format!("Research: {task}"),
            },
            attempt,
        }
    }

    const LEASE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn entrega_en_orden_fifo() {
        let q = MemoryQueue::new();
        q.enqueue(job("a", 0)).await.unwrap();
        q.enqueue(job("b", 0)).await.unwrap();

        let primero = q.lease("w1", LEASE).await.unwrap().unwrap();
        let segundo = q.lease("w1", LEASE).await.unwrap().unwrap();
        assert_eq!(primero.task_id, "a");
        assert_eq!(segundo.task_id, "b");
        assert!(q.lease("w1", LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn misma_key_no_se_encola_dos_veces() {
        let q = MemoryQueue::new();
        q.enqueue(job("a", 0)).await.unwrap();
        q.enqueue(job("a", 0)).await.unwrap();
        assert_eq!(q.stats().await.unwrap().pending, 1);

        // tomada: tampoco se duplica
        q.lease("w1", LEASE).await.unwrap().unwrap();
        q.enqueue(job("a", 0)).await.unwrap();
        assert_eq!(
            q.stats().await.unwrap(),
            QueueStats {
                pending: 0,
                in_flight: 1
            }
        );

        // otro intento es otro job
        q.enqueue(job("a", 1)).await.unwrap();
        assert_eq!(q.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn ack_borra_el_job() {
        let q = MemoryQueue::new();
        q.enqueue(job("a", 0)).await.unwrap();
        let j = q.lease("w1", LEASE).await.unwrap().unwrap();

        assert!(q.ack(&j.key()).await.unwrap());
        assert!(!q.ack(&j.key()).await.unwrap());
        assert_eq!(
            q.stats().await.unwrap(),
            QueueStats {
                pending: 0,
                in_flight: 0
            }
        );
    }

    #[tokio::test]
    async fn lease_vencido_se_reentrega_con_la_misma_key() {
        let q = MemoryQueue::new();
        q.enqueue(job("a", 0)).await.unwrap();
        q.enqueue(job("b", 0)).await.unwrap();
        let tomado = q.lease("w1", Duration::ZERO).await.unwrap().unwrap();

        let vencidos = q.requeue_expired().await.unwrap();
        assert_eq!(vencidos, vec![tomado.key()]);

        // vuelve adelante de la cola
        let otra_vez = q.lease("w2", LEASE).await.unwrap().unwrap();
        assert_eq!(otra_vez.key(), tomado.key());
    }

    #[tokio::test]
    async fn renew_extiende_solo_los_leases_del_consumidor() {
        let q = MemoryQueue::new();
        q.enqueue(job("a", 0)).await.unwrap();
        q.enqueue(job("b", 0)).await.unwrap();
        q.lease("w1", Duration::ZERO).await.unwrap().unwrap();
        q.lease("w2", Duration::ZERO).await.unwrap().unwrap();

        assert_eq!(q.renew("w1", LEASE).await.unwrap(), 1);

        let vencidos = q.requeue_expired().await.unwrap();
        assert_eq!(vencidos.len(), 1);
        assert_eq!(vencidos[0].task_id, "b");
    }
}
