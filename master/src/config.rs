use std::{env, str::FromStr, time::Duration};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_LOCAL_WORKERS: usize = 2;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LEASE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_FAILOVER_SWEEP_INTERVAL_SECS: u64 = 5;
const DEFAULT_WORKER_HEARTBEAT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuración del master. Se lee una sola vez al arrancar.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: String,
    /// Consumidores que corren dentro del master (0 = sólo workers remotos)
    pub local_workers: usize,
    /// Tiempo máximo de una llamada a la capacidad de ejecución
    pub job_timeout: Duration,
    /// Tiempo que un job queda tomado por un consumidor sin ack ni heartbeat
    pub lease_timeout: Duration,
    /// Backoff lineal: base_delay * intento
    pub retry_base_delay: Duration,
    pub poll_interval: Duration,
    pub failover_sweep_interval: Duration,
    pub worker_heartbeat_timeout: Duration,
    pub event_channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            addr: env::var("MASTER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string()),
            local_workers: env_or("LOCAL_WORKERS", DEFAULT_LOCAL_WORKERS),
            job_timeout: Duration::from_secs(env_or("JOB_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT_SECS)),
            lease_timeout: Duration::from_secs(env_or(
                "LEASE_TIMEOUT_SECS",
                DEFAULT_LEASE_TIMEOUT_SECS,
            )),
            retry_base_delay: Duration::from_millis(env_or(
                "RETRY_BASE_DELAY_MS",
                DEFAULT_RETRY_BASE_DELAY_MS,
            )),
            poll_interval: Duration::from_millis(env_or(
                "WORKER_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            failover_sweep_interval: Duration::from_secs(env_or(
                "FAILOVER_SWEEP_INTERVAL_SECS",
                DEFAULT_FAILOVER_SWEEP_INTERVAL_SECS,
            )),
            worker_heartbeat_timeout: Duration::from_secs(env_or(
                "WORKER_HEARTBEAT_TIMEOUT_SECS",
                DEFAULT_WORKER_HEARTBEAT_TIMEOUT_SECS,
            )),
            event_channel_capacity: env_or(
                "EVENT_CHANNEL_CAPACITY",
                DEFAULT_EVENT_CHANNEL_CAPACITY,
            )
            .max(1),
        }
    }

    /// Demora antes de redespachar el intento `attempt` (1, 2, 3...)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * attempt
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            local_workers: DEFAULT_LOCAL_WORKERS,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            lease_timeout: Duration::from_secs(DEFAULT_LEASE_TIMEOUT_SECS),
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            failover_sweep_interval: Duration::from_secs(DEFAULT_FAILOVER_SWEEP_INTERVAL_SECS),
            worker_heartbeat_timeout: Duration::from_secs(DEFAULT_WORKER_HEARTBEAT_TIMEOUT_SECS),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Lee una variable de entorno y la parsea; si falta o no parsea, usa el default.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_es_lineal() {
        let cfg = Config {
            retry_base_delay: Duration::from_millis(200),
            ..Config::default()
        };
        assert_eq!(cfg.retry_delay(1), Duration::from_millis(200));
        assert_eq!(cfg.retry_delay(3), Duration::from_millis(600));
    }

    #[test]
    fn env_or_usa_default_si_no_parsea() {
        std::env::set_var("MASTER_TEST_BAD_NUMBER", "no-es-numero");
        assert_eq!(env_or("MASTER_TEST_BAD_NUMBER", 7u64), 7);
        assert_eq!(env_or("MASTER_TEST_VARIABLE_INEXISTENTE", 3usize), 3);
    }

    #[test]
    fn env_or_respeta_la_variable() {
        std::env::set_var("MASTER_TEST_LOCAL_WORKERS", "5");
        assert_eq!(env_or("MASTER_TEST_LOCAL_WORKERS", 1usize), 5);
    }
}
