use std::{env, str::FromStr, time::Duration};

const DEFAULT_MASTER_BASE_URL: &str = "http://master:8080";
const DEFAULT_WORKER_CONCURRENCY: u32 = 2;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SIMULATED_WORK_MS: u64 = 200;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 5;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub master_base_url: String,
    pub concurrency: u32,
    pub job_timeout: Duration,
    /// Latencia artificial por job, para simular la llamada al modelo
    pub simulated_work: Duration,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            master_base_url: env::var("MASTER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MASTER_BASE_URL.to_string()),
            concurrency: env_or("WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY).max(1),
            job_timeout: Duration::from_secs(env_or("JOB_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT_SECS)),
            simulated_work: Duration::from_millis(env_or(
                "SIMULATED_WORK_MS",
                DEFAULT_SIMULATED_WORK_MS,
            )),
            heartbeat_interval: Duration::from_secs(env_or(
                "HEARTBEAT_INTERVAL_SECS",
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
            )),
            poll_interval: Duration::from_millis(env_or(
                "WORKER_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.master_base_url.trim_end_matches('/'), path)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}
