use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use common::{CreatePlanRequest, Plan, PlanMode, PlanReport, WorkerMetrics};
use reqwest::{Client, Response};
use std::env;

/// Igual que en el worker:
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Envía un objetivo nuevo; el master lo convierte en un plan
    Submit {
        #[arg(value_name = "OBJETIVO")]
        goal: String,

        #[arg(long, value_enum, default_value_t = Mode::Standard)]
        mode: Mode,

        /// Dueño del plan (si falta, el master genera uno)
        #[arg(long)]
        user: Option<String>,
    },
    /// Consulta el estado de un plan
    Status {
        #[arg(value_name = "PLAN_ID")]
        id: String,
    },
    /// Lista los planes, del más nuevo al más viejo
    List,
    /// Muestra estado, salida y último error de cada tarea
    Results {
        #[arg(value_name = "PLAN_ID")]
        id: String,
    },
    /// Cancela un plan
    Cancel {
        #[arg(value_name = "PLAN_ID")]
        id: String,
    },

    Workers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Lightning,
    Standard,
    Custom,
}

impl From<Mode> for PlanMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Lightning => PlanMode::Lightning,
            Mode::Standard => PlanMode::Standard,
            Mode::Custom => PlanMode::Custom,
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Submit { goal, mode, user } => {
            let url = format!("{}/api/v1/plans", base_url);
            let req = CreatePlanRequest {
                goal,
                mode: mode.into(),
                user_id: user,
                constraints: None,
            };

            let resp = client.post(&url).json(&req).send().await?;
            if resp.status().is_success() {
                let plan: Plan = resp.json().await?;
                println!("Plan creado:");
                print_plan(&plan);
            } else {
                println!("Error creando el plan: {}", error_message(resp).await);
            }
        }

        Commands::Status { id } => {
            let url = format!("{}/api/v1/plans/{}", base_url, id);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let plan: Plan = resp.json().await?;
                println!("Plan:");
                print_plan(&plan);
            } else {
                println!("Error: {}", error_message(resp).await);
            }
        }

        Commands::List => {
            let url = format!("{}/api/v1/plans", base_url);
            let plans: Vec<Plan> = client.get(&url).send().await?.json().await?;
            if plans.is_empty() {
                println!("No hay planes.");
            }
            for p in plans {
                println!(
                    "{}  {:<10} {}  {}",
                    p.id,
                    format!("{:?}", p.status).to_lowercase(),
                    progress_line(&p),
                    p.title
                );
            }
        }

        Commands::Results { id } => {
            let url = format!("{}/api/v1/plans/{id}/results", base_url);
            let resp = client.get(&url).send().await?;

            if resp.status().is_success() {
                let report: PlanReport = resp.json().await?;
                println!("Resultados para plan {}:", report.plan.id);
                println!("  estado: {:?}", report.plan.status);
                for t in &report.tasks {
                    println!(
                        "  - {} [{:?}] reintentos={}/{}",
                        t.title, t.status, t.retry_count, t.max_retries
                    );
                    if let Some(out) = &t.output {
                        println!("      salida: {}", out.content);
                    }
                    if let Some(err) = &t.error {
                        println!("      último error: {}", err);
                    }
                }
            } else {
                println!("No se encontraron resultados para plan {id}");
            }
        }

        Commands::Cancel { id } => {
            let url = format!("{}/api/v1/plans/{id}/cancel", base_url);
            let resp = client.post(&url).send().await?;
            if resp.status().is_success() {
                let plan: Plan = resp.json().await?;
                println!("Plan {} -> {:?}", plan.id, plan.status);
            } else {
                println!("Error cancelando: {}", error_message(resp).await);
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let workers: Vec<WorkerMetrics> = resp.json().await?;
                if workers.is_empty() {
                    println!("No hay workers registrados.");
                } else {
                    for w in workers {
                        print_worker(&w);
                    }
                }
            } else {
                println!(
                    "Error consultando /api/v1/workers (status {})",
                    resp.status()
                );
            }
        }
    }

    Ok(())
}

fn print_plan(plan: &Plan) {
    println!("  id: {}", plan.id);
    println!("  título: {}", plan.title);
    println!("  tipo: {:?}", plan.kind);
    println!("  modo: {:?}", plan.mode);
    println!("  estado: {:?}", plan.status);
    println!("  {}", progress_line(plan));
    println!("  creado: {}", plan.created_at);
    if let Some(started) = &plan.started_at {
        println!("  iniciado: {}", started);
    }
    if let Some(done) = &plan.finished_at {
        println!("  finalizado: {}", done);
    }
}

fn print_worker(w: &WorkerMetrics) {
    println!("Worker {}{}", w.worker_id, if w.local { " (local)" } else { "" });
    println!("  host           : {}", w.hostname);
    println!("  dead           : {}", w.dead);
    println!("  last_heartbeat : {} s ago", w.last_heartbeat_secs_ago);
    println!(
        "  concurrency    : activos={} max={}",
        w.active_jobs, w.max_concurrency
    );
    println!(
        "  jobs           : started={}, ok={}, failed={}",
        w.jobs_started, w.jobs_succeeded, w.jobs_failed
    );
    match w.avg_job_ms {
        Some(avg) => println!("  avg_job_ms     : {:.1}", avg),
        None => println!("  avg_job_ms     : (sin datos)"),
    }
    println!();
}

fn progress_line(plan: &Plan) -> String {
    let p = &plan.progress;
    format!(
        "progreso: {}% ({} de {} completadas, {} fallidas)",
        p.percentage, p.completed, p.total, p.failed
    )
}

/// Mensaje de error del master (`{error, details}`), o el status si no vino JSON.
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<serde_json::Value>().await {
        Ok(body) => {
            let mut msg = body["error"].as_str().unwrap_or("error").to_string();
            if let Some(details) = body["details"].as_array().filter(|d| !d.is_empty()) {
                let details: Vec<&str> = details.iter().filter_map(|d| d.as_str()).collect();
                msg.push_str(&format!(" ({})", details.join("; ")));
            }
            msg
        }
        Err(_) => format!("status {}", status),
    }
}
