use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{local::run_local, JobResults, StatusResponse, WordCount};
use reqwest::Client;
use std::{env, fs, time::Duration};

/// Igual que en el worker:
/// - MASTER_URL si está definida
/// - Local: default http://127.0.0.1:5000
fn master_base_url() -> String {
    env::var("MASTER_URL")
        .map(|url| url.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fase y progreso del job
    Status {
        /// Imprime la respuesta JSON completa
        #[arg(long)]
        json: bool,
    },
    /// Resultado final (sólo cuando el job terminó)
    Results,
    /// Workers registrados
    Workers,
    /// Corre el wordcount en este proceso, sin master ni workers
    Local {
        #[arg(value_name = "ARCHIVO", required = true)]
        inputs: Vec<String>,

        #[arg(long, default_value_t = 20)]
        top: usize,
    },
}

async fn fetch_status(client: &Client, base_url: &str) -> Result<StatusResponse> {
    let url = format!("{}/status", base_url);
    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("no se pudo contactar al master en {base_url}"))?
        .error_for_status()?;
    Ok(resp.json().await?)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
    let base_url = master_base_url();

    match cli.command {
        Commands::Status { json } => {
            let status = fetch_status(&client, &base_url).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }

            println!("Job {}:", status.job_id);
            println!("  fase: {:?}", status.phase);
            println!("  workers: {}", status.workers);
            println!("  map: {}", status.map_progress);
            println!("  reduce: {}", status.reduce_progress);
            if let Some(started) = status.started_at {
                println!("  iniciado: {}", started);
            }
            if let Some(done) = status.finished_at {
                println!("  finalizado: {}", done);
            }
            for f in &status.failures {
                match f.worker_id {
                    Some(w) => println!("  FALLO {} (worker {}): {}", f.task_id, w, f.reason),
                    None => println!("  FALLO {}: {}", f.task_id, f.reason),
                }
            }
        }

        Commands::Results => {
            let url = format!("{}/results", base_url);
            let resp = client.get(&url).send().await?;

            if resp.status().is_success() {
                let results: JobResults = resp.json().await?;
                println!("Resultados del job {}:", results.job_id);
                println!("  archivo: {}", results.final_results);
                println!("  claves únicas: {}", results.unique_keys);
                for (i, kc) in results.top.iter().enumerate() {
                    println!("  {:>2}. {}: {}", i + 1, kc.key, kc.value);
                }
            } else {
                println!("Todavía no hay resultados (status {})", resp.status());
            }
        }

        Commands::Workers => {
            let status = fetch_status(&client, &base_url).await?;
            if status.worker_list.is_empty() {
                println!("No hay workers registrados");
            }
            for w in &status.worker_list {
                println!(
                    "  worker {} @ {} [{:?}] host={} tareas={} desde {}",
                    w.worker_id,
                    w.address,
                    w.status,
                    w.hostname.as_deref().unwrap_or("-"),
                    w.tasks_assigned,
                    w.registered_at
                );
            }
        }

        Commands::Local { inputs, top } => {
            let mut texts = Vec::with_capacity(inputs.len());
            for path in &inputs {
                texts.push(
                    fs::read_to_string(path).with_context(|| format!("no se pudo leer {path}"))?,
                );
            }

            let counts = run_local(&WordCount, &texts);
            println!("{} claves únicas en {} archivos", counts.len(), inputs.len());
            for (i, (key, value)) in counts.iter().take(top).enumerate() {
                println!("  {:>2}. {}: {}", i + 1, key, value);
            }
        }
    }

    Ok(())
}
