//! Seatwise - Main Server
//!
//! Seating optimizer server plus offline `optimize` / `score` commands over
//! exported event documents.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use seatwise::constraints;
use seatwise::events::EventBus;
use seatwise::export::EventDocument;
use seatwise::jobs::JobState;
use seatwise::scoring::score_assignment;
use seatwise::service::{OptimizeRequest, SeatingService};
use seatwise::store::InMemorySeatingStore;
use seatwise::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "seatwise")]
#[command(about = "Relationship-aware seating optimizer")]
struct Cli {
    /// Path to the YAML config file (defaults to ./config.yaml)
    #[arg(long, global = true, env = "SEATWISE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP / WebSocket server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep everything in memory instead of the data directory
        #[arg(long)]
        in_memory: bool,
    },

    /// Optimize an exported event document and write it back with the
    /// candidates added as draft arrangements
    Optimize {
        /// Event document (JSON)
        input: PathBuf,

        /// Output path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        candidates: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        max_iterations: Option<u64>,

        #[arg(long)]
        time_budget_ms: Option<u64>,

        /// Generate this many tables instead of using the document's
        #[arg(long)]
        table_count: Option<u32>,

        #[arg(long)]
        table_capacity: Option<u32>,
    },

    /// Print score and constraint violations for every arrangement in a document
    Score {
        /// Event document (JSON)
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing (stderr, so document output on stdout stays clean)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,seatwise=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, in_memory } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            if in_memory {
                config.storage_backend = seatwise::StorageBackend::Memory;
            }
            seatwise::start_server(config).await
        }
        Commands::Optimize {
            input,
            output,
            candidates,
            seed,
            max_iterations,
            time_budget_ms,
            table_count,
            table_capacity,
        } => {
            let req = OptimizeRequest {
                candidates,
                seed,
                max_iterations,
                time_budget_ms,
                table_count,
                table_capacity,
                ..Default::default()
            };
            run_optimize(config, &input, output.as_deref(), req).await
        }
        Commands::Score { input } => run_score(&input),
    }
}

fn read_document(path: &Path) -> Result<EventDocument> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    EventDocument::from_json(&json).with_context(|| format!("Invalid event document {}", path.display()))
}

async fn run_optimize(
    config: Config,
    input: &Path,
    output: Option<&Path>,
    req: OptimizeRequest,
) -> Result<()> {
    let document = read_document(input)?;
    let service = Arc::new(SeatingService::new(
        Arc::new(InMemorySeatingStore::new()),
        Arc::new(EventBus::default()),
        config.optimizer,
    ));
    let event = service.import_event(document).await?;
    tracing::info!(
        "Optimizing '{}': {} guests, {} relationships",
        event.name,
        event.guest_count,
        event.relationship_count
    );

    let job_id = service.start_optimization(event.id, req).await?.job_id;

    let mut rx = service.subscribe_job(job_id).await?;
    let logger = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            tracing::info!(percent = status.progress_percent, "{}", status.message);
            if status.state.is_finished() {
                break;
            }
        }
    });

    let wait = service.wait_for_job(job_id);
    tokio::pin!(wait);
    let status = tokio::select! {
        status = &mut wait => status?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, keeping the best arrangements found so far");
            service.cancel_job(job_id).await?;
            wait.await?
        }
    };
    logger.abort();

    if status.state == JobState::Failed {
        bail!(
            "Optimization failed: {}",
            status.error.unwrap_or(status.message)
        );
    }

    for arrangement in service.job_result(job_id).await.unwrap_or_default() {
        tracing::info!(
            "{}: overall {:.1} (satisfaction {:.1}, conflicts {:.1}, balance {:.1})",
            arrangement.name,
            arrangement.score.overall,
            arrangement.score.satisfaction,
            arrangement.score.conflict_resolution,
            arrangement.score.balance
        );
    }

    let json = service.export_event(event.id).await?.to_json()?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn run_score(input: &Path) -> Result<()> {
    let event = read_document(input)?.into_event()?;
    let settings = *event.arrangements.settings();

    let report: Vec<serde_json::Value> = event
        .arrangements
        .iter()
        .map(|arrangement| {
            let score = score_assignment(
                &event.graph,
                &arrangement.tables,
                &arrangement.assignment,
                &settings.weights,
                settings.strength_threshold,
            );
            let violations = constraints::validate(&arrangement.tables, &arrangement.assignment, &event.graph);
            serde_json::json!({
                "id": arrangement.id,
                "name": arrangement.name,
                "status": arrangement.status,
                "score": score,
                "violations": violations,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
