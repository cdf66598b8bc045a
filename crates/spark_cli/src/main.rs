use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use spark_core::{MetricsVector, PersistenceBackend, SparkConfig};
use spark_memory::{
    GraphPersistence, GraphStore, JsonFilePersistence, SessionCoordinator, SqlitePersistence,
};

#[derive(Parser, Debug)]
#[command(name = "spark", author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "SPARK_CONFIG", default_value = "spark.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select voice, phase and ritual triggers for one or more metric vectors
    ///
    /// Vectors given with repeated --metrics are evaluated in order within
    /// one session, so inertia and sustained triggers carry across them.
    Evaluate {
        /// Metrics as a JSON object, e.g. '{"pain":0.9}'
        #[arg(short, long, required = true)]
        metrics: Vec<String>,
    },
    /// Evaluate a vector and store it as an observation in the graph
    ///
    /// Each call is a fresh session: voice inertia and ritual history do not
    /// carry over between calls, so sustained triggers such as pain_shatter
    /// never fire here. Use repeated --metrics on `evaluate` for that.
    Observe {
        #[arg(short, long)]
        store: Option<PathBuf>,
        #[arg(short, long)]
        metrics: String,
        /// Observation text
        #[arg(long)]
        content: String,
        #[arg(long = "type", default_value = "message")]
        node_type: String,
    },
    /// Inspect a persisted graph
    Graph {
        #[command(subcommand)]
        action: GraphCommand,
    },
    /// Rank stored nodes by resonance with a metric vector
    Recall {
        #[arg(short, long)]
        store: Option<PathBuf>,
        #[arg(short, long)]
        metrics: String,
        #[arg(short, long, default_value_t = 0.0)]
        threshold: f32,
    },
}

#[derive(Subcommand, Debug)]
enum GraphCommand {
    /// Node and edge counts
    Stats {
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
    /// Full graph as JSON
    Export {
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Logs go to stderr; stdout carries JSON only.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = SparkConfig::load_or_default(&cli.config);

    match cli.command {
        Command::Evaluate { metrics } => {
            let session = SessionCoordinator::new(&config);
            for raw in &metrics {
                let m = parse_metrics(raw)?;
                let eval = session.evaluate(&m);
                print_json(&json!({
                    "voice": eval.voice,
                    "phase": eval.phase,
                    "triggers": eval.triggers,
                }))?;
            }
        }
        Command::Observe {
            store,
            metrics,
            content,
            node_type,
        } => {
            let m = parse_metrics(&metrics)?;
            let persistence = open_persistence(&config, store).await?;
            let session = restored_session(&config, persistence.as_ref()).await?;

            let obs = session
                .observe(&node_type, &content, &m)
                .context("Failed to store observation")?;
            let mut rituals = Vec::new();
            for trigger in &obs.evaluation.triggers {
                rituals.push(
                    session
                        .record_ritual(trigger, Some(&obs.node_id))
                        .context("Failed to record ritual")?,
                );
            }
            session.checkpoint(persistence.as_ref()).await?;
            print_json(&json!({
                "nodeId": obs.node_id,
                "voice": obs.evaluation.voice,
                "phase": obs.evaluation.phase,
                "edges": obs.edges.len(),
                "rituals": rituals,
            }))?;
        }
        Command::Graph { action } => match action {
            GraphCommand::Stats { store } => {
                let persistence = open_persistence(&config, store).await?;
                let session = restored_session(&config, persistence.as_ref()).await?;
                print_json(&session.store().stats())?;
            }
            GraphCommand::Export { store } => {
                let persistence = open_persistence(&config, store).await?;
                let session = restored_session(&config, persistence.as_ref()).await?;
                println!("{}", session.store().export_json()?);
            }
        },
        Command::Recall {
            store,
            metrics,
            threshold,
        } => {
            let m = parse_metrics(&metrics)?;
            let persistence = open_persistence(&config, store).await?;
            let session = restored_session(&config, persistence.as_ref()).await?;
            let hits: Vec<_> = session
                .recall(&m, threshold)
                .into_iter()
                .map(|s| {
                    json!({
                        "id": s.node.id,
                        "layer": s.node.layer,
                        "type": s.node.node_type,
                        "content": s.node.content,
                        "score": s.score,
                    })
                })
                .collect();
            print_json(&hits)?;
        }
    }

    Ok(())
}

fn parse_metrics(raw: &str) -> Result<MetricsVector> {
    let m: MetricsVector =
        serde_json::from_str(raw).with_context(|| format!("Invalid metrics JSON: {}", raw))?;
    Ok(m.sanitized())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `--store` overrides the configured path; the backend always comes from config.
async fn open_persistence(
    config: &SparkConfig,
    store: Option<PathBuf>,
) -> Result<Box<dyn GraphPersistence>> {
    let path = store.unwrap_or_else(|| config.persistence.path.clone());
    Ok(match config.persistence.backend {
        PersistenceBackend::Json => Box::new(JsonFilePersistence::new(path)),
        PersistenceBackend::Sqlite => Box::new(
            SqlitePersistence::new(&path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
    })
}

async fn restored_session(
    config: &SparkConfig,
    persistence: &dyn GraphPersistence,
) -> Result<SessionCoordinator> {
    let store = Arc::new(GraphStore::new(config.graph.clone()));
    let session = SessionCoordinator::with_store(store, config);
    if !session.restore(persistence).await? {
        tracing::info!("No saved graph yet, starting from the canonical set");
    }
    Ok(session)
}
