//! Command-line surface: run a triage against the demo dataset and stream
//! its events as JSON lines, with a keepalive printed on idle intervals the
//! way a long-poll consumer would expect.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::config::EngineConfig;
use crate::core::{SimulationPlan, TriageEngine};
use crate::data::MemoryData;
use crate::domain::TriageStep;
use crate::store::{FileRunStore, RunStore};

#[derive(Parser, Debug)]
#[command(name = "trisk")]
#[command(about = "Fraud-alert triage orchestration engine", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Triage an alert from the demo dataset and stream its events
    Run {
        /// Alert identifier (see `trisk alerts`)
        alert_id: String,

        /// Force a step to time out on every attempt (repeatable)
        #[arg(long = "simulate-timeout", value_name = "STEP")]
        simulate_timeout: Vec<String>,

        /// Directory for run records and traces
        #[arg(long, env = "TRISK_HOME", default_value = ".trisk")]
        home: PathBuf,
    },

    /// List the alerts in the demo dataset
    Alerts,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                alert_id,
                simulate_timeout,
                home,
            } => run(alert_id, simulate_timeout, home).await,
            Commands::Alerts => alerts(),
        }
    }
}

async fn run(alert_id: String, simulate_timeout: Vec<String>, home: PathBuf) -> Result<()> {
    let config = EngineConfig::load()?;
    let heartbeat = config.heartbeat();

    let steps = simulate_timeout
        .iter()
        .map(|name| name.parse::<TriageStep>())
        .collect::<Result<Vec<_>, _>>()
        .context("invalid --simulate-timeout step")?;
    let simulation = SimulationPlan::timeout_on(steps);

    let data = Arc::new(MemoryData::demo());
    let store = Arc::new(FileRunStore::new(home.join("runs")));
    let engine = TriageEngine::new(config, data, store.clone());

    let (run_id, mut events) = engine.start_run_streaming(&alert_id, simulation).await?;
    println!(
        "{}",
        serde_json::json!({ "runId": run_id, "alertId": alert_id })
    );

    loop {
        match tokio::time::timeout(heartbeat, events.recv()).await {
            Ok(Ok(event)) => {
                println!("{}", serde_json::to_string(&event)?);
                if event.is_terminal() {
                    break;
                }
            }
            Ok(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "stream lagging, events dropped");
            }
            Ok(Err(RecvError::Closed)) => break,
            Err(_idle) => {
                println!("{}", serde_json::json!({ "type": "keepalive" }));
            }
        }
    }

    if let Some(record) = store.load_record(run_id).await? {
        println!("{}", serde_json::to_string(&record)?);
    }

    Ok(())
}

fn alerts() -> Result<()> {
    // Matches the fixtures staged by MemoryData::demo()
    for (id, note) in [
        ("alert-high", "high-value activity across countries"),
        ("alert-low", "routine grocery activity"),
        ("alert-medium", "single odd purchase"),
        ("alert-dup", "pending authorization later captured"),
        ("alert-ghost", "no suspect transaction attached"),
    ] {
        println!("{id:<14} {note}");
    }
    Ok(())
}
