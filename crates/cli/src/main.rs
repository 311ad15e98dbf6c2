use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use events::{EventBus, EventEnvelope};
use multiverse_core::{LifecycleOp, TopologyConfig};
use orchestrator::{ConvergenceConfig, Integration, Multiverse, ReadinessConfig};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "topology.toml";
const BEFORE: &str = "before";

#[derive(Parser)]
#[command(name = "multiverse")]
#[command(about = "Bring up and drive acceptance-test topologies", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Topology file describing the running apps
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Print progress events as JSON lines
    #[arg(long, global = true)]
    events: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured apps and what they expose
    Apps,
    /// Wait for every app with a status endpoint to come online
    Check {
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Run one lifecycle operation, or `before` for pause + before-each + resume
    Run { op: String },
    /// Sync apps until a round reports no changes
    Sync {
        #[arg(long)]
        max_rounds: Option<u32>,
    },
    /// Make exactly these apps the integrated topology and run before-all
    Integrate {
        #[arg(required = true)]
        apps: Vec<String>,
    },
    /// Run after-all on the configured topology
    Teardown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let bus = EventBus::new();
    let printer = cli.events.then(|| print_events(&bus));

    let result = match cli.command {
        Commands::Apps => apps(&cli.config),
        Commands::Check { timeout_secs } => check(&cli.config, timeout_secs, bus.clone()).await,
        Commands::Run { op } => run(&cli.config, &op, bus.clone()).await,
        Commands::Sync { max_rounds } => sync(&cli.config, max_rounds, bus.clone()).await,
        Commands::Integrate { apps } => integrate(&cli.config, apps, bus.clone()).await,
        Commands::Teardown => teardown(&cli.config, bus.clone()).await,
    };

    // The printer stops once the last sender is gone and the backlog is
    // written.
    drop(bus);
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            tracing::warn!("Event printer failed: {}", e);
        }
    }

    result
}

fn load(path: &Path) -> Result<TopologyConfig> {
    TopologyConfig::load(path)
        .with_context(|| format!("Failed to load topology from {}", path.display()))
}

fn integration(path: &Path, bus: EventBus) -> Result<Integration> {
    Ok(Integration::from_config(load(path)?)?.with_event_bus(bus))
}

fn apps(path: &Path) -> Result<()> {
    let config = load(path)?;
    let collaborators = config.collaborators()?;

    if collaborators.is_empty() {
        println!("No apps configured in {}", path.display());
        return Ok(());
    }

    println!("Apps ({}):", collaborators.len());
    for info in &collaborators {
        println!("  {} [{}]", info.name, info.capabilities());
        if let Some(url) = &info.status_url {
            println!("      status:       {}", url);
        }
        if let Some(url) = &info.test_support_url {
            println!("      test support: {}", url);
        }
    }
    Ok(())
}

async fn check(path: &Path, timeout_secs: Option<u64>, bus: EventBus) -> Result<()> {
    let config = load(path)?;
    let mut readiness = ReadinessConfig::from(&config.readiness);
    if let Some(secs) = timeout_secs {
        readiness = readiness.with_timeout(Duration::from_secs(secs));
    }

    let integration = Integration::from_config(config)?
        .with_readiness(readiness)
        .with_event_bus(bus);
    integration.check_configuration().await?;

    println!("All apps online: {}", join(&integration.integrated_apps()));
    Ok(())
}

async fn run(path: &Path, op: &str, bus: EventBus) -> Result<()> {
    let integration = integration(path, bus)?;
    if op == BEFORE {
        integration.before().await?;
        println!("before finished");
        return Ok(());
    }

    let op: LifecycleOp = op.parse()?;
    let run = integration.run_lifecycle(op).await?;
    println!("{} finished", op);
    for step in &run.steps {
        println!("  phase {}: {}", step.phase, step.collaborators.join(", "));
    }
    Ok(())
}

async fn sync(path: &Path, max_rounds: Option<u32>, bus: EventBus) -> Result<()> {
    let config = load(path)?;
    let mut convergence = ConvergenceConfig::from(&config.sync);
    if let Some(max_rounds) = max_rounds {
        convergence = convergence.with_max_rounds(max_rounds);
    }

    let summary = Integration::from_config(config)?
        .with_convergence(convergence)
        .with_event_bus(bus)
        .sync_apps()
        .await?;

    println!(
        "Synced in {} round(s), {} change(s) applied",
        summary.rounds, summary.total_changes
    );
    Ok(())
}

async fn integrate(path: &Path, apps: Vec<String>, bus: EventBus) -> Result<()> {
    let wanted: BTreeSet<String> = apps.into_iter().collect();
    let mut multiverse = Multiverse::from_file(path)
        .await
        .with_context(|| format!("Failed to load topology from {}", path.display()))?
        .with_event_bus(bus);

    let integration = multiverse.integrate(&wanted).await?;
    println!("Integrated: {}", join(&integration.integrated_apps()));
    Ok(())
}

async fn teardown(path: &Path, bus: EventBus) -> Result<()> {
    integration(path, bus)?
        .after_all()
        .await
        .context("after-all failed")
}

fn join(apps: &BTreeSet<String>) -> String {
    apps.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn print_events(bus: &EventBus) -> JoinHandle<usize> {
    tokio::spawn(write_events(bus.subscribe(), std::io::stdout()))
}

/// Write each event as a JSON line until the bus closes. Returns how many
/// lines were written.
async fn write_events<W: Write>(mut rx: broadcast::Receiver<EventEnvelope>, mut out: W) -> usize {
    let mut written = 0;
    loop {
        let envelope = match rx.recv().await {
            Ok(envelope) => envelope,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer fell behind, events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let line = match serde_json::to_string(&envelope) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to encode event: {}", e);
                continue;
            }
        };
        if let Err(e) = writeln!(out, "{}", line) {
            tracing::warn!("Failed to write event: {}", e);
            break;
        }
        written += 1;
    }
    written
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "multiverse=info,orchestrator=info,remote=info,provisioner=info".into()
            }),
        )
        .init();
}
