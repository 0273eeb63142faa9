use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use entigraph_core::{
    init_tracing, ApplicationScope, ConfigManager, EntityId, FailureMode, ScanError, Settings,
};
use entigraph_graph::MemoryGraphStore;
use entigraph_scan::{ScanEngine, ScanStream};
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "entigraph")]
#[command(about = "Entigraph CLI - Full-system entity and connection scans", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Directory holding default/{env}/local configuration files
    #[arg(long, global = true, env = "ENTIGRAPH_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Configuration environment (defaults to APP_ENV, then RUST_ENV)
    #[arg(long, global = true)]
    env: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed an in-memory store and run a scan over it
    DemoScan(DemoScanArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScanMode {
    /// Every entity of every tenant
    Entities,
    /// Every connection of one seeded source node
    Connections,
}

#[derive(Args)]
struct DemoScanArgs {
    /// What to scan
    #[arg(short, long, value_enum, default_value = "entities")]
    mode: ScanMode,

    /// Tenants to create
    #[arg(long, default_value = "3")]
    tenants: usize,

    /// Collection types per tenant
    #[arg(long, default_value = "2")]
    types: usize,

    /// Upper bound of entities per collection
    #[arg(long, default_value = "10")]
    entities: usize,

    /// Connections leaving the connection-scan source
    #[arg(long, default_value = "10")]
    fan_out: usize,

    /// Seed for the generated data
    #[arg(long, default_value = "7")]
    seed: u64,

    /// Print every scanned item, one JSON document per line
    #[arg(long)]
    list: bool,

    #[command(flatten)]
    scan: ScanOverrides,
}

/// Command line overrides of the `[scan]` settings.
#[derive(Args)]
struct ScanOverrides {
    #[arg(long, env = "ENTIGRAPH_PAGE_SIZE")]
    page_size: Option<usize>,

    #[arg(long, env = "ENTIGRAPH_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    #[arg(long, env = "ENTIGRAPH_PER_CALL_TIMEOUT_MS")]
    per_call_timeout_ms: Option<u64>,

    #[arg(long, env = "ENTIGRAPH_RETRY_ATTEMPTS")]
    retry_attempts: Option<u32>,

    /// Skip failing branches instead of stopping at the first one
    #[arg(long)]
    best_effort: bool,
}

impl ScanOverrides {
    fn apply(&self, settings: &mut Settings) {
        let scan = &mut settings.scan;
        if let Some(page_size) = self.page_size {
            scan.page_size = page_size;
        }
        if let Some(max_concurrency) = self.max_concurrency {
            scan.max_concurrency = max_concurrency;
        }
        if let Some(timeout) = self.per_call_timeout_ms {
            scan.per_call_timeout_ms = timeout;
        }
        if let Some(attempts) = self.retry_attempts {
            scan.retry_attempts = attempts;
        }
        if self.best_effort {
            scan.failure_mode = FailureMode::BestEffort;
        }
    }
}

// Output structures
#[derive(Serialize)]
struct ScanSummary {
    mode: String,
    started_at: String,
    elapsed_ms: u64,
    tenants: usize,
    expected: usize,
    scanned: usize,
    complete: bool,
    cancelled: bool,
    skipped: Vec<String>,
}

/// What the demo store was seeded with.
struct Seeded {
    scopes: Vec<ApplicationScope>,
    entities: usize,
    source: EntityId,
    connections: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = ConfigManager::load(cli.config_dir.clone(), cli.env.clone())
        .context("Failed to load configuration")?;
    if cli.verbose {
        settings.logging.level = "debug".to_string();
    }
    init_tracing(&settings.logging);

    match execute_command(&cli, settings).await {
        Ok(output) => {
            print_output(&cli.output, &output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn execute_command(cli: &Cli, mut settings: Settings) -> Result<serde_json::Value> {
    match &cli.command {
        Commands::DemoScan(args) => {
            args.scan.apply(&mut settings);
            settings.validate().context("Invalid scan settings")?;
            execute_demo_scan(args, &settings).await
        }
        Commands::Config => Ok(serde_json::to_value(&settings)?),
    }
}

fn seed_store(store: &MemoryGraphStore, args: &DemoScanArgs) -> Seeded {
    let mut rng = fastrand::Rng::with_seed(args.seed);
    let mut scopes = Vec::with_capacity(args.tenants);
    let mut members = Vec::new();

    for _ in 0..args.tenants {
        let scope = store.create_scope();
        for t in 0..args.types {
            let entity_type = format!("type{}thing", t + 1);
            for _ in 0..rng.usize(1..=args.entities.max(1)) {
                members.push(store.create_entity(&scope, &entity_type));
            }
        }
        scopes.push(scope);
    }

    let source = members
        .first()
        .cloned()
        .unwrap_or_else(|| EntityId::new("type1thing"));
    for _ in 0..args.fan_out {
        let target = if members.is_empty() {
            EntityId::new("type1thing")
        } else {
            members[rng.usize(..members.len())].clone()
        };
        let edge_type = if rng.bool() { "likes" } else { "follows" };
        store.create_connection(&source, edge_type, &target);
    }

    info!(
        tenants = scopes.len(),
        entities = members.len(),
        connections = args.fan_out,
        "demo store seeded"
    );
    Seeded {
        scopes,
        entities: members.len(),
        source,
        connections: args.fan_out,
    }
}

async fn execute_demo_scan(args: &DemoScanArgs, settings: &Settings) -> Result<serde_json::Value> {
    let store = Arc::new(MemoryGraphStore::new(&settings.store));
    let seeded = seed_store(&store, args);
    let engine = ScanEngine::new(store);

    let started_at = Utc::now();
    let timer = Instant::now();
    let (mode, expected, outcome) = match args.mode {
        ScanMode::Entities => {
            let scan = engine
                .scan_all_entities(&settings.scan)
                .await
                .context("Failed to start entity scan")?;
            ("entities", seeded.entities, drain(scan, args.list).await?)
        }
        ScanMode::Connections => {
            let scan = engine
                .scan_connections(&seeded.source, &settings.scan)
                .await
                .context("Failed to start connection scan")?;
            ("connections", seeded.connections, drain(scan, args.list).await?)
        }
    };

    let summary = ScanSummary {
        mode: mode.to_string(),
        started_at: started_at.to_rfc3339(),
        elapsed_ms: timer.elapsed().as_millis() as u64,
        tenants: seeded.scopes.len(),
        expected,
        scanned: outcome.scanned,
        complete: outcome.skipped.is_empty() && !outcome.cancelled && outcome.scanned == expected,
        cancelled: outcome.cancelled,
        skipped: outcome.skipped,
    };
    Ok(serde_json::to_value(summary)?)
}

struct DrainOutcome {
    scanned: usize,
    skipped: Vec<String>,
    cancelled: bool,
}

/// Consume a scan, cancelling it on Ctrl-C.
async fn drain<T: Serialize>(mut scan: ScanStream<T>, list: bool) -> Result<DrainOutcome> {
    let cancel = scan.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut scanned = 0usize;
    let mut cancelled = false;
    while let Some(next) = scan.next().await {
        match next {
            Ok(item) => {
                scanned += 1;
                if list {
                    println!("{}", serde_json::to_string(&item)?);
                }
            }
            Err(ScanError::Incomplete { .. }) => break,
            Err(ScanError::Cancelled) => {
                cancelled = true;
                break;
            }
            Err(e) => return Err(e).context("Scan failed"),
        }
    }

    Ok(DrainOutcome {
        scanned,
        skipped: scan
            .skipped_branches()
            .iter()
            .map(ToString::to_string)
            .collect(),
        cancelled,
    })
}

fn print_output(format: &OutputFormat, value: &serde_json::Value) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Pretty => {
            print_pretty(value)?;
        }
    }
    Ok(())
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    serde_json::Value::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    serde_json::Value::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    serde_json::Value::Bool(b) => {
                        let val_colored = if *b {
                            "true".green()
                        } else {
                            "false".red()
                        };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    serde_json::Value::Array(items) if items.is_empty() => {
                        println!("{}: {}", key_colored, "none".dimmed());
                    }
                    serde_json::Value::Array(items) => {
                        println!("{}:", key_colored);
                        for item in items {
                            println!("  - {}", item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()));
                        }
                    }
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}
