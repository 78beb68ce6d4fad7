//! Fault-tolerant scatter-gather coordination for distributed search nodes.
//!
//! A [`SearchCoordinator`](coordinator::SearchCoordinator) fans one logical
//! query out to a dynamic set of independently addressable nodes, tolerates
//! partial failure, merges the per-node result sets into one ranked,
//! paginated answer, and keeps node health and aggregate performance
//! statistics current while admin traffic mutates the cluster underneath it.
//!
//! Module map:
//!
//! - **[`config`]**: the atomically replaceable runtime config.
//! - **[`error`]**: coordinator-level and per-node error taxonomy.
//! - **[`model`]**: hits, per-node responses, aggregate results, snapshots.
//! - **[`backend`]**: the pluggable search-node client boundary.
//! - **[`cluster`]**: node registry, health monitoring, load balancing.
//! - **[`coordinator`]**: the search orchestrator, merger, and stats.

pub mod backend;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};

use backend::{HttpBackend, SearchBackend};
use cluster::balance::LoadBalanceStrategy;
use config::CoordinatorConfig;
use coordinator::merge::MergeStrategy;
use coordinator::SearchCoordinator;
use model::AggregateResult;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "fanout-search",
    version,
    about = "Scatter-gather search across independently addressable nodes"
)]
pub struct Cli {
    /// Emit machine-readable JSON instead of human output
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one search across a set of node URLs
    Search {
        /// Query string
        query: String,

        /// Node base URL; repeat once per node
        #[arg(long = "node", required = true)]
        nodes: Vec<String>,

        /// Maximum merged hits to return
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Merged hits to skip before the page starts
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Merge strategy
        #[arg(long, value_enum, default_value_t = MergeStrategy::ScoreDesc)]
        merge: MergeStrategy,

        /// Load balancing strategy
        #[arg(long, value_enum, default_value_t = LoadBalanceStrategy::Broadcast)]
        balance: LoadBalanceStrategy,

        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Retries per node on transient failure
        #[arg(long)]
        max_retries: Option<u32>,
    },
    /// Probe one node URL and report whether it answers
    Probe {
        /// Node base URL
        node: String,

        /// Probe timeout in milliseconds
        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,
    },
    /// Validate a coordinator config file and print the effective value
    ConfigCheck {
        /// Path to a TOML config file
        path: PathBuf,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            query,
            nodes,
            limit,
            offset,
            merge,
            balance,
            timeout_ms,
            max_retries,
        } => {
            let mut config = CoordinatorConfig::from_env();
            config.merge_strategy = merge;
            config.load_balancing = balance;
            if let Some(ms) = timeout_ms {
                config.timeout_ms = ms;
            }
            if let Some(n) = max_retries {
                config.max_retries = n;
            }
            run_search(cli.json, &query, &nodes, limit, offset, config).await
        }
        Commands::Probe { node, timeout_ms } => run_probe(cli.json, &node, timeout_ms).await,
        Commands::ConfigCheck { path } => run_config_check(cli.json, &path),
    }
}

async fn run_search(
    json: bool,
    query: &str,
    nodes: &[String],
    limit: usize,
    offset: usize,
    config: CoordinatorConfig,
) -> Result<()> {
    let coordinator = SearchCoordinator::start(config, HttpBackend::new()?)?;
    coordinator.add_nodes(
        nodes
            .iter()
            .enumerate()
            .map(|(i, url)| (format!("node-{}", i + 1), url.clone(), 1.0)),
    )?;

    let result = coordinator.search(query, limit, offset).await;
    coordinator.shutdown().await;
    let aggregate = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&aggregate)?);
    } else {
        print_aggregate(&aggregate);
    }
    Ok(())
}

fn print_aggregate(aggregate: &AggregateResult) {
    println!(
        "{} hits total, {} returned, slowest node {}ms",
        aggregate.total_hits,
        aggregate.hits.len(),
        aggregate.took_ms
    );
    for hit in &aggregate.hits {
        println!(
            "  {:>8.4}  {}  {}",
            hit.score,
            hit.node_id,
            serde_json::Value::Object(hit.fields.clone())
        );
    }
    for error in &aggregate.errors {
        eprintln!("  node failed: {error}");
    }
}

async fn run_probe(json: bool, node: &str, timeout_ms: u64) -> Result<()> {
    let backend = HttpBackend::new()?;
    let started = Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        backend.search(node, "", 1, 0),
    )
    .await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let (healthy, detail) = match outcome {
        Ok(Ok(_)) => (true, String::new()),
        Ok(Err(err)) => (false, err.to_string()),
        Err(_) => (false, format!("timed out after {timeout_ms}ms")),
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "node": node,
                "healthy": healthy,
                "latency_ms": latency_ms,
                "error": if detail.is_empty() { None } else { Some(detail.clone()) },
            })
        );
    } else if healthy {
        println!("{node}: healthy ({latency_ms}ms)");
    } else {
        println!("{node}: unhealthy ({detail})");
    }

    if healthy {
        Ok(())
    } else {
        anyhow::bail!("probe failed: {detail}")
    }
}

fn run_config_check(json: bool, path: &std::path::Path) -> Result<()> {
    let config = CoordinatorConfig::from_toml_file(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{} is valid", path.display());
        println!(
            "  timeout_ms={} max_retries={} merge={} balance={} health_check_interval_ms={}",
            config.timeout_ms,
            config.max_retries,
            config.merge_strategy.as_str(),
            config.load_balancing.as_str(),
            config.health_check_interval_ms
        );
    }
    Ok(())
}
