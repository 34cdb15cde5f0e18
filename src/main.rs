use anyhow::Context;
use clap::{Parser, Subcommand};
use lsn_router::router::replica_route;
use lsn_router::{
    LogPosition, PgScalarQuery, ReplicationStatusSource, RouterConfig, SqlReplicationStatus,
};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

/// Inspect the replication positions used for read routing
#[derive(Parser)]
#[command(name = "lsn-router", version)]
struct Cli {
    /// JSON config file (LSN_ROUTER_* environment variables otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query the primary and replica positions
    Status {
        /// Position a principal last wrote; prints where its reads would go
        #[arg(long)]
        since: Option<LogPosition>,
    },
    /// Compare two positions
    Compare { a: LogPosition, b: LogPosition },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Compare { a, b } => {
            compare(&a, &b);
            Ok(())
        }
        Command::Status { since } => {
            let config = load_config(cli.config)?;
            status(&config, since).await
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<RouterConfig> {
    match path {
        Some(path) => RouterConfig::from_json_file(&path)
            .with_context(|| format!("load config from {}", path.display())),
        None => RouterConfig::from_env().context("load config from environment"),
    }
}

fn compare(a: &LogPosition, b: &LogPosition) {
    let relation = match a.cmp(b) {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };
    println!("{} {} {}", a, relation, b);
    println!("distance {} bytes", a.as_u64().abs_diff(b.as_u64()));
}

async fn status(config: &RouterConfig, since: Option<LogPosition>) -> anyhow::Result<()> {
    let client = PgScalarQuery::connect(config)
        .await
        .context("connect to primary and replica")?;
    let status = SqlReplicationStatus::from_config(Arc::new(client), config);

    let primary = status
        .current_primary_position()
        .await
        .context("query primary position")?;
    let replica = status
        .last_replica_received_position()
        .await
        .context("query replica position")?;

    println!("primary  {}", primary);
    println!("replica  {}", replica);
    println!("lag      {} bytes", primary.byte_lag(&replica));

    if let Some(since) = since {
        println!("route    {}", replica_route(&since, &replica));
    }
    Ok(())
}
