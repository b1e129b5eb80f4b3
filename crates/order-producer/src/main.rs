use anyhow::{Context, Result};
use bench_core::{Config, MockOrderedSender, OrderedDispatcher, OrderedSender, OrderedSummary};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "order-producer")]
#[command(about = "Ordered producer - drains a fixed message count through keyed, partition-affine sends")]
#[command(after_help = "example: order-producer -n localhost:9876 -t local_test -g local_test -d data -m 100 -w 10\n\n\
per-message send results are logged at debug level: RUST_LOG=debug order-producer ...")]
struct Args {
    /// Optional configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name server address
    #[arg(short = 'n', long)]
    name_server: Option<String>,

    /// Topic name
    #[arg(short = 't', long)]
    topic: Option<String>,

    /// Producer group id
    #[arg(short = 'g', long)]
    group_id: Option<String>,

    /// Message body
    #[arg(short = 'd', long)]
    body: Option<String>,

    /// Total number of messages to send
    #[arg(short = 'm', long)]
    message_count: Option<u64>,

    /// Number of concurrent workers
    #[arg(short = 'w', long)]
    worker_count: Option<u32>,

    /// Partition key carried by every message
    #[arg(long)]
    order_key: Option<u64>,

    /// Retries per message before it is given up
    #[arg(long)]
    max_retries: Option<u32>,

    /// Partitions of the mock topic
    #[arg(long, default_value = "8")]
    partitions: usize,

    /// Simulated round trip of the mock sender
    #[arg(long, default_value = "1")]
    mock_latency_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &args);
    config
        .validate_ordered()
        .context("Invalid ordered producer parameters")?;

    let sender: Arc<dyn OrderedSender> = Arc::new(
        MockOrderedSender::new(args.partitions, Duration::from_millis(args.mock_latency_ms))
            .context("Failed to create ordered sender")?,
    );
    info!(
        "Using sender: {} ({} partitions)",
        sender.name(),
        sender.partitions()
    );

    let dispatcher = OrderedDispatcher::new(config.target.clone(), config.ordered.clone());
    let summary = dispatcher.run(sender).await?;

    print_summary(&summary);
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(name_server) = &args.name_server {
        config.target.name_server = name_server.clone();
    }
    if let Some(topic) = &args.topic {
        config.target.topic = topic.clone();
    }
    if let Some(group_id) = &args.group_id {
        config.target.group_id = group_id.clone();
    }
    if let Some(body) = &args.body {
        config.ordered.body = body.clone();
    }
    if let Some(count) = args.message_count {
        config.ordered.message_count = count;
    }
    if let Some(workers) = args.worker_count {
        config.ordered.worker_count = workers;
    }
    if let Some(key) = args.order_key {
        config.ordered.order_key = key;
    }
    if let Some(retries) = args.max_retries {
        config.ordered.max_retries = retries;
    }
}

fn print_summary(summary: &OrderedSummary) {
    println!("\n=== Ordered Producer Summary ===");
    println!("Duration: {}ms", summary.elapsed.as_millis());
    println!("Dispatched: {}", summary.dispatched);
    println!("Succeeded: {}", summary.succeeded);
    println!("Failed: {}", summary.failed);
    println!();
}
