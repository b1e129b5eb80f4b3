use anyhow::{Context, Result};
use bench_core::{BenchError, BenchmarkController, Config, MessageSender, MockSender, RunSummary};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "producer")]
#[command(about = "Producer benchmark - drives concurrent send loops and reports windowed TPS/RT")]
struct Args {
    /// Optional configuration file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Topic name
    #[arg(short = 't', long)]
    topic: Option<String>,

    /// Name server address
    #[arg(short = 'n', long)]
    name_server: Option<String>,

    /// Producer group id
    #[arg(short = 'g', long)]
    group_id: Option<String>,

    /// Number of concurrent send loops
    #[arg(short = 'i', long)]
    instance_count: Option<u32>,

    /// Test duration in minutes
    #[arg(short = 'm', long)]
    test_minutes: Option<u64>,

    /// Message body size in bytes
    #[arg(short = 's', long)]
    body_size: Option<usize>,

    /// Pause after a failed send, in milliseconds
    #[arg(long)]
    retry_backoff_ms: Option<u64>,

    /// Sender implementation
    #[arg(long, default_value = "mock")]
    mode: String,

    /// Simulated round trip of the mock sender
    #[arg(long, default_value = "5")]
    mock_latency_ms: u64,

    /// Make every Nth mock send fail (0 disables)
    #[arg(long, default_value = "0")]
    mock_fail_every: u64,
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
        .validate_producer()
        .context("Invalid benchmark parameters")?;

    let sender = build_sender(&args)?;
    info!("Using sender: {}", sender.name());

    let controller = BenchmarkController::new(config);
    let summary = controller.run(sender, interrupted()).await?;

    print_summary(&summary);
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(topic) = &args.topic {
        config.target.topic = topic.clone();
    }
    if let Some(name_server) = &args.name_server {
        config.target.name_server = name_server.clone();
    }
    if let Some(group_id) = &args.group_id {
        config.target.group_id = group_id.clone();
    }
    if let Some(n) = args.instance_count {
        config.producer.instance_count = n;
    }
    if let Some(minutes) = args.test_minutes {
        config.producer.duration_ms = minutes.saturating_mul(60_000);
    }
    if let Some(size) = args.body_size {
        config.producer.body_size = size;
    }
    if let Some(ms) = args.retry_backoff_ms {
        config.producer.retry_backoff_ms = ms;
    }
}

fn build_sender(args: &Args) -> Result<Arc<dyn MessageSender>> {
    match args.mode.as_str() {
        "mock" => Ok(Arc::new(
            MockSender::new(Duration::from_millis(args.mock_latency_ms))
                .with_fail_every(args.mock_fail_every),
        )),
        other => Err(BenchError::Startup(format!(
            "invalid mode: {other}, only 'mock' is built in"
        ))
        .into()),
    }
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for interrupt: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_summary(summary: &RunSummary) {
    let totals = &summary.totals;
    println!("\n=== Producer Benchmark Summary ===");
    println!("Stopped by: {:?}", summary.stop_reason);
    println!("Duration: {}ms", summary.elapsed.as_millis());
    println!("Workers: {}", summary.workers_joined);
    println!("Send success: {}", totals.send_request_success_count);
    println!("Send failed: {}", totals.send_request_failed_count);
    println!("Response failed: {}", totals.receive_response_failed_count);
    println!("Max RT: {}ms", totals.send_message_max_rt);
    if totals.receive_response_success_count > 0 {
        println!(
            "Average RT: {:.3}ms",
            totals.send_message_success_time_total as f64
                / totals.receive_response_success_count as f64
        );
    }
    println!();
}
