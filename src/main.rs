use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use teaflow::sync::CancelScope;
use teaflow::BrewConfig;
use tracing::{debug, error, trace, warn};

/// Cancellation and completion gates, demonstrated by making tea
#[derive(Parser)]
#[command(name = "teaflow")]
#[command(about = "Runs the tea-making cancellation scenarios", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Duration of one simulated step (e.g. "200ms")
    #[arg(long, value_parser = parse_duration)]
    step_latency: Option<Duration>,

    /// Print the final brew report as JSON
    #[arg(long)]
    json: bool,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("teaflow started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => BrewConfig::load(path)?,
        None => BrewConfig::default(),
    };
    config.merge_env_vars()?;
    if let Some(step_latency) = cli.step_latency {
        config.step_latency = step_latency;
    }
    config.validate()?;

    let process = CancelScope::root("process");
    let interrupt = process.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling the current run");
            interrupt.cancel("interrupted");
        }
    });

    println!("=== Cancellation + gates: Tea examples ===");
    let summary = teaflow::scenarios::run_all(&config, &process).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary.brew)?);
    } else {
        println!("{}", summary.brew.summary());
    }
    Ok(())
}
