//! Command-line entry point.
//!
//! Usage:
//!   cachescan ./sample.exe
//!   cachescan --format json --poll-interval 5 a.pdf b.docx
//!   METADEFENDER_API_KEY=... cachescan -v ./sample.exe

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cachescan::backends::metadefender::{
    MetaDefenderClient, MetaDefenderConfig, API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL,
};
use cachescan::{OrchestratorConfig, OutputFormat, ScanOrchestrator};

#[derive(Parser)]
#[command(name = "cachescan", version)]
#[command(about = "Scan files with a multi-engine service, reusing cached verdicts")]
struct Cli {
    /// Files to scan
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Service API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: String,

    /// Service base URL
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Seconds between status checks while a scan is running
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// Give up polling after this many seconds (0 = wait indefinitely)
    #[arg(long, default_value_t = 900)]
    max_poll_time: u64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    request_timeout: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "cachescan=debug" } else { "cachescan=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_orchestrator(cli: &Cli) -> Result<ScanOrchestrator> {
    let config = MetaDefenderConfig::new(cli.api_key.clone())?
        .with_base_url(cli.base_url.clone())
        .with_timeout(Duration::from_secs(cli.request_timeout));
    let client = MetaDefenderClient::new(config)?;

    let max_poll_time = (cli.max_poll_time > 0).then(|| Duration::from_secs(cli.max_poll_time));
    let orchestrator = ScanOrchestrator::builder()
        .service(client)
        .with_config(
            OrchestratorConfig::new()
                .with_poll_interval(Duration::from_secs(cli.poll_interval))
                .with_max_poll_time(max_poll_time),
        )
        .build()?;

    Ok(orchestrator)
}

async fn run(cli: Cli) -> Result<bool> {
    let orchestrator = build_orchestrator(&cli).context("invalid configuration")?;
    let formatter = cli.format.formatter();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            on_ctrl_c.cancel();
        }
    });

    let mut all_ok = true;
    for path in &cli.paths {
        match orchestrator.run(path, &cancel).await {
            Ok(report) => {
                let mut stdout = std::io::stdout().lock();
                formatter
                    .write_verdict(&report.verdict, &mut stdout)
                    .context("failed to write verdict")?;
                stdout.flush()?;
            }
            Err(err) => {
                all_ok = false;
                eprintln!("Error: {}: {}", path.display(), err);
            }
        }

        if cancel.is_cancelled() {
            break;
        }
    }

    Ok(all_ok)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
