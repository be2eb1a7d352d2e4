//! Asset provisioner command line frontend.
//!
//! Loads a manifest (or falls back to the built-in one), provisions every
//! job with bounded concurrency, prints a per-job report and exits 0 only
//! when all jobs succeeded. Ctrl-C requests cancellation; in-flight jobs
//! stop at their next stage boundary and clean up after themselves.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use provisioner_core::{FetchOptions, Manifest, RunOptions, DEFAULT_CONCURRENCY};

/// Exit code for a manifest that could not be loaded: nothing ran, fix the
/// configuration rather than re-running.
const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "provision",
    version,
    about = "Fetch, extract and place remote asset bundles"
)]
struct Cli {
    /// Path to a JSON manifest; the built-in fonts/sprites manifest is used
    /// when omitted.
    manifest: Option<PathBuf>,

    /// Maximum number of jobs provisioned at the same time.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Retries per fetch for transient failures.
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Per-fetch timeout in seconds.
    #[arg(long = "timeout-secs", default_value_t = 30)]
    timeout_secs: u64,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    tracing::info!("Asset provisioner v{}", provisioner_core::VERSION);

    let manifest = match &cli.manifest {
        Some(path) => match Manifest::load(path) {
            Ok(manifest) => manifest,
            Err(err) => {
                eprintln!("Error: {err}");
                return ExitCode::from(EXIT_CONFIG);
            }
        },
        None => Manifest::builtin(),
    };

    let options = RunOptions {
        concurrency: cli.concurrency,
        fetch: FetchOptions {
            retries: cli.retries,
            timeout: Duration::from_secs(cli.timeout_secs),
            ..FetchOptions::default()
        },
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Cancellation requested, finishing current stages");
            signal_cancel.cancel();
        }
    });

    let report = provisioner_core::run(&manifest, &options, &cancel).await;

    println!("{report}");
    ExitCode::from(report.exit_code())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}
