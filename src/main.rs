use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bfssh_rs::config::{self, OrchestratorConfig, SshConfig};
use bfssh_rs::orchestrator::ScanOrchestrator;
use bfssh_rs::server::{self, AppState};
use bfssh_rs::ssh::RusshAuthenticator;
use bfssh_rs::trial::{self, CheckOutcome};

/// bfssh-rs: SSH credential audits as tracked background scans.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bfssh-rs",
    version,
    about = "SSH credential audits as tracked background scans, with results forwarded to a report service.",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the HTTP API that starts scans and answers status queries.
    Serve(ServeArgs),
    /// Probe one host and try a credential list against it, then exit.
    Check(CheckArgs),
}

#[derive(Debug, Clone, clap::Args)]
struct ServeArgs {
    /// Address to bind the HTTP API to.
    #[arg(long, env = "BFSSH_BIND", default_value = config::DEFAULT_BIND)]
    bind: String,

    /// Base URL of the report service (results go to <url>/report/bfssh).
    #[arg(long = "report-url", env = "BFSSH_REPORT_URL", default_value = config::DEFAULT_REPORT_URL)]
    report_url: String,

    /// Probe executable, called as `<probe> <reportId> <host> <wordlist>`.
    #[arg(long = "probe-bin", env = "BFSSH_PROBE_BIN", default_value = "./sshConnexion")]
    probe_bin: PathBuf,

    /// Word list used when a scan request does not name one.
    #[arg(long, env = "BFSSH_WORDLIST")]
    wordlist: Option<PathBuf>,

    /// Kill a probe that runs longer than this many seconds (default: no limit).
    #[arg(long = "scan-timeout-secs", env = "BFSSH_SCAN_TIMEOUT_SECS")]
    scan_timeout_secs: Option<u64>,

    /// Timeout for posting a result to the report service, in milliseconds.
    #[arg(long = "report-timeout-ms", env = "BFSSH_REPORT_TIMEOUT_MS", default_value_t = 10_000)]
    report_timeout_ms: u64,

    /// SSH port used by /api/check-ssh when the query does not give one.
    #[arg(long = "ssh-port", env = "BFSSH_SSH_PORT", default_value_t = 22)]
    ssh_port: u16,

    /// SSH connect/auth timeout in milliseconds.
    #[arg(long = "ssh-timeout-ms", env = "BFSSH_SSH_TIMEOUT_MS", default_value_t = 3000)]
    ssh_timeout_ms: u64,
}

#[derive(Debug, Clone, clap::Args)]
struct CheckArgs {
    /// Target host name or IP.
    #[arg(long)]
    host: String,

    /// Credentials file, one `username:password` per line.
    #[arg(long)]
    credentials: PathBuf,

    #[arg(long, default_value_t = 22)]
    port: u16,

    /// SSH connect/auth timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 3000)]
    timeout_ms: u64,

    /// Write the outcome as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "bfssh_rs=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Check(args) => check(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = OrchestratorConfig {
        probe_executable: args.probe_bin,
        default_wordlist: args.wordlist,
        report_base_url: args.report_url,
        scan_timeout: args.scan_timeout_secs.map(Duration::from_secs),
        report_timeout: Duration::from_millis(args.report_timeout_ms),
    };
    let ssh = SshConfig {
        port: args.ssh_port,
        timeout: Duration::from_millis(args.ssh_timeout_ms),
    };
    ssh.validate()?;

    tracing::info!(
        probe = %config.probe_executable.display(),
        report_url = %config.report_base_url,
        scan_timeout = ?config.scan_timeout,
        "starting bfssh-rs"
    );

    let orchestrator = ScanOrchestrator::from_config(&config)?;
    let authenticator = Arc::new(RusshAuthenticator::new(ssh.timeout));
    let state = AppState::new(orchestrator, authenticator, ssh);

    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("ctrl-c received, shutting down");
        on_ctrl_c.cancel();
    });

    server::spawn_server(&args.bind, state, shutdown).await
}

async fn check(args: CheckArgs) -> Result<()> {
    let ssh = SshConfig {
        port: args.port,
        timeout: Duration::from_millis(args.timeout_ms),
    };
    ssh.validate()?;

    println!("bfssh-rs check:");
    println!("  host         : {}", args.host);
    println!("  port         : {}", ssh.port);
    println!("  credentials  : {}", args.credentials.display());
    println!("  timeout_ms   : {}", args.timeout_ms);

    let authenticator = RusshAuthenticator::new(ssh.timeout);
    let outcome = trial::check_ssh(&authenticator, &args.host, ssh.port, &args.credentials).await?;
    println!("\n{outcome}");
    if let CheckOutcome::Exhausted { attempted, .. } = &outcome {
        println!("(tried {attempted} credentials)");
    }

    if let Some(path) = args.output.as_deref() {
        if let Err(e) = write_outcome_json(path, &outcome) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON outcome to {}", path.display());
        }
    }
    Ok(())
}

fn write_outcome_json(path: &std::path::Path, outcome: &CheckOutcome) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, outcome)?;
    Ok(())
}
