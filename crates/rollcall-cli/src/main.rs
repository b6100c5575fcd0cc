use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{
    attendance_on, history, mark_attendance, AttendanceStatus, Clock, LocalClock, Session,
    SessionState, VerifyError, Workflow,
};
use rollcall_io::{FacePlusPlusClient, FileImageSource, SqliteLedger};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-verified attendance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a face and mark today present on a match
    Verify {
        /// Reference photo taken now (omit to cancel the capture)
        #[arg(long)]
        capture: Option<PathBuf>,
        /// Photo picked from the library to compare against
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Record a status for today without verification
    Mark {
        /// present, absent or late
        status: AttendanceStatus,
    },
    /// Show today's attendance status
    Today,
    /// Print every ledger entry as JSON
    History,
    /// Show resolved configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Verify { capture, library } => verify(&config, capture, library).await,
        Commands::Mark { status } => {
            let ledger = open_ledger(&config).await?;
            let date = mark_attendance(&ledger, &LocalClock, status).await?;
            println!("{date}: {status}");
            Ok(())
        }
        Commands::Today => {
            let ledger = open_ledger(&config).await?;
            let today = LocalClock.today();
            match attendance_on(&ledger, today).await? {
                Some(status) => println!("{today}: {status}"),
                None => println!("{today}: not marked"),
            }
            Ok(())
        }
        Commands::History => {
            let ledger = open_ledger(&config).await?;
            let entries: serde_json::Map<String, serde_json::Value> = history(&ledger)
                .await?
                .into_iter()
                .map(|(date, status)| (date.to_string(), serde_json::json!(status)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
        Commands::Status => {
            println!(
                "{}",
                serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "api_base_url": config.api_base_url,
                    "credentials": config.credentials.is_some(),
                    "db_path": config.db_path,
                    "match_threshold": config.match_threshold,
                    "call_timeout_secs": config.call_timeout_secs,
                })
            );
            Ok(())
        }
    }
}

async fn open_ledger(config: &Config) -> Result<SqliteLedger> {
    SqliteLedger::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open ledger at {}", config.db_path.display()))
}

/// Run one session: capture the reference, then pick and compare the candidate.
async fn verify(config: &Config, capture: Option<PathBuf>, library: Option<PathBuf>) -> Result<()> {
    let credentials = config.require_credentials()?.clone();
    let faces = FacePlusPlusClient::new(&config.api_base_url, credentials, config.call_timeout())
        .context("failed to build face service client")?;
    let ledger = open_ledger(config).await?;
    let images = FileImageSource::new(capture, library);

    let workflow = Workflow::new(images, faces, ledger)
        .with_threshold(config.match_threshold)
        .with_call_timeout(config.call_timeout());
    let mut session = Session::new();
    tracing::info!(session = %session.id(), "verification started");

    if let Err(e) = workflow.capture_reference(&mut session).await {
        return report(&session, e);
    }
    println!("Face captured and registered.");

    if let Err(e) = workflow.select_candidate(&mut session).await {
        return report(&session, e);
    }

    println!("{}", summary(session.state(), workflow.threshold())?);
    Ok(())
}

fn report(session: &Session, error: VerifyError) -> Result<()> {
    tracing::debug!(session = %session.id(), state = session.state().name(), "session ended");
    let message = step_outcome(error)?;
    println!("{message}");
    Ok(())
}

/// Map a step error to the command result. Cancellation is not a failure;
/// everything else exits non-zero with its retry guidance.
fn step_outcome(error: VerifyError) -> Result<String> {
    if let VerifyError::UserCancelled { origin } = error {
        return Ok(format!("Cancelled: no {origin} image chosen."));
    }
    bail!("{error} ({})", error.retry_hint())
}

/// One-line result for a session that completed both steps.
fn summary(state: &SessionState, threshold: f64) -> Result<String> {
    match state {
        SessionState::Verified { score, date } => Ok(format!(
            "Face verified (confidence {score}). Marked present for {date}."
        )),
        SessionState::Mismatch { score } => Ok(format!(
            "Faces do not match (confidence {score}, threshold {threshold})."
        )),
        SessionState::Failed { cause } => bail!("{cause} ({})", cause.retry_hint()),
        other => bail!("session ended in unexpected state {}", other.name()),
    }
}
