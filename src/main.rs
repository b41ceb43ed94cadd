use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use docjobs::app_state::AppState;
use docjobs::config::AppConfig;
use docjobs::models::job::{JobHandle, JobId, JobStatus, StatusReport};
use docjobs::services::backend::JobBackend;
use docjobs::services::result;
use docjobs::services::tracker::TrackedJob;
use docjobs::{HttpBackend, JobError, JobKind, JobOutcome, JobOutput, JobSnapshot, JobTracker};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Submit and follow document-processing jobs
struct Args {
    /// Print the final result as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a job and follow it to completion
    Run {
        /// Job kind (e.g. convert-file, summarize, youtube-summary)
        kind: JobKind,

        /// JSON file holding the request payload ("-" for stdin)
        #[arg(long, value_name = "FILE")]
        payload: PathBuf,
    },
    /// Follow a job that was already submitted
    Watch {
        kind: JobKind,
        job_id: String,

        /// Status URL returned at submission
        #[arg(long, value_name = "URL")]
        poll_url: Option<String>,

        /// Result URL returned at submission
        #[arg(long, value_name = "URL")]
        result_url: Option<String>,
    },
    /// Check a job once and print its result if it has completed
    Result {
        kind: JobKind,
        job_id: String,

        /// Result URL returned at submission
        #[arg(long, value_name = "URL")]
        result_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Load configuration from environment
    let config = AppConfig::from_env()?;

    if let Some(addr) = &config.metrics_addr {
        install_metrics(addr)?;
    }

    let state = AppState::from_config(&config)?;
    tracing::info!(backend = %state.backend.base_url(), "docjobs client ready");

    match args.command {
        Command::Run { kind, payload } => {
            let payload = read_payload(&payload)?;
            let tracker = state.tracker();
            let job = tracker.start(kind, payload);
            follow(&tracker, job, args.json).await
        }
        Command::Watch {
            kind,
            job_id,
            poll_url,
            result_url,
        } => {
            let handle = JobHandle {
                job_id: JobId::new(job_id),
                poll_url,
                result_url,
            };
            let tracker = state.tracker();
            let job = tracker.attach(kind, handle);
            follow(&tracker, job, args.json).await
        }
        Command::Result {
            kind,
            job_id,
            result_url,
        } => {
            let handle = JobHandle {
                job_id: JobId::new(job_id),
                poll_url: None,
                result_url,
            };
            check_once(&state, kind, &handle, args.json).await
        }
    }
}

fn install_metrics(addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = addr.parse()?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!("docjobs_submissions_total", "Jobs submitted to the backend");
    metrics::describe_counter!("docjobs_poll_ticks_total", "Status checks issued");
    metrics::describe_counter!(
        "docjobs_poll_retries_total",
        "Status checks retried after a transient failure"
    );
    metrics::describe_counter!("docjobs_outcomes_total", "Tracked jobs by final outcome");
    metrics::describe_histogram!(
        "docjobs_job_duration_seconds",
        "Time from start of tracking to final outcome"
    );

    tracing::info!(%addr, "Prometheus metrics listener started");
    Ok(())
}

fn read_payload(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let text = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&text)?)
}

/// Print progress until the job ends; Ctrl-C cancels it.
async fn follow(
    tracker: &JobTracker<HttpBackend>,
    job: TrackedJob,
    json: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let generation = job.generation();
    let mut updates = tracker.subscribe();
    let printer = tokio::spawn(async move {
        let mut last_line = String::new();
        while updates.changed().await.is_ok() {
            let line = {
                let snapshot = updates.borrow_and_update();
                if snapshot.generation != generation {
                    continue;
                }
                progress_line(&snapshot)
            };
            if line != last_line {
                eprintln!("{}", line);
                last_line = line;
            }
        }
    });

    let wait = job.wait();
    tokio::pin!(wait);
    let finished = tokio::select! {
        outcome = &mut wait => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            tracker.cancel();
            wait.await
        }
    };
    printer.abort();

    match outcome {
        Ok(JobOutcome::Completed(output)) => {
            print_output(&output, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Ok(JobOutcome::Cancelled) => {
            eprintln!("cancelled");
            Ok(ExitCode::from(130))
        }
        Err(e) => {
            report_error(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// One status check; fetches the result only if the job has completed.
async fn check_once(
    state: &AppState,
    kind: JobKind,
    handle: &JobHandle,
    json: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let backend = state.backend.as_ref();
    let body = backend.status(kind, handle).await?;
    let report = StatusReport::parse(body).ok_or("status response has no status field")?;

    match &report.status {
        JobStatus::Completed => {
            let token = CancellationToken::new();
            match result::fetch_result(backend, kind, handle, &report, &state.policy.retry, &token)
                .await
            {
                Ok(Some(output)) => {
                    print_output(&output, json)?;
                    Ok(ExitCode::SUCCESS)
                }
                Ok(None) => Ok(ExitCode::from(130)),
                Err(e) => {
                    report_error(&e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        JobStatus::Failed => {
            report_error(&JobError::JobFailed {
                job_id: handle.job_id.clone(),
                message: report.failure_message(),
            });
            Ok(ExitCode::FAILURE)
        }
        status => {
            eprintln!(
                "job {} is {} ({}%)",
                handle.job_id,
                status,
                report.progress.unwrap_or(0)
            );
            Ok(ExitCode::from(2))
        }
    }
}

fn progress_line(snapshot: &JobSnapshot) -> String {
    let mut line = format!("[{:>3}%] {:?}", snapshot.progress, snapshot.phase);
    if let Some(stage) = &snapshot.stage {
        line.push_str(" - ");
        line.push_str(stage);
    }
    if let Some(last) = snapshot.logs.last() {
        line.push_str(" | ");
        line.push_str(&last.to_string());
    }
    line
}

fn print_output(output: &JobOutput, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(output)?);
        return Ok(());
    }
    println!("job {} ({}) completed", output.job_id, output.kind);
    if let Some(summary) = &output.summary {
        println!("{}", summary);
    }
    for url in &output.download_urls {
        println!("download: {}", url);
    }
    if !output.items.is_empty() {
        println!("{} items generated", output.items.len());
    }
    Ok(())
}

fn report_error(e: &JobError) {
    tracing::error!(error = %e, error_kind = %e.kind(), "Job did not complete");
    eprintln!("{} ({})", e.user_message(), e.kind());
}
