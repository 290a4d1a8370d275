use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use sdk::upload::BatchProgress;
use sdk::{
    ApiClient, ClientConfig, ClientError, ErrorCode, JobPoller, PollError, PollOptions, UploadError, UploadFile,
    UploadOptions, Uploader,
};
use serde_json::Value;
use tracing::{info, warn};
use wire::JobStatus;

const PROGRESS_STEPS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid progress bar template: {0}")]
    ProgressTemplate(#[from] indicatif::style::TemplateError),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::Client(e) => e.error_code(),
            Self::Poll(e) => e.error_code(),
            Self::Upload(e) => e.error_code(),
            Self::Io { .. } => "E_IO",
            Self::InvalidJson(_) => "E_JSON",
            Self::ProgressTemplate(_) => "E_INTERNAL",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "postdeck", about = "Postdeck jobs and media upload CLI")]
struct Cli {
    #[arg(long, env = "POSTDECK_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "POSTDECK_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[arg(long, env = "POSTDECK_TENANT_ID")]
    tenant_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Job(JobCommand),
    /// Upload files, chunking the large ones.
    Upload(UploadArgs),
}

#[derive(Args, Debug)]
struct JobCommand {
    #[command(subcommand)]
    command: JobSubcommand,
}

#[derive(Subcommand, Debug)]
enum JobSubcommand {
    /// Print the current status of a job.
    Status { job_id: String },
    /// Poll a job until it completes, fails or times out.
    Wait {
        job_id: String,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[derive(Args, Debug)]
struct UploadArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[arg(long)]
    chunk_concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[{}] {e}", e.code());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = resolve_config(&cli)?;
    let client = ApiClient::new(config)?;

    match cli.command {
        Command::Job(job) => run_job(&client, job).await,
        Command::Upload(args) => run_upload(&client, args).await,
    }
}

/// Environment first, then flags, validated once.
fn resolve_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    build_config(ClientConfig::from_env_unvalidated(), cli)
}

fn build_config(mut config: ClientConfig, cli: &Cli) -> Result<ClientConfig, CliError> {
    if let Some(api_url) = &cli.api_url {
        config.api_url.clone_from(api_url);
    }
    if cli.access_token.is_some() {
        config.access_token.clone_from(&cli.access_token);
    }
    if cli.tenant_id.is_some() {
        config.tenant_id.clone_from(&cli.tenant_id);
    }
    Ok(config.validate()?)
}

async fn run_job(client: &ApiClient, job: JobCommand) -> Result<(), CliError> {
    match job.command {
        JobSubcommand::Status { job_id } => {
            let status = client
                .fetch_job_status(&job_id)
                .await?
                .ok_or(PollError::JobNotFound(job_id))?;
            print_json(&job_json(&status)?)
        }
        JobSubcommand::Wait { job_id, interval_ms, timeout_ms } => {
            let options = poll_options(client.config(), interval_ms, timeout_ms);
            let poller = JobPoller::new(Arc::new(client.clone()));
            let status = poller
                .wait_with_progress(&job_id, options, |status| {
                    eprintln!("{} {} {:.0}%", status.id, status.status, status.progress);
                })
                .await?;
            info!(job_id = %status.id, "job completed");
            print_json(&job_json(&status)?)
        }
    }
}

async fn run_upload(client: &ApiClient, args: UploadArgs) -> Result<(), CliError> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = UploadFile::from_path(path)
            .await
            .map_err(|source| CliError::Io { path: path.clone(), source })?;
        files.push(file);
    }

    let mut options = UploadOptions::from(client.config());
    if let Some(concurrency) = args.chunk_concurrency {
        options.chunk_concurrency = concurrency.max(1);
    }
    let uploader = Uploader::new(Arc::new(client.clone()), options);

    let bar = ProgressBar::new(PROGRESS_STEPS);
    bar.set_style(ProgressStyle::with_template("{spinner} [{bar:40}] {percent:>3}% {msg}")?.progress_chars("=> "));
    bar.enable_steady_tick(Duration::from_millis(120));

    let names: Vec<String> = files.iter().map(|f| f.filename().to_string()).collect();
    let sink = bar.clone();
    let result = uploader
        .upload_batch(&files, move |progress: BatchProgress| {
            if let Some(name) = names.get(progress.file_index) {
                sink.set_message(name.clone());
            }
            sink.set_position(progress_position(progress.overall_percent));
        })
        .await;

    match result {
        Ok(uploaded) => {
            bar.finish_and_clear();
            info!(files = uploaded.len(), "upload finished");
            print_json(&serde_json::to_value(uploaded)?)
        }
        Err(e) => {
            bar.abandon();
            warn!(error = %e, "upload aborted");
            Err(e.into())
        }
    }
}

fn poll_options(config: &ClientConfig, interval_ms: Option<u64>, timeout_ms: Option<u64>) -> PollOptions {
    let mut options = PollOptions::from(config);
    if let Some(ms) = interval_ms {
        options.interval = Duration::from_millis(ms);
    }
    if let Some(ms) = timeout_ms {
        options.timeout = Duration::from_millis(ms);
    }
    options
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn progress_position(percent: f64) -> u64 {
    (percent.clamp(0.0, 100.0) / 100.0 * PROGRESS_STEPS as f64).round() as u64
}

/// Job as JSON with a string-encoded result unpacked.
fn job_json(status: &JobStatus) -> Result<Value, CliError> {
    let mut value = serde_json::to_value(status)?;
    if let (Some(result), Value::Object(map)) = (status.decoded_result(), &mut value) {
        map.insert("result".to_owned(), result);
    }
    Ok(value)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
