//! Waiting for backend jobs (video renders, AI generations) to finish.
//!
//! DESIGN
//! ======
//! A job is queried once per fixed interval tick, the first tick firing
//! immediately. Every observed status is surfaced; polling stops as soon as a
//! terminal status (`completed` or `failed`) has been seen. There is no
//! backoff and no cancellation other than the timeout.
//!
//! The timeout is a hard deadline measured from the first poll. Both the
//! wait for the next tick and the status query race that deadline, so no
//! query is started at or after it and a response still in flight when it
//! passes is discarded. A timed-out poll can never resolve afterwards.
//!
//! ERROR HANDLING
//! ==============
//! Timeout (client side), job failure (server side), a missing job and a
//! failed query are distinct [`PollError`] variants.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use wire::{JobState, JobStatus};

use crate::config::{ClientConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_TIMEOUT_MS};
use crate::error::{ClientError, ErrorCode};
use crate::memo::{MemoCache, MemoError, Memoized};

/// Anything that can report the current status of a job.
#[async_trait::async_trait]
pub trait JobStatusSource: Send + Sync {
    /// `Ok(None)` when the backend does not know the job.
    async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>, ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("timed out after {timeout_ms}ms waiting for job {job_id}")]
    Timeout { job_id: String, timeout_ms: u64 },
    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error(transparent)]
    Query(#[from] ClientError),
}

impl ErrorCode for PollError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "E_POLL_TIMEOUT",
            Self::JobFailed { .. } => "E_JOB_FAILED",
            Self::JobNotFound(_) => "E_JOB_NOT_FOUND",
            Self::Query(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Query(e) => e.retryable(),
            Self::JobFailed { .. } | Self::JobNotFound(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
        }
    }
}

impl From<&ClientConfig> for PollOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_millis(config.poll_timeout_ms),
        }
    }
}

// =============================================================================
// POLLER
// =============================================================================

#[derive(Clone)]
pub struct JobPoller {
    source: Arc<dyn JobStatusSource>,
}

impl JobPoller {
    #[must_use]
    pub fn new(source: Arc<dyn JobStatusSource>) -> Self {
        Self { source }
    }

    /// Stream of observed statuses for `job_id`.
    ///
    /// Ends right after the first terminal status, or after a single error
    /// item (timeout, query failure, unknown job).
    pub fn watch(
        &self,
        job_id: impl Into<String>,
        options: PollOptions,
    ) -> impl Stream<Item = Result<JobStatus, PollError>> + Send + 'static {
        let watch = Watch::new(Arc::clone(&self.source), job_id.into(), options);
        futures::stream::unfold(Some(watch), |state| async move {
            let mut watch = state?;
            let item = watch.step().await;
            let next = match &item {
                Ok(status) if !status.is_terminal() => Some(watch),
                _ => None,
            };
            Some((item, next))
        })
    }

    /// Resolve with the final status once the job completes.
    ///
    /// # Errors
    ///
    /// [`PollError::JobFailed`] with the server's message (or a generic one)
    /// when the job fails, otherwise see [`PollError`].
    pub async fn wait_for_completion(&self, job_id: &str, options: PollOptions) -> Result<JobStatus, PollError> {
        self.wait_with_progress(job_id, options, |_| {}).await
    }

    /// Like [`JobPoller::wait_for_completion`], calling `on_update` with
    /// every observed status, the terminal one included.
    ///
    /// # Errors
    ///
    /// See [`JobPoller::wait_for_completion`].
    pub async fn wait_with_progress<F>(
        &self,
        job_id: &str,
        options: PollOptions,
        mut on_update: F,
    ) -> Result<JobStatus, PollError>
    where
        F: FnMut(&JobStatus) + Send,
    {
        let mut watch = Watch::new(Arc::clone(&self.source), job_id.to_string(), options);
        loop {
            let status = watch.step().await?;
            on_update(&status);
            if status.is_terminal() {
                return settle(job_id, status);
            }
        }
    }

    /// [`JobPoller::watch`] shared through `cache`: observers of the same job
    /// share one polling loop until the entry is evicted.
    ///
    /// # Errors
    ///
    /// [`MemoError::NoRuntime`] when a new loop has to be started outside a
    /// Tokio runtime.
    pub fn watch_shared(
        &self,
        cache: &MemoCache<String, Result<JobStatus, PollError>>,
        job_id: &str,
        options: PollOptions,
    ) -> Result<Memoized<Result<JobStatus, PollError>>, MemoError> {
        cache.get_or_subscribe(job_id.to_string(), || self.watch(job_id, options))
    }
}

// =============================================================================
// POLL LOOP
// =============================================================================

struct Watch {
    source: Arc<dyn JobStatusSource>,
    job_id: String,
    options: PollOptions,
    clock: Option<(Interval, Instant)>,
}

impl Watch {
    fn new(source: Arc<dyn JobStatusSource>, job_id: String, options: PollOptions) -> Self {
        Self { source, job_id, options, clock: None }
    }

    /// Wait for the next tick and query once, within the deadline.
    async fn step(&mut self) -> Result<JobStatus, PollError> {
        let Self { source, job_id, options, clock } = self;
        let (ticker, deadline) = clock.get_or_insert_with(|| {
            info!(%job_id, interval = ?options.interval, timeout = ?options.timeout, "poll: started");
            let mut ticker = tokio::time::interval(options.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            (ticker, Instant::now() + options.timeout)
        });
        let deadline = *deadline;

        let ticked = tokio::time::timeout_at(deadline, ticker.tick()).await;
        if ticked.is_err() || Instant::now() >= deadline {
            return Err(timed_out(job_id, options));
        }

        let status = match tokio::time::timeout_at(deadline, source.job_status(job_id)).await {
            Err(_) => return Err(timed_out(job_id, options)),
            Ok(Err(e)) => {
                warn!(%job_id, error = %e, "poll: status query failed");
                return Err(PollError::Query(e));
            }
            Ok(Ok(None)) => {
                warn!(%job_id, "poll: job not found");
                return Err(PollError::JobNotFound(job_id.clone()));
            }
            Ok(Ok(Some(status))) => status,
        };

        debug!(%job_id, status = %status.status, progress = status.progress, "poll: status");
        Ok(status)
    }
}

fn timed_out(job_id: &str, options: &PollOptions) -> PollError {
    let timeout_ms = u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX);
    warn!(%job_id, timeout_ms, "poll: timed out");
    PollError::Timeout { job_id: job_id.to_string(), timeout_ms }
}

fn settle(job_id: &str, status: JobStatus) -> Result<JobStatus, PollError> {
    if status.status == JobState::Failed {
        let message = status.failure_message().to_string();
        warn!(%job_id, %message, "poll: job failed");
        return Err(PollError::JobFailed { job_id: job_id.to_string(), message });
    }
    info!(%job_id, "poll: job completed");
    Ok(status)
}

#[cfg(test)]
#[path = "poll_test.rs"]
mod tests;
