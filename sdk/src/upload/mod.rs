//! Media upload: single request below the threshold, chunked above it.
//!
//! DESIGN
//! ======
//! Chunked uploads are a three-phase protocol: `init` opens a session for
//! the file (name, size, chunk count, MIME type), one `chunk` request per
//! byte range follows, and `complete` asks the server to assemble the file.
//! With the default concurrency of 1 each chunk is acknowledged before the
//! next byte range is even read. Higher concurrency keeps up to N chunks in
//! flight; `complete` still waits for every acknowledgment.
//!
//! ERROR HANDLING
//! ==============
//! Any failure aborts the whole upload: in-flight chunks are dropped, no
//! retry is attempted and the server-side session is left to expire. A
//! failed upload restarts from scratch.

pub mod plan;
pub mod source;
pub mod transport;

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use wire::InitChunkedUpload;

use crate::config::{ClientConfig, DEFAULT_CHUNK_CONCURRENCY, DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_CHUNK_THRESHOLD_BYTES};
use crate::error::{ClientError, ErrorCode};
use plan::{UploadPlan, chunk_ranges, plan_upload};
pub use source::UploadFile;
pub use transport::{ProgressFn, UploadTransport};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read {filename}: {source}")]
    Io {
        filename: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Api(#[from] ClientError),
    #[error("chunk {index} was not acknowledged by the server")]
    ChunkRejected { index: u32 },
    #[error("file needs {total} chunks, more than the upload protocol allows")]
    TooManyChunks { total: u64 },
}

impl ErrorCode for UploadError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "E_UPLOAD_IO",
            Self::Api(e) => e.error_code(),
            Self::ChunkRejected { .. } => "E_CHUNK_REJECTED",
            Self::TooManyChunks { .. } => "E_TOO_MANY_CHUNKS",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Api(e) => e.retryable(),
            Self::ChunkRejected { .. } => true,
            Self::Io { .. } | Self::TooManyChunks { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Files of at least this many bytes are chunked.
    pub threshold_bytes: u64,
    pub chunk_size_bytes: u64,
    /// Maximum chunks in flight. Zero is treated as one.
    pub chunk_concurrency: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_CHUNK_THRESHOLD_BYTES,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            chunk_concurrency: DEFAULT_CHUNK_CONCURRENCY,
        }
    }
}

impl From<&ClientConfig> for UploadOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            threshold_bytes: config.chunk_threshold_bytes,
            chunk_size_bytes: config.chunk_size_bytes,
            chunk_concurrency: config.chunk_concurrency,
        }
    }
}

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    /// Storage path returned by the server.
    pub path: String,
    pub size: u64,
    pub chunked: bool,
}

/// Progress of a multi-file upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchProgress {
    pub file_index: usize,
    /// Progress of the current file, 0..=100.
    pub file_percent: f64,
    /// Byte-weighted progress of the whole batch, 0..=100.
    pub overall_percent: f64,
}

type PercentFn = Arc<dyn Fn(f64) + Send + Sync>;

// =============================================================================
// UPLOADER
// =============================================================================

pub struct Uploader {
    transport: Arc<dyn UploadTransport>,
    options: UploadOptions,
}

impl Uploader {
    #[must_use]
    pub fn new(transport: Arc<dyn UploadTransport>, options: UploadOptions) -> Self {
        Self { transport, options }
    }

    #[must_use]
    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Upload one file, reporting progress as a percentage.
    ///
    /// The reported percentage never decreases and is exactly `100.0` once
    /// the upload has succeeded.
    ///
    /// # Errors
    ///
    /// Propagates the first failure of any phase; see [`UploadError`].
    pub async fn upload<P>(&self, file: &UploadFile, on_progress: P) -> Result<UploadedFile, UploadError>
    where
        P: Fn(f64) + Send + Sync + 'static,
    {
        self.upload_with(file, Arc::new(on_progress)).await
    }

    /// Upload files one after another.
    ///
    /// Overall progress weights every file by its size in bytes (equal
    /// weights when all files are empty) and ends at exactly `100.0`.
    ///
    /// # Errors
    ///
    /// Stops at the first failed file; files uploaded before it stay stored.
    pub async fn upload_batch<P>(&self, files: &[UploadFile], on_progress: P) -> Result<Vec<UploadedFile>, UploadError>
    where
        P: Fn(BatchProgress) + Send + Sync + 'static,
    {
        let on_progress = Arc::new(on_progress);
        let weights = batch_weights(files);
        let mut completed_weight = 0.0_f64;
        let mut uploaded = Vec::with_capacity(files.len());

        for (file_index, (file, weight)) in files.iter().zip(weights).enumerate() {
            let base = completed_weight;
            let sink = Arc::clone(&on_progress);
            let per_file: PercentFn = Arc::new(move |file_percent: f64| {
                let overall_percent = ((base + weight * file_percent / 100.0) * 100.0).min(100.0);
                sink(BatchProgress { file_index, file_percent, overall_percent });
            });
            uploaded.push(self.upload_with(file, per_file).await?);
            completed_weight += weight;
        }

        if let Some(file_index) = files.len().checked_sub(1) {
            on_progress(BatchProgress { file_index, file_percent: 100.0, overall_percent: 100.0 });
        }
        Ok(uploaded)
    }

    async fn upload_with(&self, file: &UploadFile, progress: PercentFn) -> Result<UploadedFile, UploadError> {
        match plan_upload(file.size(), &self.options)? {
            UploadPlan::Single => self.upload_single(file, progress).await,
            UploadPlan::Chunked { chunk_size, total_chunks } => {
                self.upload_chunked(file, chunk_size, total_chunks, progress).await
            }
        }
    }

    async fn upload_single(&self, file: &UploadFile, progress: PercentFn) -> Result<UploadedFile, UploadError> {
        info!(filename = file.filename(), size = file.size(), "upload: single request");
        let bytes = file.read_all().await.map_err(|e| io_error(file, e))?;

        let size = file.size();
        let report = Arc::clone(&progress);
        let on_sent: ProgressFn = Arc::new(move |sent| {
            if size > 0 {
                report(percent(sent, size));
            }
        });

        let response = self
            .transport
            .upload_single(file.filename(), file.mime_type(), bytes, on_sent)
            .await?;
        progress(100.0);

        info!(filename = file.filename(), path = %response.path, "upload: stored");
        Ok(UploadedFile { filename: file.filename().to_string(), path: response.path, size, chunked: false })
    }

    async fn upload_chunked(
        &self,
        file: &UploadFile,
        chunk_size: u64,
        total_chunks: u32,
        progress: PercentFn,
    ) -> Result<UploadedFile, UploadError> {
        let init = InitChunkedUpload {
            filename: file.filename().to_string(),
            total_size: file.size(),
            total_chunks,
            mime_type: file.mime_type().to_string(),
        };
        let upload_id = self.transport.init_chunked(&init).await?.upload_id;
        info!(%upload_id, filename = file.filename(), size = file.size(), total_chunks, "upload: chunked session opened");

        let transport = &self.transport;
        let session = upload_id.as_str();
        let mut acks = futures::stream::iter((0..total_chunks).zip(chunk_ranges(file.size(), chunk_size)))
            .map(move |(index, range)| async move {
                let bytes = file.read_range(range).await.map_err(|e| io_error(file, e))?;
                let ack = transport.upload_chunk(session, index, bytes).await?;
                if !ack.received || ack.chunk_index != index {
                    warn!(upload_id = session, chunk_index = index, ?ack, "upload: chunk rejected");
                    return Err(UploadError::ChunkRejected { index });
                }
                Ok(index)
            })
            .buffer_unordered(self.options.chunk_concurrency.max(1));

        let mut acked: u32 = 0;
        while let Some(index) = acks.try_next().await? {
            acked += 1;
            debug!(%upload_id, chunk_index = index, acked, total_chunks, "upload: chunk acknowledged");
            progress(f64::from(acked) / f64::from(total_chunks) * 100.0);
        }
        drop(acks);

        let done = self.transport.complete_chunked(&upload_id).await?;
        if total_chunks == 0 {
            progress(100.0);
        }

        info!(%upload_id, path = %done.path, "upload: chunked upload complete");
        Ok(UploadedFile { filename: done.filename, path: done.path, size: done.size, chunked: true })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn io_error(file: &UploadFile, source: std::io::Error) -> UploadError {
    UploadError::Io { filename: file.filename().to_string(), source }
}

#[allow(clippy::cast_precision_loss)]
fn percent(done: u64, total: u64) -> f64 {
    (done as f64 / total as f64 * 100.0).min(100.0)
}

#[allow(clippy::cast_precision_loss)]
fn batch_weights(files: &[UploadFile]) -> Vec<f64> {
    let total: u64 = files.iter().map(UploadFile::size).sum();
    if total == 0 {
        let equal = 1.0 / files.len().max(1) as f64;
        return vec![equal; files.len()];
    }
    files
        .iter()
        .map(|file| file.size() as f64 / total as f64)
        .collect()
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
