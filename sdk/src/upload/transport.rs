//! Storage transport seam used by [`super::Uploader`].

use std::sync::Arc;

use bytes::Bytes;
use wire::{ChunkAck, CompletedUpload, InitChunkedUpload, InitChunkedUploadResponse, SingleUploadResponse};

use crate::error::ClientError;

/// Callback receiving the cumulative number of bytes handed to the network.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// The four storage endpoints the uploader drives.
///
/// Implemented by [`crate::api::ApiClient`]; tests substitute in-memory mocks.
#[async_trait::async_trait]
pub trait UploadTransport: Send + Sync {
    /// `POST /upload/single`: whole file in one multipart request.
    async fn upload_single(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Bytes,
        on_sent: ProgressFn,
    ) -> Result<SingleUploadResponse, ClientError>;

    /// `POST /upload/chunk/init`: open an upload session.
    async fn init_chunked(&self, request: &InitChunkedUpload) -> Result<InitChunkedUploadResponse, ClientError>;

    /// `POST /upload/chunk`: send one chunk of an open session.
    async fn upload_chunk(&self, upload_id: &str, chunk_index: u32, bytes: Bytes) -> Result<ChunkAck, ClientError>;

    /// `POST /upload/chunk/complete`: assemble the chunks into the stored file.
    async fn complete_chunked(&self, upload_id: &str) -> Result<CompletedUpload, ClientError>;
}
