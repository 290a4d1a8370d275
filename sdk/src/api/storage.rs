//! Storage endpoints behind [`UploadTransport`].
//!
//! Single uploads stream the file body in 64 KiB pieces so the caller can
//! observe how many bytes have been handed to the connection. Chunk bodies
//! are sent as one piece; chunk progress is counted in acknowledgments.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use tracing::debug;
use wire::{
    ChunkAck, CompleteChunkedUpload, CompletedUpload, InitChunkedUpload, InitChunkedUploadResponse,
    SingleUploadResponse,
};

use super::ApiClient;
use crate::error::ClientError;
use crate::upload::{ProgressFn, UploadTransport};

pub const SINGLE_UPLOAD_PATH: &str = "/upload/single";
pub const CHUNK_INIT_PATH: &str = "/upload/chunk/init";
pub const CHUNK_PATH: &str = "/upload/chunk";
pub const CHUNK_COMPLETE_PATH: &str = "/upload/chunk/complete";

const STREAM_PIECE_BYTES: usize = 64 * 1024;

#[async_trait::async_trait]
impl UploadTransport for ApiClient {
    async fn upload_single(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: Bytes,
        on_sent: ProgressFn,
    ) -> Result<SingleUploadResponse, ClientError> {
        let len = bytes.len() as u64;
        debug!(filename, mime_type, len, "storage: single upload");
        let part = Part::stream_with_length(progress_body(bytes, on_sent), len)
            .file_name(filename.to_string())
            .mime_str(mime_type)?;
        self.post_multipart(SINGLE_UPLOAD_PATH, Form::new().part("file", part))
            .await
    }

    async fn init_chunked(&self, request: &InitChunkedUpload) -> Result<InitChunkedUploadResponse, ClientError> {
        self.post_json(CHUNK_INIT_PATH, request).await
    }

    async fn upload_chunk(&self, upload_id: &str, chunk_index: u32, bytes: Bytes) -> Result<ChunkAck, ClientError> {
        let len = bytes.len() as u64;
        debug!(upload_id, chunk_index, len, "storage: chunk");
        let part = Part::stream_with_length(Body::from(bytes), len)
            .file_name(format!("chunk-{chunk_index}"))
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .part("chunk", part)
            .text("uploadId", upload_id.to_string())
            .text("chunkIndex", chunk_index.to_string());
        self.post_multipart(CHUNK_PATH, form).await
    }

    async fn complete_chunked(&self, upload_id: &str) -> Result<CompletedUpload, ClientError> {
        let request = CompleteChunkedUpload { upload_id: upload_id.to_string() };
        self.post_json(CHUNK_COMPLETE_PATH, &request).await
    }
}

/// Body that reports the cumulative byte count as each piece is pulled.
fn progress_body(bytes: Bytes, on_sent: ProgressFn) -> Body {
    let pieces = split_pieces(bytes, STREAM_PIECE_BYTES);
    let mut sent = 0_u64;
    let stream = futures::stream::iter(pieces).map(move |piece| {
        sent += piece.len() as u64;
        on_sent(sent);
        Ok::<_, std::io::Error>(piece)
    });
    Body::wrap_stream(stream)
}

fn split_pieces(bytes: Bytes, piece_len: usize) -> Vec<Bytes> {
    let piece_len = piece_len.max(1);
    (0..bytes.len())
        .step_by(piece_len)
        .map(|start| bytes.slice(start..bytes.len().min(start + piece_len)))
        .collect()
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
