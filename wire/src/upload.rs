//! Request and response bodies of the storage upload endpoints.
//!
//! `POST /upload/single`         multipart `{file}`                         -> [`SingleUploadResponse`]
//! `POST /upload/chunk/init`     [`InitChunkedUpload`]                     -> [`InitChunkedUploadResponse`]
//! `POST /upload/chunk`          multipart `{chunk, uploadId, chunkIndex}` -> [`ChunkAck`]
//! `POST /upload/chunk/complete` [`CompleteChunkedUpload`]                 -> [`CompletedUpload`]

use serde::{Deserialize, Serialize};

/// Opens an upload session for a file that will be sent in chunks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitChunkedUpload {
    pub filename: String,
    pub total_size: u64,
    pub total_chunks: u32,
    pub mime_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitChunkedUploadResponse {
    pub upload_id: String,
}

/// Server acknowledgment for one chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    pub received: bool,
    pub chunk_index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteChunkedUpload {
    pub upload_id: String,
}

/// Final response of a chunked upload: where the assembled file was stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedUpload {
    #[serde(default)]
    pub message: String,
    pub path: String,
    pub filename: String,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleUploadResponse {
    pub path: String,
}

#[cfg(test)]
#[path = "upload_test.rs"]
mod tests;
