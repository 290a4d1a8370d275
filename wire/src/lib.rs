//! Wire model shared by the postdeck client crates.
//!
//! This crate owns the JSON shapes exchanged with the platform backend: the
//! job-status projection returned by the GraphQL job query, and the request
//! and response bodies of the chunked upload endpoints. It has no I/O so both
//! the `sdk` library and the `postdeck` binary can depend on it directly.

pub mod job;
pub mod upload;

pub use job::{GENERIC_FAILURE_MESSAGE, JobState, JobStatus};
pub use upload::{
    ChunkAck, CompleteChunkedUpload, CompletedUpload, InitChunkedUpload, InitChunkedUploadResponse,
    SingleUploadResponse,
};
