//! Async client core for the postdeck content platform.
//!
//! SYSTEM CONTEXT
//! ==============
//! The web app talks to the platform through a GraphQL API (jobs, posts,
//! insights) and a REST storage API (media uploads). This crate holds the
//! pieces with actual control flow on top of those APIs:
//!
//! - [`api::ApiClient`]: authenticated HTTP client (bearer + tenant headers)
//! - [`poll::JobPoller`]: waits for backend jobs to reach a terminal state
//! - [`upload::Uploader`]: single-request or chunked media upload
//! - [`memo::MemoCache`]: keyed cache of shared async streams
//!
//! The poller and uploader only see the [`poll::JobStatusSource`] and
//! [`upload::UploadTransport`] traits, so they can be driven by mocks.

pub mod api;
pub mod config;
pub mod error;
pub mod memo;
pub mod poll;
pub mod upload;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, ErrorCode};
pub use memo::{MemoCache, MemoError, Memoized};
pub use poll::{JobPoller, PollError, PollOptions};
pub use upload::{UploadError, UploadFile, UploadOptions, UploadedFile, Uploader};
pub use wire::{JobState, JobStatus};
