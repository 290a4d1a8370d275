//! Choosing between the single-request and chunked upload paths.

use std::ops::Range;

use super::{UploadError, UploadOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPlan {
    /// One multipart request.
    Single,
    /// Init, `total_chunks` sequential chunk requests, complete.
    Chunked { chunk_size: u64, total_chunks: u32 },
}

/// Pick the upload path for a file of `size` bytes.
///
/// Files strictly below the threshold go in one request; files at or above
/// it are chunked into `ceil(size / chunk_size)` pieces.
///
/// # Errors
///
/// [`UploadError::TooManyChunks`] if the chunk count does not fit the
/// protocol's 32-bit chunk index.
pub fn plan_upload(size: u64, options: &UploadOptions) -> Result<UploadPlan, UploadError> {
    if size < options.threshold_bytes {
        return Ok(UploadPlan::Single);
    }
    let chunk_size = options.chunk_size_bytes.max(1);
    let total = chunk_count(size, chunk_size);
    let total_chunks = u32::try_from(total).map_err(|_| UploadError::TooManyChunks { total })?;
    Ok(UploadPlan::Chunked { chunk_size, total_chunks })
}

#[must_use]
pub fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    size.div_ceil(chunk_size.max(1))
}

/// Contiguous, non-overlapping byte ranges covering exactly `[0, size)`.
///
/// Every range is `chunk_size` long except possibly the last.
pub fn chunk_ranges(size: u64, chunk_size: u64) -> impl Iterator<Item = Range<u64>> {
    let chunk_size = chunk_size.max(1);
    (0..chunk_count(size, chunk_size)).map(move |index| {
        let start = index * chunk_size;
        start..size.min(start + chunk_size)
    })
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
