//! Local files (or buffers) queued for upload.

use std::io::{self, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
enum ByteSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A file to upload: name, MIME type, size and where its bytes come from.
///
/// Path-backed files are read lazily, one byte range at a time, so a large
/// video never has to be held in memory as a whole on the chunked path.
#[derive(Debug, Clone)]
pub struct UploadFile {
    filename: String,
    mime_type: String,
    size: u64,
    source: ByteSource,
}

impl UploadFile {
    /// Describe a file on disk. The MIME type is guessed from the extension.
    ///
    /// # Errors
    ///
    /// Fails if the path cannot be stat'ed, is not a regular file, or has no
    /// UTF-8 file name.
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no UTF-8 file name"))?;

        Ok(Self {
            mime_type: guess_mime_type(&filename),
            filename,
            size: metadata.len(),
            source: ByteSource::Path(path.to_path_buf()),
        })
    }

    /// Describe an in-memory buffer.
    #[must_use]
    pub fn from_bytes(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let bytes = bytes.into();
        Self {
            mime_type: guess_mime_type(&filename),
            filename,
            size: bytes.len() as u64,
            source: ByteSource::Memory(bytes),
        }
    }

    /// Override the guessed MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read exactly the bytes in `range`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a range outside `[0, size)`, otherwise any error
    /// from opening, seeking or reading the file (including `UnexpectedEof`
    /// when the file shrank after it was described).
    pub async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        if range.start > range.end || range.end > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range {range:?} outside file of {} bytes", self.size),
            ));
        }
        let len = to_usize(range.end - range.start)?;

        match &self.source {
            ByteSource::Memory(bytes) => {
                let start = to_usize(range.start)?;
                Ok(bytes.slice(start..start + len))
            }
            ByteSource::Path(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(range.start)).await?;
                let mut buf = vec![0_u8; len];
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Read the whole file.
    ///
    /// # Errors
    ///
    /// See [`UploadFile::read_range`].
    pub async fn read_all(&self) -> io::Result<Bytes> {
        self.read_range(0..self.size).await
    }
}

fn guess_mime_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(FALLBACK_MIME_TYPE)
        .to_string()
}

fn to_usize(value: u64) -> io::Result<usize> {
    usize::try_from(value).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "range too large for this platform"))
}

#[cfg(test)]
#[path = "source_test.rs"]
mod tests;
