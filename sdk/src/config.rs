//! Client configuration parsed from environment variables.

use crate::error::ClientError;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_GRAPHQL_PATH: &str = "/graphql";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 60_000;
/// Files at or above this size take the chunked path (50 MiB).
pub const DEFAULT_CHUNK_THRESHOLD_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_CHUNK_CONCURRENCY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST base URL without trailing slash.
    pub api_url: String,
    pub graphql_path: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub access_token: Option<String>,
    /// Sent as `X-Tenant-Id` when set.
    pub tenant_id: Option<String>,
    pub timeouts: HttpTimeouts,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub chunk_threshold_bytes: u64,
    pub chunk_size_bytes: u64,
    pub chunk_concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            graphql_path: DEFAULT_GRAPHQL_PATH.to_string(),
            access_token: None,
            tenant_id: None,
            timeouts: HttpTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            chunk_threshold_bytes: DEFAULT_CHUNK_THRESHOLD_BYTES,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            chunk_concurrency: DEFAULT_CHUNK_CONCURRENCY,
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// All variables are optional:
    /// - `POSTDECK_API_URL`: default `http://127.0.0.1:3000`
    /// - `POSTDECK_GRAPHQL_PATH`: default `/graphql`
    /// - `POSTDECK_ACCESS_TOKEN`, `POSTDECK_TENANT_ID`: unset by default
    /// - `POSTDECK_REQUEST_TIMEOUT_SECS` / `POSTDECK_CONNECT_TIMEOUT_SECS`: 300 / 10
    /// - `POSTDECK_POLL_INTERVAL_MS` / `POSTDECK_POLL_TIMEOUT_MS`: 2000 / 60000
    /// - `POSTDECK_CHUNK_THRESHOLD_BYTES` / `POSTDECK_CHUNK_SIZE_BYTES`: 50 MiB
    /// - `POSTDECK_CHUNK_CONCURRENCY`: 1
    ///
    /// Unparseable numbers fall back to their default.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigParse`] when the result fails [`ClientConfig::validate`].
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_env_unvalidated().validate()
    }

    /// Read the same variables as [`ClientConfig::from_env`] without
    /// validating, so callers can layer overrides before [`ClientConfig::validate`].
    #[must_use]
    pub fn from_env_unvalidated() -> Self {
        Self {
            api_url: std::env::var("POSTDECK_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            graphql_path: std::env::var("POSTDECK_GRAPHQL_PATH").unwrap_or_else(|_| DEFAULT_GRAPHQL_PATH.to_string()),
            access_token: env_non_empty("POSTDECK_ACCESS_TOKEN"),
            tenant_id: env_non_empty("POSTDECK_TENANT_ID"),
            timeouts: HttpTimeouts {
                request_secs: env_parse("POSTDECK_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse("POSTDECK_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
            },
            poll_interval_ms: env_parse("POSTDECK_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            poll_timeout_ms: env_parse("POSTDECK_POLL_TIMEOUT_MS", DEFAULT_POLL_TIMEOUT_MS),
            chunk_threshold_bytes: env_parse("POSTDECK_CHUNK_THRESHOLD_BYTES", DEFAULT_CHUNK_THRESHOLD_BYTES),
            chunk_size_bytes: env_parse("POSTDECK_CHUNK_SIZE_BYTES", DEFAULT_CHUNK_SIZE_BYTES),
            chunk_concurrency: env_parse("POSTDECK_CHUNK_CONCURRENCY", DEFAULT_CHUNK_CONCURRENCY),
        }
    }

    /// Normalize the base URL and graphql path, then check invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigParse`] for a non-http(s) base URL, a zero
    /// chunk size, or a zero chunk concurrency.
    pub fn validate(mut self) -> Result<Self, ClientError> {
        self.api_url = self.api_url.trim().trim_end_matches('/').to_string();
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ClientError::ConfigParse(format!(
                "POSTDECK_API_URL must start with http:// or https:// (got '{}')",
                self.api_url
            )));
        }
        if !self.graphql_path.starts_with('/') {
            self.graphql_path.insert(0, '/');
        }
        if self.chunk_size_bytes == 0 {
            return Err(ClientError::ConfigParse("POSTDECK_CHUNK_SIZE_BYTES must be greater than 0".into()));
        }
        if self.chunk_concurrency == 0 {
            return Err(ClientError::ConfigParse("POSTDECK_CHUNK_CONCURRENCY must be greater than 0".into()));
        }
        Ok(self)
    }

    /// Absolute URL for a REST path such as `/upload/chunk`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    #[must_use]
    pub fn graphql_url(&self) -> String {
        self.endpoint(&self.graphql_path)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
