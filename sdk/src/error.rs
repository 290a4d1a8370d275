//! Transport-level errors and the error-code convention.
//!
//! Every error enum in this crate implements [`ErrorCode`] so front ends can
//! show a stable code next to the message and decide whether a retry makes
//! sense, independent of the `Display` wording.

/// Stable machine-readable code plus retry hint for an error.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Errors produced while talking to the platform APIs.
///
/// Variants carry rendered strings instead of source errors so the type is
/// `Clone`; memoized streams replay errors to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// A configuration value is missing or invalid.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// A header value (token, tenant id) contains invalid characters.
    #[error("invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    /// The request could not be sent or the response body not read.
    #[error("API request failed: {0}")]
    Request(String),

    /// The server answered with a non-success HTTP status.
    #[error("API response error: status {status}")]
    Response { status: u16, body: String },

    /// The response body could not be deserialized.
    #[error("API response parse failed: {0}")]
    Parse(String),

    /// The GraphQL endpoint returned an `errors` array.
    #[error("GraphQL error: {0}")]
    GraphQl(String),
}

impl ErrorCode for ClientError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::InvalidHeader { .. } => "E_INVALID_HEADER",
            Self::Request(_) => "E_API_REQUEST",
            Self::Response { .. } => "E_API_RESPONSE",
            Self::Parse(_) => "E_API_PARSE",
            Self::GraphQl(_) => "E_GRAPHQL",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Parse(error.to_string())
        } else if error.is_builder() {
            Self::HttpClientBuild(error.to_string())
        } else {
            Self::Request(error.to_string())
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
