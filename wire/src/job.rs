//! Job status projection.
//!
//! DESIGN
//! ======
//! Jobs are owned by the backend (AI generation, profile refresh, ...). The
//! client only ever sees read-only snapshots of them, so `JobStatus` is a
//! plain serde struct with a few helpers for the states callers branch on.
//!
//! EDGE CASES
//! ==========
//! The backend is not consistent about timestamps: some resolvers return
//! RFC 3339 strings, queue-backed ones return epoch milliseconds (as numbers
//! or as digit strings). Both are accepted; RFC 3339 is always written back.
//! Results may arrive JSON-encoded inside a string and need a second parse.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Message used when a job fails without reporting an error.
pub const GENERIC_FAILURE_MESSAGE: &str = "Job failed";

/// Lifecycle state of a backend job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Queued, not yet picked up by a worker.
    Waiting,
    /// A worker is processing the job.
    Active,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
    /// Scheduled to run later.
    Delayed,
}

impl JobState {
    /// `true` for `completed` and `failed`; polling stops on these.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Delayed => "delayed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job as returned by the job-status query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: String,
    pub status: JobState,
    /// Completion percentage reported by the worker, `0.0` when absent.
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<OffsetDateTime>,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Return the job result with string-encoded JSON unpacked.
    ///
    /// A string result that parses as JSON yields the parsed value; anything
    /// else (including strings that are not JSON) is returned unchanged.
    #[must_use]
    pub fn decoded_result(&self) -> Option<Value> {
        match &self.result {
            Some(Value::String(raw)) => {
                Some(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
            }
            other => other.clone(),
        }
    }

    /// Deserialize the decoded result into `T`.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the result does not match `T`.
    pub fn result_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.decoded_result().map(serde_json::from_value).transpose()
    }

    /// Server-reported error, or [`GENERIC_FAILURE_MESSAGE`] when blank.
    #[must_use]
    pub fn failure_message(&self) -> &str {
        self.error
            .as_deref()
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(GENERIC_FAILURE_MESSAGE)
    }
}

fn deserialize_progress<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    #[allow(clippy::ref_option)]
    pub(super) fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => {
                let text = ts.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Raw>::deserialize(deserializer)?
            .map(parse)
            .transpose()
            .map_err(serde::de::Error::custom)
    }

    fn parse(raw: Raw) -> Result<OffsetDateTime, String> {
        match raw {
            Raw::Millis(ms) => from_millis(ms),
            Raw::Text(text) => match text.parse::<i64>() {
                Ok(ms) => from_millis(ms),
                Err(_) => OffsetDateTime::parse(&text, &Rfc3339).map_err(|e| e.to_string()),
            },
        }
    }

    fn from_millis(ms: i64) -> Result<OffsetDateTime, String> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
#[path = "job_test.rs"]
mod tests;
