//! GraphQL transport and the job-status query.
//!
//! Pure envelope parsing lives in `parse_envelope` so it can be tested
//! without a server.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use wire::JobStatus;

use super::{ApiClient, read_body};
use crate::error::ClientError;
use crate::poll::JobStatusSource;

pub const JOB_STATUS_QUERY: &str = "query JobStatus($jobId: String!) {
  jobStatus(jobId: $jobId) {
    id
    status
    progress
    result
    error
    createdAt
    finishedAt
  }
}";

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct GraphQlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Deserialize)]
struct GraphQlResponse<D> {
    data: Option<D>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusData {
    job_status: Option<JobStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusVariables<'a> {
    job_id: &'a str,
}

// =============================================================================
// CLIENT
// =============================================================================

impl ApiClient {
    /// Execute a GraphQL operation and return its `data`.
    ///
    /// # Errors
    ///
    /// [`ClientError::GraphQl`] when the response carries an `errors` array
    /// (whatever the HTTP status), [`ClientError::Response`] for other
    /// non-success statuses, [`ClientError::Parse`] for undecodable bodies.
    pub async fn graphql<V, D>(&self, query: &str, variables: V) -> Result<D, ClientError>
    where
        V: Serialize,
        D: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.config.graphql_url())
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;
        let (status, text) = read_body(response).await?;

        if !(200..300).contains(&status) {
            return Err(match graphql_error_message(&text) {
                Some(message) => ClientError::GraphQl(message),
                None => ClientError::Response { status, body: text },
            });
        }
        parse_envelope(&text)
    }

    /// Fetch one job snapshot. `Ok(None)` means the backend does not know the id.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::graphql`].
    pub async fn fetch_job_status(&self, job_id: &str) -> Result<Option<JobStatus>, ClientError> {
        let data: JobStatusData = self
            .graphql(JOB_STATUS_QUERY, JobStatusVariables { job_id })
            .await?;
        Ok(data.job_status)
    }
}

#[async_trait::async_trait]
impl JobStatusSource for ApiClient {
    async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>, ClientError> {
        self.fetch_job_status(job_id).await
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_envelope<D: DeserializeOwned>(text: &str) -> Result<D, ClientError> {
    let envelope: GraphQlResponse<D> =
        serde_json::from_str(text).map_err(|e| ClientError::Parse(e.to_string()))?;
    if !envelope.errors.is_empty() {
        return Err(ClientError::GraphQl(join_messages(&envelope.errors)));
    }
    envelope
        .data
        .ok_or_else(|| ClientError::Parse("GraphQL response has no data".into()))
}

fn graphql_error_message(text: &str) -> Option<String> {
    let envelope: GraphQlResponse<serde_json::Value> = serde_json::from_str(text).ok()?;
    if envelope.errors.is_empty() {
        None
    } else {
        Some(join_messages(&envelope.errors))
    }
}

fn join_messages(errors: &[GraphQlErrorEntry]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[path = "graphql_test.rs"]
mod tests;
