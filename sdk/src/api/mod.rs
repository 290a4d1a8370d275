//! Authenticated HTTP client for the platform APIs.
//!
//! DESIGN
//! ======
//! One `reqwest::Client` is built per `ApiClient` with the auth and tenant
//! headers installed as default headers, so every GraphQL query and storage
//! request carries them without per-call plumbing. This replaces the
//! request interceptors of the web front end.
//!
//! `graphql` covers the job-status query; `storage` implements the upload
//! endpoints behind [`crate::upload::UploadTransport`].

pub mod graphql;
pub mod storage;

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Header carrying the active tenant (workspace) id.
pub const TENANT_HEADER: HeaderName = HeaderName::from_static("x-tenant-id");

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ApiClient {
    /// Build a client from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidHeader`] if the token or tenant id cannot
    /// be sent as a header, or [`ClientError::HttpClientBuild`] if reqwest
    /// fails to initialize.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .default_headers(default_headers(&config)?)
            .build()
            .map_err(|e| ClientError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Build a client from `POSTDECK_*` environment variables.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`] and [`ApiClient::new`].
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.config.endpoint(path))
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn post_multipart<R>(&self, path: &str, form: reqwest::multipart::Form) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.config.endpoint(path))
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn default_headers(config: &ClientConfig) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = &config.access_token {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientError::InvalidHeader { name: "authorization" })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    if let Some(tenant) = &config.tenant_id {
        let value = HeaderValue::from_str(tenant).map_err(|_| ClientError::InvalidHeader { name: "x-tenant-id" })?;
        headers.insert(TENANT_HEADER, value);
    }
    Ok(headers)
}

async fn read_body(response: reqwest::Response) -> Result<(u16, String), ClientError> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| ClientError::Request(e.to_string()))?;
    Ok((status, text))
}

async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ClientError> {
    let (status, text) = read_body(response).await?;
    if !(200..300).contains(&status) {
        return Err(ClientError::Response { status, body: text });
    }
    parse_body(&text)
}

fn parse_body<R: DeserializeOwned>(text: &str) -> Result<R, ClientError> {
    serde_json::from_str(text).map_err(|e| ClientError::Parse(e.to_string()))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
