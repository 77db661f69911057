//! Client for the Sentinel Hub Process API.
mod request;
pub use request::{ProcessRequest, RequestTemplate, TimeWindow};

use crate::error::Result;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const SOURCE: &str = "Sentinel Hub";

/// Backing datasets the Process API can render from.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    #[serde(rename = "sentinel-2-l2a")]
    Sentinel2L2A,
    #[serde(rename = "sentinel-2-l1c")]
    Sentinel2L1C,
}

impl Collection {
    pub fn key(&self) -> &str {
        match self {
            Self::Sentinel2L2A => "sentinel-2-l2a",
            Self::Sentinel2L1C => "sentinel-2-l1c",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Status and body of a Process API call. Non-success statuses are returned, not raised,
/// so callers can decide how to retry.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

pub trait ImageryApi {
    async fn process(&self, token: &str, request: &ProcessRequest) -> Result<ApiResponse>;
}

pub struct ProcessApi {
    client: reqwest::Client,
    url: String,
}

impl ProcessApi {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

impl ImageryApi for ProcessApi {
    async fn process(&self, token: &str, request: &ProcessRequest) -> Result<ApiResponse> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(ApiResponse { status, body })
    }
}

pub fn http_client(timeout: Duration, verify_ssl: bool) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(!verify_ssl)
        .build()?;
    Ok(client)
}
