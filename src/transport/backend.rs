//! HTTP backend seam.
//!
//! The production backend wraps reqwest; tests supply scripted
//! responses so no test ever touches the network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;

use crate::errors::{ApiError, Error, Result};

/// Raw response handed back to the client for status classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Sends a prepared HTTP request and returns status plus body.
///
/// Connection-level failures are classified here (`Timeout` distinct
/// from other network errors); status classification belongs to
/// [`ApiClient`](super::ApiClient).
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<serde_json::Value>,
    ) -> Result<RawResponse>;
}

/// reqwest-backed implementation with a fixed request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unexpected(format!("Failed to initialize HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<serde_json::Value>,
    ) -> Result<RawResponse> {
        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(classify_reqwest)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest)?;

        Ok(RawResponse { status, body })
    }
}

fn classify_reqwest(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        ApiError::Timeout.into()
    } else if err.is_builder() {
        ApiError::InvalidUrl(err.to_string()).into()
    } else {
        ApiError::Network(err.to_string()).into()
    }
}
