//! Authenticated HTTP client for the GreatFeel API.
//!
//! Attaches bearer auth, applies the fixed timeout, and classifies
//! response status into the transport error taxonomy. Retrying on 401
//! is the session manager's job, never this client's.

mod backend;

pub use backend::{HttpBackend, RawResponse, ReqwestBackend};
pub use reqwest::Method;

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;

use crate::constants::{DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS, DEV_API_URL};
use crate::errors::{ApiError, Error, Result};
use crate::tokens::TokenStore;

/// Network configuration. Environment selection (dev vs prod base URL)
/// belongs to the embedding application.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ApiConfig {
    /// Configuration pointing at a local development backend.
    pub fn development() -> Self {
        Self {
            base_url: DEV_API_URL.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the GreatFeel API.
#[derive(Clone)]
pub struct ApiClient {
    backend: Arc<dyn HttpBackend>,
    tokens: TokenStore,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, tokens: TokenStore) -> Result<Self> {
        let backend = Arc::new(ReqwestBackend::new(config.timeout)?);
        Ok(Self::with_backend(backend, config, tokens))
    }

    /// Build a client over an explicit backend (tests, custom stacks).
    pub fn with_backend(
        backend: Arc<dyn HttpBackend>,
        config: &ApiConfig,
        tokens: TokenStore,
    ) -> Self {
        Self {
            backend,
            tokens,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Issue a request and decode the JSON response body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        requires_auth: bool,
    ) -> Result<T> {
        let raw = self.execute(method, path, body, requires_auth).await?;
        serde_json::from_str(&raw.body).map_err(|e| {
            ApiError::Decode(format!("{} - {}", e, truncate(&raw.body))).into()
        })
    }

    /// Issue a request, discarding any response body.
    pub async fn request_no_content(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        requires_auth: bool,
    ) -> Result<()> {
        self.execute(method, path, body, requires_auth).await?;
        Ok(())
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        requires_auth: bool,
    ) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if requires_auth {
            // Required token missing: fail without a network call.
            let token = self.tokens.access_token()?.ok_or(ApiError::Unauthorized)?;
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| Error::Unexpected("Invalid access token format".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        debug!("[Api] {} {}", method, url);
        let response = self.backend.send(method, &url, headers, body).await?;
        classify(response)
    }
}

fn classify(response: RawResponse) -> Result<RawResponse> {
    match response.status {
        200..=299 => Ok(response),
        401 => Err(ApiError::Unauthorized.into()),
        400..=499 => {
            let message = serde_json::from_str::<ApiErrorBody>(&response.body)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            Err(ApiError::client(response.status, message).into())
        }
        500..=599 => Err(ApiError::Server {
            status: response.status,
        }
        .into()),
        _ => Err(ApiError::Network(format!("Unexpected status {}", response.status)).into()),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
