//! Invocation of named remote functions.
//!
//! Recognition, validation and speech all post a JSON body to a function
//! endpoint and read a JSON object back. [`FunctionTransport`] is the seam the
//! service clients are written against; [`HttpFunctions`] is the production
//! implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::ServiceError;

/// User agent sent with every request.
pub(crate) const USER_AGENT: &str = concat!("scribe-pipeline/", env!("CARGO_PKG_VERSION"));

/// Calls a named remote function with a JSON body.
#[async_trait]
pub trait FunctionTransport: Send + Sync {
    /// Invoke `function` and return its JSON response.
    ///
    /// # Errors
    ///
    /// Non-success statuses are classified with [`ServiceError::from_status`].
    async fn invoke(&self, function: &str, body: Value) -> Result<Value, ServiceError>;
}

/// Parse a base URL, making sure relative joins append to its path.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, String> {
    let mut url = Url::parse(base_url.trim()).map_err(|e| e.to_string())?;
    if url.cannot_be_a_base() {
        return Err(format!("{base_url} cannot be a base URL"));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// HTTP client for `{base}/functions/v1/{name}` endpoints.
#[derive(Debug, Clone)]
pub struct HttpFunctions {
    http: Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpFunctions {
    /// Create a client for the given backend base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidUrl`] if the URL is malformed.
    /// Returns [`ServiceError::Transport`] if the HTTP client fails to build.
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ServiceError> {
        let base = parse_base_url(base_url).map_err(ServiceError::InvalidUrl)?;
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base,
            api_key,
        })
    }

    /// Endpoint for a named function.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidUrl`] if the name does not form a valid path.
    pub fn endpoint(&self, function: &str) -> Result<Url, ServiceError> {
        self.base
            .join(&format!("functions/v1/{function}"))
            .map_err(|e| ServiceError::InvalidUrl(e.to_string()))
    }
}

#[async_trait]
impl FunctionTransport for HttpFunctions {
    async fn invoke(&self, function: &str, body: Value) -> Result<Value, ServiceError> {
        let url = self.endpoint(function)?;
        let mut request = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!("{} returned {}: {}", function, status, text);
            return Err(ServiceError::from_status(status.as_u16(), &text));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}
