//! Shared HTTP transport helper. Adapters own one by composition; it maps
//! statuses into the error taxonomy and scrubs error bodies on the way out.

use crate::providers::sanitize;
use crate::providers::ProviderError;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    provider: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(provider: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            client: Client::new(),
            provider: provider.into(),
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url).timeout(self.timeout)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url).timeout(self.timeout)
    }

    /// POST builder without the per-request deadline, for streaming calls
    /// where the timeout covers only request start through response
    /// headers (see [`crate::streaming::open_byte_stream`]).
    pub fn streaming_post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send a request and decode a JSON response into `T`.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = self.send_checked(request).await?;
        response.json::<T>().await.map_err(|e| ProviderError::MalformedResponse {
            provider: self.provider.clone(),
            message: e.to_string(),
        })
    }

    /// Send a request and return the response body as text.
    pub async fn send_text(&self, request: RequestBuilder) -> Result<String, ProviderError> {
        let response = self.send_checked(request).await?;
        response
            .text()
            .await
            .map_err(|e| self.network_error(e))
    }

    /// Send a request and return the raw response bytes.
    pub async fn send_bytes(&self, request: RequestBuilder) -> Result<Bytes, ProviderError> {
        let response = self.send_checked(request).await?;
        response
            .bytes()
            .await
            .map_err(|e| self.network_error(e))
    }

    async fn send_checked(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request.send().await.map_err(|e| self.network_error(e))?;
        self.check_status(response).await
    }

    pub(crate) fn network_error(&self, source: reqwest::Error) -> ProviderError {
        if source.is_timeout() {
            ProviderError::RequestTimeout {
                provider: self.provider.clone(),
                timeout: self.timeout,
            }
        } else {
            ProviderError::Network {
                provider: self.provider.clone(),
                source,
            }
        }
    }

    /// Map non-2xx statuses into the taxonomy: 401/403 are auth failures,
    /// everything else an HTTP error carrying the scrubbed body.
    pub(crate) async fn check_status(&self, response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let body = sanitize::sanitize_api_error(&body);
        match status.as_u16() {
            401 | 403 => Err(ProviderError::Auth {
                provider: self.provider.clone(),
                message: format!("HTTP {}: {}", status.as_u16(), body),
            }),
            code => Err(ProviderError::Http {
                provider: self.provider.clone(),
                status: code,
                body,
            }),
        }
    }
}
