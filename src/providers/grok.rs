//! Grok (xAI) adapter. The wire is OpenAI-compatible; only the endpoint and
//! model defaults differ.

use super::openai_compat as compat;
use super::retry::RetryPolicy;
use super::{Capability, Provider, ProviderError};
use crate::http::HttpTransport;
use crate::streaming::ByteStream;
use crate::types::*;
use async_trait::async_trait;
use std::time::Duration;

const PROVIDER: &str = "grok";
const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
const DEFAULT_MODEL: &str = "grok-3-beta";

const CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
    Capability::Streaming,
];

/// Construction options for [`GrokProvider`].
#[derive(Debug, Clone, Default)]
pub struct GrokOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub max_retries: Option<u32>,
}

pub struct GrokProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    http: HttpTransport,
    retry: RetryPolicy,
}

impl GrokProvider {
    pub fn new(options: GrokOptions) -> Self {
        Self {
            http: HttpTransport::new(PROVIDER, options.timeout),
            api_key: options.api_key,
            base_url: options
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            model: options.model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            retry: options
                .max_retries
                .map(RetryPolicy::with_max_retries)
                .unwrap_or_default(),
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or_else(|| ProviderError::Configuration {
            provider: PROVIDER.into(),
            message: "api key is not set".into(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl Provider for GrokProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn generate_text(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ProviderError> {
        self.chat_completion(&request.to_chat_request()).await
    }

    async fn chat_completion(
        &self,
        request: &ChatRequest,
    ) -> Result<GenerationResult, ProviderError> {
        let key = self.api_key()?;
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = compat::chat_body(model, request, false);
        compat::send_chat(&self.http, &self.retry, &self.chat_url(), key, &body).await
    }

    async fn generate_json(
        &self,
        request: &GenerationRequest,
    ) -> Result<JsonGenerationResult, ProviderError> {
        let mut chat = request.to_chat_request();
        super::push_json_instruction(&mut chat.messages);
        chat.response_format = Some(ResponseFormat::JsonObject);
        chat.stream = false;
        let result = self.chat_completion(&chat).await?;
        let value = super::parse_json_payload(PROVIDER, &result.text)?;
        Ok(JsonGenerationResult { value, usage: result.usage, cache: result.cache })
    }

    async fn create_streaming_chat_completion(
        &self,
        request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        let key = self.api_key()?;
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = compat::chat_body(model, request, true);
        compat::open_chat_stream(&self.http, &self.chat_url(), key, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let provider = GrokProvider::new(GrokOptions::default());
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.model, DEFAULT_MODEL);
        assert_eq!(provider.chat_url(), "https://api.x.ai/v1/chat/completions");
    }

    #[test]
    fn missing_api_key_is_lazy_configuration_error() {
        let provider = GrokProvider::new(GrokOptions::default());
        assert!(matches!(
            provider.api_key().unwrap_err(),
            ProviderError::Configuration { .. }
        ));
    }
}
