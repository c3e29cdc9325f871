//! Doubao adapter over the Volcano Engine Ark endpoint. The wire is
//! OpenAI-compatible, but the `model` field routes to an inference endpoint
//! id rather than a public model name.

use super::openai_compat as compat;
use super::retry::RetryPolicy;
use super::{Capability, Provider, ProviderError};
use crate::http::HttpTransport;
use crate::streaming::ByteStream;
use crate::types::*;
use async_trait::async_trait;
use std::time::Duration;

const PROVIDER: &str = "doubao";
const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
const DEFAULT_MODEL: &str = "Doubao-pro-32k";

const CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
    Capability::Streaming,
];

/// Construction options for [`DoubaoProvider`].
#[derive(Debug, Clone, Default)]
pub struct DoubaoOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    /// Inference endpoint id. Ark routes requests by this value, so it takes
    /// priority over the model name when the caller does not set one.
    pub endpoint_id: Option<String>,
    pub max_retries: Option<u32>,
}

pub struct DoubaoProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    endpoint_id: Option<String>,
    http: HttpTransport,
    retry: RetryPolicy,
}

impl DoubaoProvider {
    pub fn new(options: DoubaoOptions) -> Self {
        Self {
            http: HttpTransport::new(PROVIDER, options.timeout),
            api_key: options.api_key,
            base_url: options
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            model: options.model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            endpoint_id: options.endpoint_id,
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

    /// Caller-specified model, else the configured endpoint id, else the
    /// model default.
    fn route(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_string)
            .or_else(|| self.endpoint_id.clone())
            .unwrap_or_else(|| self.model.clone())
    }
}

#[async_trait]
impl Provider for DoubaoProvider {
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
        let model = self.route(request.model.as_deref());
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
        let model = self.route(request.model.as_deref());
        let body = compat::chat_body(model, request, true);
        compat::open_chat_stream(&self.http, &self.chat_url(), key, &body).await
    }
}
