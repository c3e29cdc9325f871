//! Qwen (DashScope) adapter. Two wire modes selected at construction: the
//! OpenAI-compatible endpoint (default) and the native DashScope
//! `input`/`parameters` envelope. Streaming is only offered by the
//! compatible endpoint, so the capability set depends on the mode.

use super::openai_compat as compat;
use super::retry::{self, RetryPolicy};
use super::{Capability, Provider, ProviderError};
use crate::http::HttpTransport;
use crate::streaming::ByteStream;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const PROVIDER: &str = "qwen";
const DEFAULT_COMPATIBLE_BASE_URL: &str = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1";
const DEFAULT_DASHSCOPE_BASE_URL: &str =
    "https://dashscope-intl.aliyuncs.com/api/v1/services/aigc/text-generation/generation";
const DEFAULT_MODEL: &str = "qwen-turbo";

const COMPATIBLE_CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
    Capability::Streaming,
];

const DASHSCOPE_CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QwenApiMode {
    #[default]
    OpenAiCompatible,
    DashScope,
}

/// Construction options for [`QwenProvider`].
#[derive(Debug, Clone, Default)]
pub struct QwenOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub api_mode: QwenApiMode,
    pub max_retries: Option<u32>,
}

pub struct QwenProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    mode: QwenApiMode,
    http: HttpTransport,
    retry: RetryPolicy,
}

impl QwenProvider {
    pub fn new(options: QwenOptions) -> Self {
        let default_base = match options.api_mode {
            QwenApiMode::OpenAiCompatible => DEFAULT_COMPATIBLE_BASE_URL,
            QwenApiMode::DashScope => DEFAULT_DASHSCOPE_BASE_URL,
        };
        Self {
            http: HttpTransport::new(PROVIDER, options.timeout),
            api_key: options.api_key,
            base_url: options
                .base_url
                .unwrap_or_else(|| default_base.into())
                .trim_end_matches('/')
                .to_string(),
            model: options.model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            mode: options.api_mode,
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

    async fn compatible_chat(&self, request: &ChatRequest) -> Result<GenerationResult, ProviderError> {
        let key = self.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = compat::chat_body(model, request, false);
        compat::send_chat(&self.http, &self.retry, &url, key, &body).await
    }

    /// The native envelope posts to the base URL itself; sampling controls
    /// ride in `parameters` and `result_format: "message"` selects the chat
    /// response shape.
    async fn dashscope_chat(&self, request: &ChatRequest) -> Result<GenerationResult, ProviderError> {
        let key = self.api_key()?;
        let body = dashscope_body(
            request.model.clone().unwrap_or_else(|| self.model.clone()),
            request,
        );
        let value: Value = retry::run(&self.retry, || async {
            let req = self.http.post(&self.base_url).bearer_auth(key).json(&body);
            self.http.send_json(req).await
        })
        .await?;
        parse_dashscope_value(value)
    }
}

#[derive(Debug, Serialize)]
struct DashScopeBody {
    model: String,
    input: DashScopeInput,
    parameters: DashScopeParameters,
}

#[derive(Debug, Serialize)]
struct DashScopeInput {
    messages: Vec<compat::WireMessage>,
}

#[derive(Debug, Serialize)]
struct DashScopeParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    result_format: &'static str,
}

fn dashscope_body(model: String, request: &ChatRequest) -> DashScopeBody {
    DashScopeBody {
        model,
        input: DashScopeInput { messages: compat::wire_messages(&request.messages) },
        parameters: DashScopeParameters {
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            result_format: "message",
        },
    }
}

#[derive(Debug, Deserialize)]
struct DashScopeResponse {
    output: DashScopeOutput,
    #[serde(default)]
    usage: Option<DashScopeUsage>,
}

#[derive(Debug, Deserialize)]
struct DashScopeOutput {
    #[serde(default)]
    choices: Vec<DashScopeChoice>,
}

#[derive(Debug, Deserialize)]
struct DashScopeChoice {
    message: DashScopeMessage,
}

#[derive(Debug, Deserialize)]
struct DashScopeMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DashScopeUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

fn parse_dashscope_value(value: Value) -> Result<GenerationResult, ProviderError> {
    let response: DashScopeResponse =
        serde_json::from_value(value.clone()).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;
    let text = response
        .output
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: "response contained no choices".into(),
        })?;
    let usage = response
        .usage
        .map(|u| Usage::from_counts(u.input_tokens, u.output_tokens, None))
        .unwrap_or_default();
    Ok(GenerationResult { text, usage, cache: None, raw: Some(value) })
}

#[async_trait]
impl Provider for QwenProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn capabilities(&self) -> &[Capability] {
        match self.mode {
            QwenApiMode::OpenAiCompatible => COMPATIBLE_CAPABILITIES,
            QwenApiMode::DashScope => DASHSCOPE_CAPABILITIES,
        }
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
        match self.mode {
            QwenApiMode::OpenAiCompatible => self.compatible_chat(request).await,
            QwenApiMode::DashScope => self.dashscope_chat(request).await,
        }
    }

    async fn generate_json(
        &self,
        request: &GenerationRequest,
    ) -> Result<JsonGenerationResult, ProviderError> {
        let mut chat = request.to_chat_request();
        super::push_json_instruction(&mut chat.messages);
        chat.stream = false;
        // The native envelope has no structured JSON flag; the instruction
        // alone has to carry it there.
        if self.mode == QwenApiMode::OpenAiCompatible {
            chat.response_format = Some(ResponseFormat::JsonObject);
        }
        let result = self.chat_completion(&chat).await?;
        let value = super::parse_json_payload(PROVIDER, &result.text)?;
        Ok(JsonGenerationResult { value, usage: result.usage, cache: result.cache })
    }

    async fn create_streaming_chat_completion(
        &self,
        request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        if self.mode != QwenApiMode::OpenAiCompatible {
            return Err(self.unsupported(Capability::Streaming));
        }
        let key = self.api_key()?;
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = compat::chat_body(model, request, true);
        compat::open_chat_stream(&self.http, &url, key, &body).await
    }
}
