//! Anthropic Claude adapter: the `/messages` endpoint with `x-api-key`
//! auth and a top-level system instruction.

use super::retry::{self, RetryPolicy};
use super::{Capability, Provider, ProviderError};
use crate::http::HttpTransport;
use crate::streaming::{self, ByteStream};
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";
const DEFAULT_VERSION: &str = "2024-06-23";
/// The vendor requires max_tokens on every request.
const DEFAULT_MAX_TOKENS: u32 = 1000;

const CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
    Capability::Streaming,
];

/// Construction options for [`AnthropicProvider`].
#[derive(Debug, Clone, Default)]
pub struct AnthropicOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub anthropic_version: Option<String>,
    pub max_retries: Option<u32>,
}

pub struct AnthropicProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    version: String,
    http: HttpTransport,
    retry: RetryPolicy,
}

impl AnthropicProvider {
    pub fn new(options: AnthropicOptions) -> Self {
        Self {
            http: HttpTransport::new(PROVIDER, options.timeout),
            api_key: options.api_key,
            base_url: options
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            model: options.model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            version: options.anthropic_version.unwrap_or_else(|| DEFAULT_VERSION.into()),
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

    fn authed(&self, request: reqwest::RequestBuilder, key: &str) -> reqwest::RequestBuilder {
        request
            .header("x-api-key", key)
            .header("anthropic-version", &self.version)
    }

    fn messages_body(&self, request: &ChatRequest, stream: bool) -> MessagesBody {
        let (system, messages) = split_system(&request.messages);
        MessagesBody {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            temperature: request.temperature,
            top_p: request.top_p,
            stream,
        }
    }

    async fn send_messages(&self, body: &MessagesBody) -> Result<GenerationResult, ProviderError> {
        let key = self.api_key()?;
        let url = format!("{}/messages", self.base_url);
        let value: Value = retry::run(&self.retry, || async {
            let req = self.authed(self.http.post(&url), key).json(body);
            self.http.send_json(req).await
        })
        .await?;
        parse_messages_value(value)
    }

    /// Vendor-side token count for a conversation, without generating.
    pub async fn count_tokens(&self, request: &ChatRequest) -> Result<u64, ProviderError> {
        let key = self.api_key()?;
        let url = format!("{}/messages/count_tokens", self.base_url);
        let (system, messages) = split_system(&request.messages);
        let body = CountTokensBody {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            system,
        };
        let response: CountTokensResponse = retry::run(&self.retry, || async {
            let req = self.authed(self.http.post(&url), key).json(&body);
            self.http.send_json(req).await
        })
        .await?;
        Ok(response.input_tokens)
    }
}

#[derive(Debug, Serialize)]
struct MessagesBody {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct CountTokensBody {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

/// Fold system entries into the top-level system string (the wire contract
/// has no system role) and map the rest onto user/assistant turns.
fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<WireMessage>) {
    let mut system_parts = Vec::new();
    let mut wire = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system_parts.push(message.content.clone()),
            Role::Assistant => wire.push(WireMessage {
                role: "assistant",
                content: message.content.clone(),
            }),
            // Tool and function results have no wire role here; they are
            // presented as user turns like the other roles the vendor
            // rejects.
            Role::User | Role::Tool | Role::Function => wire.push(WireMessage {
                role: "user",
                content: message.content.clone(),
            }),
        }
    }
    let system = if system_parts.is_empty() { None } else { Some(system_parts.join("\n")) };
    (system, wire)
}

fn parse_messages_value(value: Value) -> Result<GenerationResult, ProviderError> {
    let response: MessagesResponse =
        serde_json::from_value(value.clone()).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;
    let text: String = response
        .content
        .iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect();
    let usage = response
        .usage
        .map(|u| Usage::from_counts(u.input_tokens, u.output_tokens, None))
        .unwrap_or_default();
    Ok(GenerationResult { text, usage, cache: None, raw: Some(value) })
}

#[async_trait]
impl Provider for AnthropicProvider {
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
        let body = self.messages_body(request, false);
        self.send_messages(&body).await
    }

    async fn generate_json(
        &self,
        request: &GenerationRequest,
    ) -> Result<JsonGenerationResult, ProviderError> {
        let mut chat = request.to_chat_request();
        super::push_json_instruction(&mut chat.messages);
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
        let body = self.messages_body(request, true);
        let url = format!("{}/messages", self.base_url);
        let req = self
            .authed(self.http.streaming_post(&url), key)
            .header("Accept", "text/event-stream")
            .json(&body);
        streaming::open_byte_stream(&self.http, req).await
    }
}
