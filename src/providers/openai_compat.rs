//! Wire shapes shared by the OpenAI-compatible adapter family (OpenAI,
//! DeepSeek, Grok, Doubao, Moonshot, Qwen, Zhipu). Each adapter owns its
//! endpoints, auth, and quirks; only the chat envelope lives here.

use super::retry::{self, RetryPolicy};
use super::ProviderError;
use crate::http::HttpTransport;
use crate::streaming::{self, ByteStream};
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionBody {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<WireResponseFormat>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireResponseFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
}

pub(crate) fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
        Role::Function => "function",
    }
}

pub(crate) fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: wire_role(m.role),
            content: m.content.clone(),
            name: m.name.clone(),
        })
        .collect()
}

/// Build the chat-completions body; `model` is already resolved against the
/// adapter default.
pub(crate) fn chat_body(model: String, request: &ChatRequest, stream: bool) -> ChatCompletionBody {
    let response_format = request.response_format.map(|f| WireResponseFormat {
        format_type: match f {
            ResponseFormat::Text => "text",
            ResponseFormat::JsonObject => "json_object",
        },
    });
    ChatCompletionBody {
        model,
        messages: wire_messages(&request.messages),
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stop: if request.stop.is_empty() { None } else { Some(request.stop.clone()) },
        user: request.user.clone(),
        response_format,
        stream,
    }
}

/// POST a chat-completions body with bearer auth under the retry policy and
/// normalize the response. One retry attempt covers the whole cycle.
pub(crate) async fn send_chat(
    http: &HttpTransport,
    policy: &RetryPolicy,
    url: &str,
    api_key: &str,
    body: &ChatCompletionBody,
) -> Result<GenerationResult, ProviderError> {
    let value: serde_json::Value = retry::run(policy, || async {
        let request = http.post(url).bearer_auth(api_key).json(body);
        http.send_json(request).await
    })
    .await?;
    parse_chat_value(http.provider(), value)
}

/// Open the SSE transport for a streaming chat completion.
pub(crate) async fn open_chat_stream(
    http: &HttpTransport,
    url: &str,
    api_key: &str,
    body: &ChatCompletionBody,
) -> Result<ByteStream, ProviderError> {
    let request = http
        .streaming_post(url)
        .bearer_auth(api_key)
        .header("Accept", "text/event-stream")
        .json(body);
    streaming::open_byte_stream(http, request).await
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub prompt_cache_hit_tokens: Option<u64>,
    #[serde(default)]
    pub prompt_cache_miss_tokens: Option<u64>,
}

impl WireUsage {
    pub fn to_usage(&self) -> Usage {
        Usage::from_counts(self.prompt_tokens, self.completion_tokens, self.total_tokens)
    }
}

/// Normalize a raw chat-completions payload, keeping the vendor value as
/// the diagnostic raw record.
pub(crate) fn parse_chat_value(
    provider: &str,
    value: serde_json::Value,
) -> Result<GenerationResult, ProviderError> {
    let response: ChatCompletionResponse = serde_json::from_value(value.clone()).map_err(|e| {
        ProviderError::MalformedResponse {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    })?;
    let text = response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: provider.to_string(),
            message: "response contained no choices".into(),
        })?;
    let usage = response.usage.unwrap_or_default().to_usage();
    Ok(GenerationResult { text, usage, cache: None, raw: Some(value) })
}

/// Cache-split prompt-token counts from a raw payload, for vendors that
/// report them.
pub(crate) fn cache_token_counts(value: Option<&serde_json::Value>) -> (u64, u64) {
    let usage = value.and_then(|v| v.get("usage"));
    let count = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(|n| n.as_u64())
            .unwrap_or(0)
    };
    (count("prompt_cache_hit_tokens"), count("prompt_cache_miss_tokens"))
}
