//! Google Gemini adapter: `generateContent` over the Generative Language
//! API, with the credential carried as a query parameter.

use super::retry::{self, RetryPolicy};
use super::{Capability, Provider, ProviderError};
use crate::http::HttpTransport;
use crate::streaming::{self, ByteStream};
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const PROVIDER: &str = "gemini";
const DEFAULT_API_VERSION: &str = "v1";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";

const CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
    Capability::Streaming,
];

/// Construction options for [`GeminiProvider`].
#[derive(Debug, Clone, Default)]
pub struct GeminiOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    /// Route by project instead of API key.
    pub project_id: Option<String>,
    pub api_version: Option<String>,
    pub max_retries: Option<u32>,
}

pub struct GeminiProvider {
    api_key: Option<String>,
    project_id: Option<String>,
    base_url: String,
    model: String,
    http: HttpTransport,
    retry: RetryPolicy,
}

impl GeminiProvider {
    pub fn new(options: GeminiOptions) -> Self {
        let api_version = options.api_version.unwrap_or_else(|| DEFAULT_API_VERSION.into());
        Self {
            http: HttpTransport::new(PROVIDER, options.timeout),
            api_key: options.api_key,
            project_id: options.project_id,
            base_url: options
                .base_url
                .unwrap_or_else(|| {
                    format!("https://generativelanguage.googleapis.com/{api_version}")
                })
                .trim_end_matches('/')
                .to_string(),
            model: options.model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            retry: options
                .max_retries
                .map(RetryPolicy::with_max_retries)
                .unwrap_or_default(),
        }
    }

    /// Full endpoint URL with the credential query parameter attached.
    fn request_url(&self, model: &str, operation: &str) -> Result<String, ProviderError> {
        if let Some(project) = &self.project_id {
            return Ok(format!(
                "{}/models/{model}:{operation}?project={project}",
                self.base_url
            ));
        }
        match &self.api_key {
            Some(key) => Ok(format!("{}/models/{model}:{operation}?key={key}", self.base_url)),
            None => Err(ProviderError::Configuration {
                provider: PROVIDER.into(),
                message: "neither api key nor project id is set".into(),
            }),
        }
    }

    fn body(&self, request: &ChatRequest, json_mime: bool) -> GenerateContentBody {
        let (system_instruction, contents) = convert_messages(&request.messages);
        GenerateContentBody {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
                max_output_tokens: request.max_tokens,
                response_mime_type: json_mime.then(|| "application/json".into()),
            },
        }
    }

    async fn send_generate(
        &self,
        model: &str,
        body: &GenerateContentBody,
    ) -> Result<GenerationResult, ProviderError> {
        let url = self.request_url(model, "generateContent")?;
        let value: Value = retry::run(&self.retry, || async {
            let req = self.http.post(&url).json(body);
            self.http.send_json(req).await
        })
        .await?;
        parse_generate_value(value)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
    #[serde(default)]
    total_token_count: Option<u64>,
}

/// System entries feed the dedicated instruction slot; assistant turns use
/// the vendor's `model` role.
fn convert_messages(messages: &[ChatMessage]) -> (Option<SystemInstruction>, Vec<Content>) {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system_parts.push(Part { text: message.content.clone() }),
            Role::Assistant => contents.push(Content {
                role: "model",
                parts: vec![Part { text: message.content.clone() }],
            }),
            Role::User | Role::Tool | Role::Function => contents.push(Content {
                role: "user",
                parts: vec![Part { text: message.content.clone() }],
            }),
        }
    }
    let system = if system_parts.is_empty() {
        None
    } else {
        Some(SystemInstruction { parts: system_parts })
    };
    (system, contents)
}

fn parse_generate_value(value: Value) -> Result<GenerationResult, ProviderError> {
    let response: GenerateContentResponse =
        serde_json::from_value(value.clone()).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;
    let candidate = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: "response contained no candidates".into(),
        })?;
    let text: String = candidate
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    let usage = response
        .usage_metadata
        .map(|u| Usage::from_counts(u.prompt_token_count, u.candidates_token_count, u.total_token_count))
        .unwrap_or_default();
    Ok(GenerationResult { text, usage, cache: None, raw: Some(value) })
}

#[async_trait]
impl Provider for GeminiProvider {
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
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.body(request, false);
        self.send_generate(&model, &body).await
    }

    async fn generate_json(
        &self,
        request: &GenerationRequest,
    ) -> Result<JsonGenerationResult, ProviderError> {
        let mut chat = request.to_chat_request();
        super::push_json_instruction(&mut chat.messages);
        let model = chat.model.clone().unwrap_or_else(|| self.model.clone());
        let body = self.body(&chat, true);
        let result = self.send_generate(&model, &body).await?;
        let value = super::parse_json_payload(PROVIDER, &result.text)?;
        Ok(JsonGenerationResult { value, usage: result.usage, cache: result.cache })
    }

    async fn create_streaming_chat_completion(
        &self,
        request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let url = self.request_url(&model, "streamGenerateContent")?;
        let body = self.body(request, false);
        let req = self
            .http
            .streaming_post(&url)
            .header("Accept", "text/event-stream")
            .json(&body);
        streaming::open_byte_stream(&self.http, req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_maps_to_model_role() {
        let (system, contents) = convert_messages(&[
            ChatMessage::system("stay factual"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        assert!(system.is_some());
        assert_eq!(contents[0].role, "user");
        assert_eq!(contents[1].role, "model");
    }

    #[test]
    fn body_serializes_camel_case() {
        let provider = GeminiProvider::new(GeminiOptions::default());
        let request = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            max_tokens: Some(64),
            top_p: Some(0.9),
            ..ChatRequest::default()
        };
        let value = serde_json::to_value(provider.body(&request, true)).unwrap();
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 64);
        assert_eq!(value["generationConfig"]["topP"], 0.9);
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert!(value.get("systemInstruction").is_none());
    }

    #[test]
    fn request_url_uses_key_query_parameter() {
        let provider = GeminiProvider::new(GeminiOptions {
            api_key: Some("k123".into()),
            ..GeminiOptions::default()
        });
        let url = provider.request_url("gemini-2.0-flash-001", "generateContent").unwrap();
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1/models/gemini-2.0-flash-001:generateContent?key=k123"
        );
    }

    #[test]
    fn request_url_prefers_project_routing() {
        let provider = GeminiProvider::new(GeminiOptions {
            api_key: Some("k123".into()),
            project_id: Some("proj-9".into()),
            ..GeminiOptions::default()
        });
        let url = provider.request_url("m", "generateContent").unwrap();
        assert!(url.ends_with("?project=proj-9"));
    }

    #[test]
    fn missing_credentials_error_is_lazy() {
        let provider = GeminiProvider::new(GeminiOptions::default());
        let err = provider.request_url("m", "generateContent").unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }

    #[test]
    fn parse_joins_parts_and_reads_usage_metadata() {
        let value = json!({
            "candidates": [{"content": {"parts": [{"text": "Hel"}, {"text": "lo"}]}}],
            "usageMetadata": {
                "promptTokenCount": 4,
                "candidatesTokenCount": 6,
                "totalTokenCount": 10
            }
        });
        let result = parse_generate_value(value).unwrap();
        assert_eq!(result.text, "Hello");
        assert_eq!(result.usage.total_tokens, 10);
    }

    #[test]
    fn parse_rejects_empty_candidates() {
        let err = parse_generate_value(json!({"candidates": []})).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }
}
