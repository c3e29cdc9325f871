//! iFlytek Spark adapter: HMAC-signed requests and the
//! header/parameter/payload envelope. Public model names map onto wire
//! `domain` codes.

use super::retry::{self, RetryPolicy};
use super::{Capability, Provider, ProviderError};
use crate::auth::RequestSigner;
use crate::http::HttpTransport;
use crate::types::*;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

const PROVIDER: &str = "spark";
const DEFAULT_BASE_URL: &str = "https://spark-api.xf-yun.com/v3.5";
const DEFAULT_MODEL: &str = "spark-pro";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2048;

const CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
];

/// Construction options for [`SparkProvider`].
#[derive(Debug, Clone, Default)]
pub struct SparkOptions {
    pub app_id: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub max_retries: Option<u32>,
}

pub struct SparkProvider {
    signer: RequestSigner,
    app_id: Option<String>,
    base_url: String,
    model: String,
    http: HttpTransport,
    retry: RetryPolicy,
}

impl SparkProvider {
    pub fn new(options: SparkOptions) -> Self {
        Self {
            http: HttpTransport::new(PROVIDER, options.timeout),
            signer: RequestSigner::new(
                options.app_id.clone(),
                options.api_key,
                options.api_secret,
            ),
            app_id: options.app_id,
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

    fn endpoint(&self) -> Result<Url, ProviderError> {
        Url::parse(&self.base_url).map_err(|e| ProviderError::Configuration {
            provider: PROVIDER.into(),
            message: format!("base URL is not a valid URL: {e}"),
        })
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<GenerationResult, ProviderError> {
        let endpoint = self.endpoint()?;
        let domain = spark_domain(request.model.as_deref().unwrap_or(&self.model));
        let body = SparkBody {
            header: SparkHeader {
                // A missing app_id never reaches the wire; signing rejects
                // the call first.
                app_id: self.app_id.clone().unwrap_or_default(),
                uid: format!("user_{}", Uuid::new_v4().simple()),
            },
            parameter: SparkParameter {
                chat: SparkChat {
                    domain,
                    temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                    top_k: 4,
                    max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                    auditing: "default",
                },
            },
            payload: SparkPayload {
                message: SparkMessagePayload { text: wire_messages(&request.messages) },
            },
        };

        // A fresh signature per attempt; signing counts as part of the
        // retried cycle.
        let value: Value = retry::run(&self.retry, || async {
            let auth = self.signer.sign(PROVIDER, &endpoint, "POST", Utc::now())?;
            let req = self
                .http
                .post(self.base_url.as_str())
                .header("Authorization", auth.authorization)
                .header("X-AppId", auth.app_id)
                .json(&body);
            self.http.send_json(req).await
        })
        .await?;
        parse_spark_value(value)
    }
}

/// Wire `domain` codes for the public model names.
fn spark_domain(model: &str) -> &'static str {
    match model {
        "spark-lite" => "generalv3.5",
        "spark-pro" => "generalv3",
        "spark-pro-128k" => "generalv3.5",
        "spark-max" => "generalv2",
        "spark-max-32k" => "generalv2.5",
        "spark-ultra" => "generalv4.0",
        _ => "generalv3",
    }
}

#[derive(Debug, Serialize)]
struct SparkBody {
    header: SparkHeader,
    parameter: SparkParameter,
    payload: SparkPayload,
}

#[derive(Debug, Serialize)]
struct SparkHeader {
    app_id: String,
    uid: String,
}

#[derive(Debug, Serialize)]
struct SparkParameter {
    chat: SparkChat,
}

#[derive(Debug, Serialize)]
struct SparkChat {
    domain: &'static str,
    temperature: f64,
    top_k: u32,
    max_tokens: u32,
    auditing: &'static str,
}

#[derive(Debug, Serialize)]
struct SparkPayload {
    message: SparkMessagePayload,
}

#[derive(Debug, Serialize)]
struct SparkMessagePayload {
    text: Vec<SparkWireMessage>,
}

#[derive(Debug, Serialize)]
struct SparkWireMessage {
    role: &'static str,
    content: String,
}

/// The envelope rejects a `system` role; system entries ride as assistant
/// turns and everything else collapses onto user.
fn wire_messages(messages: &[ChatMessage]) -> Vec<SparkWireMessage> {
    messages
        .iter()
        .map(|m| SparkWireMessage {
            role: match m.role {
                Role::System | Role::Assistant => "assistant",
                Role::User | Role::Tool | Role::Function => "user",
            },
            content: m.content.clone(),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SparkResponse {
    header: SparkResponseHeader,
    #[serde(default)]
    payload: Option<SparkResponsePayload>,
}

#[derive(Debug, Deserialize)]
struct SparkResponseHeader {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SparkResponsePayload {
    choices: SparkChoices,
    #[serde(default)]
    usage: Option<SparkUsagePayload>,
}

#[derive(Debug, Deserialize)]
struct SparkChoices {
    #[serde(default)]
    text: Vec<SparkChoiceText>,
}

#[derive(Debug, Deserialize)]
struct SparkChoiceText {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SparkUsagePayload {
    text: SparkUsageText,
}

#[derive(Debug, Deserialize)]
struct SparkUsageText {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

fn parse_spark_value(value: Value) -> Result<GenerationResult, ProviderError> {
    let response: SparkResponse =
        serde_json::from_value(value.clone()).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;
    if response.header.code != 0 {
        return Err(ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: format!(
                "vendor reported failure code {}: {}",
                response.header.code, response.header.message
            ),
        });
    }
    let payload = response.payload.ok_or_else(|| ProviderError::MalformedResponse {
        provider: PROVIDER.into(),
        message: "successful response carried no payload".into(),
    })?;
    let text = payload
        .choices
        .text
        .first()
        .and_then(|t| t.content.clone())
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: "response contained no choices".into(),
        })?;
    let usage = payload
        .usage
        .map(|u| Usage::from_counts(u.text.prompt_tokens, u.text.completion_tokens, u.text.total_tokens))
        .unwrap_or_default();
    Ok(GenerationResult { text, usage, cache: None, raw: Some(value) })
}

#[async_trait]
impl Provider for SparkProvider {
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
        self.send_chat(request).await
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn domain_table_matches_model_names() {
        assert_eq!(spark_domain("spark-pro"), "generalv3");
        assert_eq!(spark_domain("spark-ultra"), "generalv4.0");
        assert_eq!(spark_domain("spark-max-32k"), "generalv2.5");
        assert_eq!(spark_domain("unknown-model"), "generalv3");
    }

    #[test]
    fn system_entries_ride_as_assistant_turns() {
        let wire = wire_messages(&[
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        assert_eq!(wire[0].role, "assistant");
        assert_eq!(wire[1].role, "user");
        assert_eq!(wire[2].role, "assistant");
    }

    #[test]
    fn parse_reads_nested_payload() {
        let value = json!({
            "header": {"code": 0, "message": "Success"},
            "payload": {
                "choices": {"text": [{"content": "answer"}]},
                "usage": {"text": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}}
            }
        });
        let result = parse_spark_value(value).unwrap();
        assert_eq!(result.text, "answer");
        assert_eq!(result.usage.total_tokens, 12);
    }

    #[test]
    fn vendor_failure_code_is_malformed_response() {
        let value = json!({"header": {"code": 10013, "message": "input audit failed"}});
        let err = parse_spark_value(value).unwrap_err();
        match err {
            ProviderError::MalformedResponse { message, .. } => {
                assert!(message.contains("10013"));
                assert!(message.contains("input audit failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_credentials_surface_on_first_call_only() {
        // Construction succeeds with nothing configured.
        let provider = SparkProvider::new(SparkOptions::default());
        let endpoint = provider.endpoint().unwrap();
        let err = provider
            .signer
            .sign(PROVIDER, &endpoint, "POST", Utc::now())
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }
}
