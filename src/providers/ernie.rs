//! Baidu Ernie adapter: key/secret pair exchanged for a cached bearer
//! token, model names mapped onto endpoint path segments, token carried as
//! a query parameter.

use super::openai_compat as compat;
use super::retry::{self, RetryPolicy};
use super::{Capability, Provider, ProviderError};
use crate::auth::{ExchangedToken, TokenCache};
use crate::http::HttpTransport;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const PROVIDER: &str = "ernie";
const DEFAULT_BASE_URL: &str = "https://aip.baidubce.com/rpc/2.0/ai_custom/v1/wenxinworkshop";
const TOKEN_URL: &str = "https://aip.baidubce.com/oauth/2.0/token";
const DEFAULT_MODEL: &str = "ernie-bot";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_TOP_P: f64 = 0.9;
/// Vendor tokens typically live 30 days; used when the exchange response
/// omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 30 * 24 * 60 * 60;

const CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
];

/// Construction options for [`ErnieProvider`].
#[derive(Debug, Clone, Default)]
pub struct ErnieOptions {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub max_retries: Option<u32>,
}

pub struct ErnieProvider {
    api_key: Option<String>,
    secret_key: Option<String>,
    base_url: String,
    model: String,
    http: HttpTransport,
    retry: RetryPolicy,
    tokens: TokenCache,
}

impl ErnieProvider {
    pub fn new(options: ErnieOptions) -> Self {
        Self {
            http: HttpTransport::new(PROVIDER, options.timeout),
            api_key: options.api_key,
            secret_key: options.secret_key,
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
            tokens: TokenCache::new(),
        }
    }

    fn credentials(&self) -> Result<(&str, &str), ProviderError> {
        match (&self.api_key, &self.secret_key) {
            (Some(key), Some(secret)) => Ok((key, secret)),
            _ => Err(ProviderError::Configuration {
                provider: PROVIDER.into(),
                message: "token exchange requires both api key and secret key".into(),
            }),
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let (key, secret) = self.credentials()?;
        self.tokens
            .get_or_exchange(|| async {
                let req = self.http.post(TOKEN_URL).query(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", key),
                    ("client_secret", secret),
                ]);
                let response: TokenResponse = self.http.send_json(req).await?;
                let token = response.access_token.ok_or_else(|| ProviderError::Auth {
                    provider: PROVIDER.into(),
                    message: "token endpoint answered without an access_token".into(),
                })?;
                Ok(ExchangedToken {
                    token,
                    expires_in_secs: response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
                })
            })
            .await
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<GenerationResult, ProviderError> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = ErnieBody {
            messages: compat::wire_messages(&request.messages),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: request.top_p.unwrap_or(DEFAULT_TOP_P),
            max_output_tokens: request.max_tokens,
        };
        let value: Value = retry::run(&self.retry, || async {
            let token = self.access_token().await?;
            let url = format!(
                "{}/chat/{}?access_token={token}",
                self.base_url,
                ernie_model_path(&model)
            );
            let req = self.http.post(&url).json(&body);
            self.http.send_json(req).await
        })
        .await?;
        parse_ernie_value(value)
    }
}

/// Endpoint path segments for the public model names. The first-generation
/// model keeps the bare `completions` path.
fn ernie_model_path(model: &str) -> &str {
    match model {
        "ernie-bot" => "completions",
        "ernie-bot-turbo"
        | "ernie-bot-4"
        | "ernie-speed-8k"
        | "ernie-speed-128k"
        | "ernie-4.0-8k"
        | "ernie-4.0-8k-preview"
        | "ernie-3.5-8k"
        | "ernie-3.5-8k-preview"
        | "ernie-lite-8k"
        | "ernie-tiny-8k"
        | "ernie-character-8k"
        | "ernie-speed-appbuilder" => model,
        _ => "completions",
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ErnieBody {
    messages: Vec<compat::WireMessage>,
    temperature: f64,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErnieResponse {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    usage: Option<compat::WireUsage>,
}

fn parse_ernie_value(value: Value) -> Result<GenerationResult, ProviderError> {
    let response: ErnieResponse =
        serde_json::from_value(value.clone()).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;
    if let Some(code) = response.error_code {
        return Err(ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: format!(
                "vendor reported failure code {code}: {}",
                response.error_msg.unwrap_or_default()
            ),
        });
    }
    let text = response.result.unwrap_or_default();
    let usage = response.usage.unwrap_or_default().to_usage();
    Ok(GenerationResult { text, usage, cache: None, raw: Some(value) })
}

#[async_trait]
impl Provider for ErnieProvider {
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
    fn model_path_table() {
        assert_eq!(ernie_model_path("ernie-bot"), "completions");
        assert_eq!(ernie_model_path("ernie-4.0-8k"), "ernie-4.0-8k");
        assert_eq!(ernie_model_path("ernie-tiny-8k"), "ernie-tiny-8k");
        assert_eq!(ernie_model_path("some-new-model"), "completions");
    }

    #[test]
    fn missing_credentials_are_a_lazy_configuration_error() {
        let provider = ErnieProvider::new(ErnieOptions {
            api_key: Some("key".into()),
            ..ErnieOptions::default()
        });
        let err = provider.credentials().unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
        assert!(err.to_string().starts_with("ernie:"));
    }

    #[test]
    fn parse_reads_result_and_usage() {
        let value = json!({
            "result": "the answer",
            "usage": {"prompt_tokens": 8, "completion_tokens": 2, "total_tokens": 10}
        });
        let result = parse_ernie_value(value).unwrap();
        assert_eq!(result.text, "the answer");
        assert_eq!(result.usage.total_tokens, 10);
    }

    #[test]
    fn vendor_error_code_is_malformed_response() {
        let value = json!({"error_code": 110, "error_msg": "Access token invalid"});
        let err = parse_ernie_value(value).unwrap_err();
        match err {
            ProviderError::MalformedResponse { message, .. } => {
                assert!(message.contains("110"));
                assert!(message.contains("Access token invalid"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn body_applies_vendor_defaults() {
        let body = ErnieBody {
            messages: Vec::new(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_output_tokens: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["temperature"], 0.7);
        assert_eq!(value["top_p"], 0.9);
        assert!(value.get("max_output_tokens").is_none());
    }
}
