//! DeepSeek adapter: OpenAI-style chat wire with cache-split prompt-token
//! accounting and a reasoner-model chain-of-thought helper.

use super::openai_compat as compat;
use super::retry::RetryPolicy;
use super::{Capability, Provider, ProviderError};
use crate::http::HttpTransport;
use crate::streaming::ByteStream;
use crate::types::*;
use crate::usage::{self, LedgerReport, LedgerSnapshot, PriceTable, UsageLedger};
use async_trait::async_trait;
use std::time::Duration;

const PROVIDER: &str = "deepseek";
const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";
const REASONER_MODEL: &str = "deepseek-reasoner";

const CHAIN_OF_THOUGHT_SYSTEM: &str = "Work through the problem step by step: \
analyse it first, lay out the reasoning in detail, then state the conclusion.";

const CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
    Capability::Streaming,
];

/// Construction options for [`DeepSeekProvider`].
#[derive(Debug, Clone, Default)]
pub struct DeepSeekOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub max_retries: Option<u32>,
}

pub struct DeepSeekProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    http: HttpTransport,
    retry: RetryPolicy,
    prices: PriceTable,
    ledger: UsageLedger,
}

impl DeepSeekProvider {
    pub fn new(options: DeepSeekOptions) -> Self {
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
            prices: PriceTable::deepseek(),
            ledger: UsageLedger::new(),
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

    /// Forces the reasoner model with a step-by-step system instruction when
    /// the caller supplied none.
    pub async fn chain_of_thought(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ProviderError> {
        self.generate_text(&chain_of_thought_request(request)).await
    }

    /// Cumulative counters since construction or the last reset.
    pub fn cache_stats(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Lifetime totals priced by the configured default model.
    pub fn cache_report(&self) -> LedgerReport {
        self.ledger.report(self.prices.lookup(&self.model))
    }

    pub fn reset_cache_stats(&self) {
        self.ledger.reset();
    }
}

pub(crate) fn chain_of_thought_request(request: &GenerationRequest) -> GenerationRequest {
    GenerationRequest {
        model: Some(REASONER_MODEL.into()),
        system_message: Some(
            request
                .system_message
                .clone()
                .unwrap_or_else(|| CHAIN_OF_THOUGHT_SYSTEM.into()),
        ),
        ..request.clone()
    }
}

#[async_trait]
impl Provider for DeepSeekProvider {
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
        let body = compat::chat_body(model.clone(), request, false);
        let mut result = compat::send_chat(&self.http, &self.retry, &self.chat_url(), key, &body).await?;

        // Billed exactly once per successful call; the retry loop sits
        // inside send_chat, so a retried call lands here a single time.
        let (hit, miss) = compat::cache_token_counts(result.raw.as_ref());
        self.ledger.record(hit, miss, result.usage.completion_tokens);
        result.cache = Some(usage::cache_info(hit, miss, self.prices.lookup(&model)));
        Ok(result)
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
    fn chain_of_thought_forces_reasoner_model() {
        let request = GenerationRequest {
            prompt: "why is the sky blue".into(),
            model: Some("deepseek-chat".into()),
            ..GenerationRequest::default()
        };
        let shaped = chain_of_thought_request(&request);
        assert_eq!(shaped.model.as_deref(), Some(REASONER_MODEL));
        assert_eq!(shaped.system_message.as_deref(), Some(CHAIN_OF_THOUGHT_SYSTEM));
        assert_eq!(shaped.prompt, "why is the sky blue");
    }

    #[test]
    fn chain_of_thought_keeps_caller_system_message() {
        let request = GenerationRequest {
            prompt: "p".into(),
            system_message: Some("answer in French".into()),
            ..GenerationRequest::default()
        };
        let shaped = chain_of_thought_request(&request);
        assert_eq!(shaped.system_message.as_deref(), Some("answer in French"));
    }

    #[test]
    fn defaults() {
        let provider = DeepSeekProvider::new(DeepSeekOptions::default());
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.model, DEFAULT_MODEL);
        assert_eq!(provider.cache_stats(), LedgerSnapshot::default());
    }

    #[test]
    fn missing_api_key_is_lazy_configuration_error() {
        let provider = DeepSeekProvider::new(DeepSeekOptions::default());
        let err = provider.api_key().unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
        assert!(err.to_string().starts_with("deepseek:"));
    }

    #[test]
    fn cache_report_uses_configured_model_prices() {
        let provider = DeepSeekProvider::new(DeepSeekOptions {
            model: Some(REASONER_MODEL.into()),
            ..DeepSeekOptions::default()
        });
        provider.ledger.record(1_000_000, 0, 0);
        // Reasoner rows: hit 0.14, miss 0.55 per million.
        let report = provider.cache_report();
        assert!((report.estimated_savings - 0.41).abs() < 1e-9);
        provider.reset_cache_stats();
        assert_eq!(provider.cache_stats(), LedgerSnapshot::default());
    }
}
