//! Provider registry and facade. The client holds named adapter instances,
//! resolves a default, and forwards unified-contract calls after checking
//! the declared capability set. It never inspects request contents and
//! never swallows adapter errors.

use crate::providers::anthropic::{AnthropicOptions, AnthropicProvider};
use crate::providers::deepseek::{self, DeepSeekOptions, DeepSeekProvider};
use crate::providers::doubao::{DoubaoOptions, DoubaoProvider};
use crate::providers::ernie::{ErnieOptions, ErnieProvider};
use crate::providers::gemini::{GeminiOptions, GeminiProvider};
use crate::providers::grok::{GrokOptions, GrokProvider};
use crate::providers::moonshot::{MoonshotOptions, MoonshotProvider};
use crate::providers::openai::{OpenAiOptions, OpenAiProvider};
use crate::providers::qwen::{QwenOptions, QwenProvider};
use crate::providers::spark::{SparkOptions, SparkProvider};
use crate::providers::zhipu::{ZhipuOptions, ZhipuProvider};
use crate::providers::{Capability, Provider, ProviderError};
use crate::streaming::ByteStream;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Unified client over the registered vendor adapters.
pub struct OmniClient {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_name: Option<String>,
}

impl OmniClient {
    pub fn new() -> Self {
        Self { providers: HashMap::new(), default_name: None }
    }

    pub fn builder() -> OmniClientBuilder {
        OmniClientBuilder::default()
    }

    /// Register `provider` under `name` (lower-cased). The last registration
    /// under a name wins; the first registration overall becomes the
    /// default when none was set explicitly.
    pub fn register(&mut self, name: &str, provider: Arc<dyn Provider>) {
        let name = name.to_lowercase();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    /// Make `name` the default. Returns false when nothing is registered
    /// under it.
    pub fn set_default(&mut self, name: &str) -> bool {
        let name = name.to_lowercase();
        if self.providers.contains_key(&name) {
            self.default_name = Some(name);
            true
        } else {
            false
        }
    }

    /// Registered provider names, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up `name`, or the default when absent.
    pub fn resolve(&self, name: Option<&str>) -> Result<&Arc<dyn Provider>, ProviderError> {
        let key = match name {
            Some(name) => name.to_lowercase(),
            None => self
                .default_name
                .clone()
                .ok_or_else(|| ProviderError::ProviderNotFound("default".into()))?,
        };
        self.providers
            .get(&key)
            .ok_or(ProviderError::ProviderNotFound(key))
    }

    fn resolve_with(
        &self,
        name: Option<&str>,
        capability: Capability,
    ) -> Result<&Arc<dyn Provider>, ProviderError> {
        let provider = self.resolve(name)?;
        if provider.supports(capability) {
            Ok(provider)
        } else {
            Err(provider.unsupported(capability))
        }
    }

    pub async fn generate_text(
        &self,
        request: &GenerationRequest,
        provider: Option<&str>,
    ) -> Result<GenerationResult, ProviderError> {
        self.resolve(provider)?.generate_text(request).await
    }

    pub async fn chat_completion(
        &self,
        request: &ChatRequest,
        provider: Option<&str>,
    ) -> Result<GenerationResult, ProviderError> {
        self.resolve_with(provider, Capability::ChatCompletion)?
            .chat_completion(request)
            .await
    }

    pub async fn generate_json(
        &self,
        request: &GenerationRequest,
        provider: Option<&str>,
    ) -> Result<JsonGenerationResult, ProviderError> {
        self.resolve_with(provider, Capability::JsonGeneration)?
            .generate_json(request)
            .await
    }

    pub async fn create_streaming_chat_completion(
        &self,
        request: &ChatRequest,
        provider: Option<&str>,
    ) -> Result<ByteStream, ProviderError> {
        self.resolve_with(provider, Capability::Streaming)?
            .create_streaming_chat_completion(request)
            .await
    }

    pub async fn generate_image(
        &self,
        request: &ImageGenerationRequest,
        provider: Option<&str>,
    ) -> Result<ImageGenerationResult, ProviderError> {
        self.resolve_with(provider, Capability::ImageGeneration)?
            .generate_image(request)
            .await
    }

    pub async fn edit_image(
        &self,
        request: &ImageEditRequest,
        provider: Option<&str>,
    ) -> Result<ImageGenerationResult, ProviderError> {
        self.resolve_with(provider, Capability::ImageEdit)?
            .edit_image(request)
            .await
    }

    pub async fn create_image_variation(
        &self,
        request: &ImageVariationRequest,
        provider: Option<&str>,
    ) -> Result<ImageGenerationResult, ProviderError> {
        self.resolve_with(provider, Capability::ImageVariation)?
            .create_image_variation(request)
            .await
    }

    pub async fn transcribe_audio(
        &self,
        request: &TranscriptionRequest,
        provider: Option<&str>,
    ) -> Result<TranscriptionResult, ProviderError> {
        self.resolve_with(provider, Capability::AudioTranscription)?
            .transcribe_audio(request)
            .await
    }

    pub async fn text_to_speech(
        &self,
        request: &SpeechRequest,
        provider: Option<&str>,
    ) -> Result<SpeechResult, ProviderError> {
        self.resolve_with(provider, Capability::TextToSpeech)?
            .text_to_speech(request)
            .await
    }

    pub async fn create_embedding(
        &self,
        request: &EmbeddingRequest,
        provider: Option<&str>,
    ) -> Result<EmbeddingResult, ProviderError> {
        self.resolve_with(provider, Capability::Embeddings)?
            .create_embedding(request)
            .await
    }

    pub async fn list_models(
        &self,
        provider: Option<&str>,
    ) -> Result<Vec<ModelInfo>, ProviderError> {
        self.resolve_with(provider, Capability::ModelListing)?
            .list_models()
            .await
    }

    /// Chain-of-thought generation through the DeepSeek adapter: the
    /// request is reshaped onto the reasoner model with a step-by-step
    /// system instruction when the caller supplied none.
    pub async fn chain_of_thought(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ProviderError> {
        let provider = self.resolve(Some("deepseek"))?;
        provider
            .generate_text(&deepseek::chain_of_thought_request(request))
            .await
    }
}

impl Default for OmniClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a fully-registered client from per-vendor options. Vendors are
/// registered in a fixed priority order, so with no explicit default the
/// first configured vendor in that order answers `resolve(None)`.
#[derive(Default)]
pub struct OmniClientBuilder {
    openai: Option<OpenAiOptions>,
    anthropic: Option<AnthropicOptions>,
    gemini: Option<GeminiOptions>,
    deepseek: Option<DeepSeekOptions>,
    grok: Option<GrokOptions>,
    doubao: Option<DoubaoOptions>,
    moonshot: Option<MoonshotOptions>,
    spark: Option<SparkOptions>,
    zhipu: Option<ZhipuOptions>,
    ernie: Option<ErnieOptions>,
    qwen: Option<QwenOptions>,
    default_provider: Option<String>,
}

impl OmniClientBuilder {
    pub fn with_openai(mut self, options: OpenAiOptions) -> Self {
        self.openai = Some(options);
        self
    }

    pub fn with_anthropic(mut self, options: AnthropicOptions) -> Self {
        self.anthropic = Some(options);
        self
    }

    pub fn with_gemini(mut self, options: GeminiOptions) -> Self {
        self.gemini = Some(options);
        self
    }

    pub fn with_deepseek(mut self, options: DeepSeekOptions) -> Self {
        self.deepseek = Some(options);
        self
    }

    pub fn with_grok(mut self, options: GrokOptions) -> Self {
        self.grok = Some(options);
        self
    }

    pub fn with_doubao(mut self, options: DoubaoOptions) -> Self {
        self.doubao = Some(options);
        self
    }

    pub fn with_moonshot(mut self, options: MoonshotOptions) -> Self {
        self.moonshot = Some(options);
        self
    }

    pub fn with_spark(mut self, options: SparkOptions) -> Self {
        self.spark = Some(options);
        self
    }

    pub fn with_zhipu(mut self, options: ZhipuOptions) -> Self {
        self.zhipu = Some(options);
        self
    }

    pub fn with_ernie(mut self, options: ErnieOptions) -> Self {
        self.ernie = Some(options);
        self
    }

    pub fn with_qwen(mut self, options: QwenOptions) -> Self {
        self.qwen = Some(options);
        self
    }

    pub fn default_provider(mut self, name: &str) -> Self {
        self.default_provider = Some(name.to_string());
        self
    }

    pub fn build(self) -> OmniClient {
        let mut client = OmniClient::new();
        if let Some(options) = self.openai {
            client.register("openai", Arc::new(OpenAiProvider::new(options)));
        }
        if let Some(options) = self.anthropic {
            client.register("anthropic", Arc::new(AnthropicProvider::new(options)));
        }
        if let Some(options) = self.gemini {
            client.register("gemini", Arc::new(GeminiProvider::new(options)));
        }
        if let Some(options) = self.deepseek {
            client.register("deepseek", Arc::new(DeepSeekProvider::new(options)));
        }
        if let Some(options) = self.grok {
            client.register("grok", Arc::new(GrokProvider::new(options)));
        }
        if let Some(options) = self.doubao {
            client.register("doubao", Arc::new(DoubaoProvider::new(options)));
        }
        if let Some(options) = self.moonshot {
            client.register("moonshot", Arc::new(MoonshotProvider::new(options)));
        }
        if let Some(options) = self.spark {
            client.register("spark", Arc::new(SparkProvider::new(options)));
        }
        if let Some(options) = self.zhipu {
            client.register("zhipu", Arc::new(ZhipuProvider::new(options)));
        }
        if let Some(options) = self.ernie {
            client.register("ernie", Arc::new(ErnieProvider::new(options)));
        }
        if let Some(options) = self.qwen {
            client.register("qwen", Arc::new(QwenProvider::new(options)));
        }
        if let Some(name) = self.default_provider {
            client.set_default(&name);
        }
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::parse_json_payload;
    use async_trait::async_trait;

    struct StubProvider {
        name: &'static str,
        capabilities: &'static [Capability],
    }

    impl StubProvider {
        fn text_only(name: &'static str) -> Arc<dyn Provider> {
            Arc::new(Self { name, capabilities: &[Capability::TextGeneration] })
        }

        fn with_json(name: &'static str) -> Arc<dyn Provider> {
            Arc::new(Self {
                name,
                capabilities: &[Capability::TextGeneration, Capability::JsonGeneration],
            })
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> &[Capability] {
            self.capabilities
        }

        async fn generate_text(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationResult, ProviderError> {
            Ok(GenerationResult {
                text: format!("{}-reply", self.name),
                ..GenerationResult::default()
            })
        }

        async fn generate_json(
            &self,
            _request: &GenerationRequest,
        ) -> Result<JsonGenerationResult, ProviderError> {
            // Mimics a vendor answering with plain prose in JSON mode.
            let value = parse_json_payload(self.name(), "not-json")?;
            Ok(JsonGenerationResult { value, usage: Usage::default(), cache: None })
        }
    }

    #[tokio::test]
    async fn first_registered_provider_is_the_default() {
        let mut client = OmniClient::new();
        client.register("a", StubProvider::text_only("a"));
        client.register("b", StubProvider::text_only("b"));

        let result = client
            .generate_text(&GenerationRequest::from_prompt("hi"), None)
            .await
            .unwrap();
        assert_eq!(result.text, "a-reply");
    }

    #[tokio::test]
    async fn set_default_switches_resolution() {
        let mut client = OmniClient::new();
        client.register("a", StubProvider::text_only("a"));
        client.register("b", StubProvider::text_only("b"));

        assert!(client.set_default("b"));
        assert_eq!(client.resolve(None).unwrap().name(), "b");
        assert!(!client.set_default("missing"));
        assert_eq!(client.resolve(None).unwrap().name(), "b");
    }

    #[test]
    fn names_are_lower_cased_and_last_registration_wins() {
        let mut client = OmniClient::new();
        client.register("OpenAI", StubProvider::text_only("first"));
        client.register("openai", StubProvider::text_only("second"));

        assert_eq!(client.resolve(Some("OPENAI")).unwrap().name(), "second");
        assert_eq!(client.provider_names(), vec!["openai"]);
    }

    #[test]
    fn unknown_provider_is_not_found() {
        let client = OmniClient::new();
        let err = client.resolve(Some("nope")).unwrap_err();
        assert!(matches!(err, ProviderError::ProviderNotFound(name) if name == "nope"));

        let err = client.resolve(None).unwrap_err();
        assert!(matches!(err, ProviderError::ProviderNotFound(_)));
    }

    #[tokio::test]
    async fn streaming_against_text_only_adapter_is_unsupported() {
        let mut client = OmniClient::new();
        client.register("spark", StubProvider::text_only("spark"));

        let err = match client
            .create_streaming_chat_completion(&ChatRequest::default(), Some("spark"))
            .await
        {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert_eq!(err.to_string(), "spark does not support streaming");
        match err {
            ProviderError::UnsupportedCapability { provider, capability } => {
                assert_eq!(provider, "spark");
                assert_eq!(capability, Capability::Streaming);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn json_decode_failure_carries_raw_text_through_the_facade() {
        let mut client = OmniClient::new();
        client.register("stub", StubProvider::with_json("stub"));

        let err = client
            .generate_json(&GenerationRequest::from_prompt("give me json"), None)
            .await
            .unwrap_err();
        match err {
            ProviderError::JsonDecodeFailure { raw, .. } => assert_eq!(raw, "not-json"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn capability_check_happens_before_dispatch() {
        let mut client = OmniClient::new();
        client.register("stub", StubProvider::text_only("stub"));

        let err = client
            .generate_json(&GenerationRequest::from_prompt("p"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedCapability { .. }));
    }

    #[tokio::test]
    async fn chain_of_thought_requires_a_deepseek_registration() {
        let mut client = OmniClient::new();
        client.register("openai", StubProvider::text_only("openai"));

        let err = client
            .chain_of_thought(&GenerationRequest::from_prompt("p"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ProviderNotFound(name) if name == "deepseek"));
    }

    #[test]
    fn builder_registers_in_priority_order() {
        let client = OmniClient::builder()
            .with_deepseek(DeepSeekOptions::default())
            .with_openai(OpenAiOptions::default())
            .build();
        // openai outranks deepseek regardless of call order.
        assert_eq!(client.resolve(None).unwrap().name(), "openai");
        assert_eq!(client.provider_names(), vec!["deepseek", "openai"]);
    }

    #[test]
    fn builder_honours_explicit_default() {
        let client = OmniClient::builder()
            .with_openai(OpenAiOptions::default())
            .with_zhipu(ZhipuOptions::default())
            .default_provider("zhipu")
            .build();
        assert_eq!(client.resolve(None).unwrap().name(), "zhipu");
    }
}
