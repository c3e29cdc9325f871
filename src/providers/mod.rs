pub mod anthropic;
pub mod deepseek;
pub mod doubao;
pub mod ernie;
pub mod gemini;
pub mod grok;
pub mod moonshot;
pub mod openai;
pub(crate) mod openai_compat;
pub mod qwen;
pub mod retry;
pub mod sanitize;
pub mod spark;
pub mod zhipu;

use crate::streaming::ByteStream;
use crate::types::*;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Optional operations an adapter may declare. The set is fixed at
/// construction and checked by the facade before dispatch; it is never
/// discovered by probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    TextGeneration,
    ChatCompletion,
    JsonGeneration,
    Streaming,
    ImageGeneration,
    ImageEdit,
    ImageVariation,
    AudioTranscription,
    TextToSpeech,
    Embeddings,
    ModelListing,
}

impl Capability {
    /// Label used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Capability::TextGeneration => "text generation",
            Capability::ChatCompletion => "chat completion",
            Capability::JsonGeneration => "JSON generation",
            Capability::Streaming => "streaming",
            Capability::ImageGeneration => "image generation",
            Capability::ImageEdit => "image editing",
            Capability::ImageVariation => "image variation",
            Capability::AudioTranscription => "audio transcription",
            Capability::TextToSpeech => "text to speech",
            Capability::Embeddings => "embeddings",
            Capability::ModelListing => "model listing",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors from provider operations.
///
/// Transient variants (timeouts, transport errors, 408/429/5xx statuses)
/// are retried by [`retry::run`]; everything else propagates immediately.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A required credential field is missing. Raised at first use, not at
    /// construction, so partially-configured adapters can be registered.
    #[error("{provider}: missing configuration: {message}")]
    Configuration { provider: String, message: String },

    /// Credential exchange or signing failed, or the vendor answered
    /// 401/403.
    #[error("{provider}: authentication failed: {message}")]
    Auth { provider: String, message: String },

    /// Non-2xx vendor status. The body is scrubbed of secret-like tokens
    /// and truncated before it lands here.
    #[error("{provider}: HTTP error {status}: {body}")]
    Http { provider: String, status: u16, body: String },

    /// Transport-level failure (connection reset, DNS, TLS).
    #[error("{provider}: network error: {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// No response within the configured timeout window.
    #[error("{provider}: no response within {timeout:?}")]
    RequestTimeout { provider: String, timeout: Duration },

    /// The vendor answered 2xx but the payload did not match its wire
    /// contract, or carried a vendor-reported failure code.
    #[error("{provider}: malformed response: {message}")]
    MalformedResponse { provider: String, message: String },

    /// JSON-constrained generation produced text that does not parse. The
    /// raw text is carried for caller inspection.
    #[error("{provider}: response is not valid JSON")]
    JsonDecodeFailure { provider: String, raw: String },

    #[error("{provider} does not support {capability}")]
    UnsupportedCapability { provider: String, capability: Capability },

    #[error("no provider registered under \"{0}\"")]
    ProviderNotFound(String),

    /// The retry budget was spent; wraps the last transient error.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ProviderError>,
    },
}

/// Contract implemented by every vendor adapter.
///
/// `generate_text` is mandatory. The remaining operations are optional: an
/// adapter declares the ones it implements via [`Provider::capabilities`]
/// and the facade refuses to dispatch anything undeclared. The default
/// bodies return [`ProviderError::UnsupportedCapability`] so an undeclared
/// operation can never half-exist.
impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("dyn Provider").field("name", &self.name()).finish()
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    /// Immutable provider name.
    fn name(&self) -> &str;

    /// The fixed set of operations this adapter implements.
    fn capabilities(&self) -> &[Capability];

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Error value for an operation this adapter does not declare.
    fn unsupported(&self, capability: Capability) -> ProviderError {
        ProviderError::UnsupportedCapability {
            provider: self.name().to_string(),
            capability,
        }
    }

    async fn generate_text(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ProviderError>;

    async fn chat_completion(
        &self,
        _request: &ChatRequest,
    ) -> Result<GenerationResult, ProviderError> {
        Err(self.unsupported(Capability::ChatCompletion))
    }

    async fn generate_json(
        &self,
        _request: &GenerationRequest,
    ) -> Result<JsonGenerationResult, ProviderError> {
        Err(self.unsupported(Capability::JsonGeneration))
    }

    async fn create_streaming_chat_completion(
        &self,
        _request: &ChatRequest,
    ) -> Result<ByteStream, ProviderError> {
        Err(self.unsupported(Capability::Streaming))
    }

    async fn generate_image(
        &self,
        _request: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResult, ProviderError> {
        Err(self.unsupported(Capability::ImageGeneration))
    }

    async fn edit_image(
        &self,
        _request: &ImageEditRequest,
    ) -> Result<ImageGenerationResult, ProviderError> {
        Err(self.unsupported(Capability::ImageEdit))
    }

    async fn create_image_variation(
        &self,
        _request: &ImageVariationRequest,
    ) -> Result<ImageGenerationResult, ProviderError> {
        Err(self.unsupported(Capability::ImageVariation))
    }

    async fn transcribe_audio(
        &self,
        _request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, ProviderError> {
        Err(self.unsupported(Capability::AudioTranscription))
    }

    async fn text_to_speech(
        &self,
        _request: &SpeechRequest,
    ) -> Result<SpeechResult, ProviderError> {
        Err(self.unsupported(Capability::TextToSpeech))
    }

    async fn create_embedding(
        &self,
        _request: &EmbeddingRequest,
    ) -> Result<EmbeddingResult, ProviderError> {
        Err(self.unsupported(Capability::Embeddings))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Err(self.unsupported(Capability::ModelListing))
    }
}

// ---------------------------------------------------------------------------
// Shared JSON-mode helpers
// ---------------------------------------------------------------------------

pub(crate) const JSON_ONLY_INSTRUCTION: &str =
    "Respond with valid JSON only, with no surrounding text.";

/// Extend the leading system message with the JSON-only instruction, or
/// insert one when the conversation has none.
pub(crate) fn push_json_instruction(messages: &mut Vec<ChatMessage>) {
    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            first.content.push('\n');
            first.content.push_str(JSON_ONLY_INSTRUCTION);
        }
        _ => messages.insert(0, ChatMessage::system(JSON_ONLY_INSTRUCTION)),
    }
}

/// Parse the text of a JSON-constrained completion, surfacing the raw text
/// on failure.
pub(crate) fn parse_json_payload(
    provider: &str,
    text: &str,
) -> Result<serde_json::Value, ProviderError> {
    serde_json::from_str(text.trim()).map_err(|_| ProviderError::JsonDecodeFailure {
        provider: provider.to_string(),
        raw: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_labels_read_naturally() {
        assert_eq!(Capability::Streaming.to_string(), "streaming");
        assert_eq!(Capability::Embeddings.to_string(), "embeddings");
        assert_eq!(Capability::ImageEdit.to_string(), "image editing");
    }

    #[test]
    fn unsupported_capability_names_provider_and_capability() {
        let err = ProviderError::UnsupportedCapability {
            provider: "spark".into(),
            capability: Capability::Streaming,
        };
        assert_eq!(err.to_string(), "spark does not support streaming");
    }

    #[test]
    fn push_json_instruction_extends_existing_system_message() {
        let mut messages = vec![ChatMessage::system("be terse"), ChatMessage::user("hi")];
        push_json_instruction(&mut messages);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.starts_with("be terse\n"));
        assert!(messages[0].content.ends_with(JSON_ONLY_INSTRUCTION));
    }

    #[test]
    fn push_json_instruction_inserts_system_message_when_absent() {
        let mut messages = vec![ChatMessage::user("hi")];
        push_json_instruction(&mut messages);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, JSON_ONLY_INSTRUCTION);
    }

    #[test]
    fn parse_json_payload_returns_value() {
        let value = parse_json_payload("openai", r#" {"a": 1} "#).expect("valid JSON");
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn parse_json_payload_carries_raw_text() {
        let err = parse_json_payload("deepseek", "not-json").unwrap_err();
        match err {
            ProviderError::JsonDecodeFailure { provider, raw } => {
                assert_eq!(provider, "deepseek");
                assert_eq!(raw, "not-json");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
