use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

/// Role tag on a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Function,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), name: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), name: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), name: None }
    }
}

// ---------------------------------------------------------------------------
// Text generation
// ---------------------------------------------------------------------------

/// Parameters for single-prompt text generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Optional system instruction prepended to the conversation.
    pub system_message: Option<String>,
    /// Target model; the adapter's configured default is used when absent.
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stream: bool,
}

impl GenerationRequest {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    /// Canonical conversion to the multi-turn chat shape: the system entry
    /// first (when present), then a single user entry with the prompt.
    pub fn to_chat_request(&self) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_message {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(self.prompt.clone()));
        ChatRequest {
            messages,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stream: self.stream,
            ..ChatRequest::default()
        }
    }
}

/// Output shape constraint the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Parameters for multi-turn chat completion. Message order is preserved
/// exactly as supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop: Vec<String>,
    /// End-user identifier forwarded to vendors that accept one.
    pub user: Option<String>,
    pub response_format: Option<ResponseFormat>,
    pub stream: bool,
}

// ---------------------------------------------------------------------------
// Usage & cache accounting
// ---------------------------------------------------------------------------

/// Token usage reported by a vendor. Counts the vendor omits are zero, not
/// null, so downstream arithmetic stays safe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Build from vendor-reported counts. When the vendor reports both the
    /// prompt and completion counts the total is derived from them;
    /// otherwise the vendor's total (or zero) is used.
    pub fn from_counts(prompt: Option<u64>, completion: Option<u64>, total: Option<u64>) -> Self {
        let prompt_tokens = prompt.unwrap_or(0);
        let completion_tokens = completion.unwrap_or(0);
        let total_tokens = match (prompt, completion) {
            (Some(p), Some(c)) => p + c,
            _ => total.unwrap_or(prompt_tokens + completion_tokens),
        };
        Self { prompt_tokens, completion_tokens, total_tokens }
    }
}

/// Cache-accounting sub-record for vendors that split prompt tokens into
/// cache hits and misses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub hit_tokens: u64,
    pub miss_tokens: u64,
    /// Fraction of prompt tokens served from cache, in `[0, 1]`.
    pub hit_rate: f64,
    /// USD saved versus paying the cache-miss price for every prompt token.
    pub estimated_savings: f64,
}

// ---------------------------------------------------------------------------
// Generation results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    pub text: String,
    pub usage: Usage,
    pub cache: Option<CacheInfo>,
    /// Raw vendor payload, for diagnostics only.
    pub raw: Option<serde_json::Value>,
}

/// Result of JSON-constrained generation: the parsed value, never raw text.
#[derive(Debug, Clone)]
pub struct JsonGenerationResult {
    pub value: serde_json::Value,
    pub usage: Usage,
    pub cache: Option<CacheInfo>,
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    pub n: Option<u8>,
    pub size: Option<String>,
    pub model: Option<String>,
    pub response_format: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageGenerationResult {
    pub urls: Vec<String>,
    pub raw: Option<serde_json::Value>,
}

/// Raw file contents handed to an upload endpoint. Producing the bytes is
/// the caller's job; the adapter only attaches them to the request.
#[derive(Debug, Clone)]
pub struct FilePayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ImageEditRequest {
    pub image: FilePayload,
    pub mask: Option<FilePayload>,
    pub prompt: String,
    pub n: Option<u8>,
    pub size: Option<String>,
    pub model: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImageVariationRequest {
    pub image: FilePayload,
    pub n: Option<u8>,
    pub size: Option<String>,
    pub model: Option<String>,
    pub user: Option<String>,
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub file: FilePayload,
    pub model: Option<String>,
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub response_format: Option<String>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TranscriptionResult {
    pub text: String,
    pub raw: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SpeechRequest {
    pub input: String,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub response_format: Option<String>,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SpeechResult {
    pub audio: Vec<u8>,
    pub format: String,
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum EmbeddingInput {
    Text(String),
    Batch(Vec<String>),
}

impl From<&str> for EmbeddingInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EmbeddingInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for EmbeddingInput {
    fn from(value: Vec<String>) -> Self {
        Self::Batch(value)
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub input: EmbeddingInput,
    pub model: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Embedding {
    pub index: usize,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Embedding>,
    pub model: String,
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// Model listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
}
