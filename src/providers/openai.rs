//! OpenAI adapter: chat and legacy completions, DALL-E images, Whisper
//! transcription, speech synthesis, embeddings, and model listing.

use super::openai_compat as compat;
use super::retry::{self, RetryPolicy};
use super::{Capability, Provider, ProviderError};
use crate::http::HttpTransport;
use crate::streaming::{self, ByteStream};
use crate::types::*;
use async_trait::async_trait;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
const DEFAULT_SPEECH_MODEL: &str = "tts-1";
const DEFAULT_SPEECH_VOICE: &str = "alloy";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const CAPABILITIES: &[Capability] = &[
    Capability::TextGeneration,
    Capability::ChatCompletion,
    Capability::JsonGeneration,
    Capability::Streaming,
    Capability::ImageGeneration,
    Capability::ImageEdit,
    Capability::ImageVariation,
    Capability::AudioTranscription,
    Capability::TextToSpeech,
    Capability::Embeddings,
    Capability::ModelListing,
];

/// Construction options for [`OpenAiProvider`].
#[derive(Debug, Clone, Default)]
pub struct OpenAiOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub organization: Option<String>,
    pub max_retries: Option<u32>,
}

pub struct OpenAiProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    organization: Option<String>,
    http: HttpTransport,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(options: OpenAiOptions) -> Self {
        Self {
            http: HttpTransport::new(PROVIDER, options.timeout),
            api_key: options.api_key,
            base_url: options
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            model: options.model.unwrap_or_else(|| DEFAULT_MODEL.into()),
            organization: options.organization,
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

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, request: reqwest::RequestBuilder, key: &str) -> reqwest::RequestBuilder {
        let request = request.bearer_auth(key);
        match &self.organization {
            Some(org) => request.header("OpenAI-Organization", org),
            None => request,
        }
    }

    async fn send_chat(&self, body: &compat::ChatCompletionBody) -> Result<GenerationResult, ProviderError> {
        let key = self.api_key()?;
        let url = self.url("/chat/completions");
        let value: Value = retry::run(&self.retry, || async {
            let request = self.authed(self.http.post(&url), key).json(body);
            self.http.send_json(request).await
        })
        .await?;
        compat::parse_chat_value(PROVIDER, value)
    }

    /// Legacy single-prompt endpoint, kept for calls without a system
    /// instruction.
    async fn send_completions(&self, request: &GenerationRequest) -> Result<GenerationResult, ProviderError> {
        let key = self.api_key()?;
        let url = self.url("/completions");
        let body = CompletionsBody {
            model: request.model.as_deref().unwrap_or(&self.model),
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stream: false,
        };
        let value: Value = retry::run(&self.retry, || async {
            let req = self.authed(self.http.post(&url), key).json(&body);
            self.http.send_json(req).await
        })
        .await?;
        parse_completions_value(value)
    }

    /// Metadata for a single model id.
    pub async fn get_model(&self, model_id: &str) -> Result<ModelInfo, ProviderError> {
        let key = self.api_key()?;
        let url = self.url(&format!("/models/{model_id}"));
        let entry: ModelEntry = retry::run(&self.retry, || async {
            let req = self.authed(self.http.get(&url), key);
            self.http.send_json(req).await
        })
        .await?;
        Ok(ModelInfo {
            id: entry.id,
            owned_by: entry.owned_by,
            created: entry.created,
        })
    }
}

#[derive(Debug, Serialize)]
struct CompletionsBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<compat::WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

fn parse_completions_value(value: Value) -> Result<GenerationResult, ProviderError> {
    let response: CompletionsResponse =
        serde_json::from_value(value.clone()).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;
    let text = response
        .choices
        .first()
        .map(|c| c.text.trim().to_string())
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: "response contained no choices".into(),
        })?;
    let usage = response.usage.unwrap_or_default().to_usage();
    Ok(GenerationResult { text, usage, cache: None, raw: Some(value) })
}

#[derive(Debug, Serialize)]
struct ImageGenerationBody<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    response_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ImageDataResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
}

fn parse_image_value(value: Value) -> Result<ImageGenerationResult, ProviderError> {
    let response: ImageDataResponse =
        serde_json::from_value(value.clone()).map_err(|e| ProviderError::MalformedResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;
    let urls = response.data.into_iter().filter_map(|d| d.url).collect();
    Ok(ImageGenerationResult { urls, raw: Some(value) })
}

fn file_part(file: &FilePayload) -> multipart::Part {
    multipart::Part::bytes(file.bytes.clone()).file_name(file.file_name.clone())
}

#[derive(Debug, Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
    speed: f64,
}

#[derive(Debug, Serialize)]
struct EmbeddingsBody<'a> {
    model: &'a str,
    input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
    model: String,
    #[serde(default)]
    usage: Option<compat::WireUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
    #[serde(default)]
    created: Option<i64>,
}

#[async_trait]
impl Provider for OpenAiProvider {
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
        // Multi-turn chat is the canonical path; the legacy completions
        // endpoint only serves system-less prompts.
        if request.system_message.is_some() {
            self.chat_completion(&request.to_chat_request()).await
        } else {
            self.send_completions(request).await
        }
    }

    async fn chat_completion(
        &self,
        request: &ChatRequest,
    ) -> Result<GenerationResult, ProviderError> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let body = compat::chat_body(model, request, false);
        self.send_chat(&body).await
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
        let req = self
            .authed(self.http.streaming_post(&self.url("/chat/completions")), key)
            .header("Accept", "text/event-stream")
            .json(&body);
        streaming::open_byte_stream(&self.http, req).await
    }

    async fn generate_image(
        &self,
        request: &ImageGenerationRequest,
    ) -> Result<ImageGenerationResult, ProviderError> {
        let key = self.api_key()?;
        let url = self.url("/images/generations");
        let body = ImageGenerationBody {
            model: request.model.as_deref().unwrap_or(DEFAULT_IMAGE_MODEL),
            prompt: &request.prompt,
            n: request.n.unwrap_or(1),
            size: request.size.as_deref().unwrap_or("1024x1024"),
            response_format: request.response_format.as_deref().unwrap_or("url"),
            user: request.user.as_deref(),
        };
        let value: Value = retry::run(&self.retry, || async {
            let req = self.authed(self.http.post(&url), key).json(&body);
            self.http.send_json(req).await
        })
        .await?;
        parse_image_value(value)
    }

    async fn edit_image(
        &self,
        request: &ImageEditRequest,
    ) -> Result<ImageGenerationResult, ProviderError> {
        let key = self.api_key()?;
        let url = self.url("/images/edits");
        let value: Value = retry::run(&self.retry, || async {
            let mut form = multipart::Form::new()
                .part("image", file_part(&request.image))
                .text("prompt", request.prompt.clone());
            if let Some(mask) = &request.mask {
                form = form.part("mask", file_part(mask));
            }
            if let Some(n) = request.n {
                form = form.text("n", n.to_string());
            }
            if let Some(size) = &request.size {
                form = form.text("size", size.clone());
            }
            if let Some(model) = &request.model {
                form = form.text("model", model.clone());
            }
            if let Some(user) = &request.user {
                form = form.text("user", user.clone());
            }
            let req = self.authed(self.http.post(&url), key).multipart(form);
            self.http.send_json(req).await
        })
        .await?;
        parse_image_value(value)
    }

    async fn create_image_variation(
        &self,
        request: &ImageVariationRequest,
    ) -> Result<ImageGenerationResult, ProviderError> {
        let key = self.api_key()?;
        let url = self.url("/images/variations");
        let value: Value = retry::run(&self.retry, || async {
            let mut form = multipart::Form::new().part("image", file_part(&request.image));
            if let Some(n) = request.n {
                form = form.text("n", n.to_string());
            }
            if let Some(size) = &request.size {
                form = form.text("size", size.clone());
            }
            if let Some(model) = &request.model {
                form = form.text("model", model.clone());
            }
            if let Some(user) = &request.user {
                form = form.text("user", user.clone());
            }
            let req = self.authed(self.http.post(&url), key).multipart(form);
            self.http.send_json(req).await
        })
        .await?;
        parse_image_value(value)
    }

    async fn transcribe_audio(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionResult, ProviderError> {
        let key = self.api_key()?;
        let url = self.url("/audio/transcriptions");
        let plain_text = request.response_format.as_deref() == Some("text");

        let build_form = || {
            let mut form = multipart::Form::new()
                .part("file", file_part(&request.file))
                .text(
                    "model",
                    request
                        .model
                        .clone()
                        .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.into()),
                );
            if let Some(language) = &request.language {
                form = form.text("language", language.clone());
            }
            if let Some(prompt) = &request.prompt {
                form = form.text("prompt", prompt.clone());
            }
            if let Some(format) = &request.response_format {
                form = form.text("response_format", format.clone());
            }
            if let Some(temperature) = request.temperature {
                form = form.text("temperature", temperature.to_string());
            }
            form
        };

        if plain_text {
            let text = retry::run(&self.retry, || async {
                let req = self.authed(self.http.post(&url), key).multipart(build_form());
                self.http.send_text(req).await
            })
            .await?;
            return Ok(TranscriptionResult { text, raw: None });
        }

        let value: Value = retry::run(&self.retry, || async {
            let req = self.authed(self.http.post(&url), key).multipart(build_form());
            self.http.send_json(req).await
        })
        .await?;
        let text = value
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: PROVIDER.into(),
                message: "transcription response has no text field".into(),
            })?
            .to_string();
        Ok(TranscriptionResult { text, raw: Some(value) })
    }

    async fn text_to_speech(
        &self,
        request: &SpeechRequest,
    ) -> Result<SpeechResult, ProviderError> {
        let key = self.api_key()?;
        let url = self.url("/audio/speech");
        let format = request.response_format.as_deref().unwrap_or("mp3");
        let body = SpeechBody {
            model: request.model.as_deref().unwrap_or(DEFAULT_SPEECH_MODEL),
            input: &request.input,
            voice: request.voice.as_deref().unwrap_or(DEFAULT_SPEECH_VOICE),
            response_format: format,
            speed: request.speed.unwrap_or(1.0),
        };
        let audio = retry::run(&self.retry, || async {
            let req = self.authed(self.http.post(&url), key).json(&body);
            self.http.send_bytes(req).await
        })
        .await?;
        Ok(SpeechResult { audio: audio.to_vec(), format: format.to_string() })
    }

    async fn create_embedding(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResult, ProviderError> {
        let key = self.api_key()?;
        let url = self.url("/embeddings");
        let input = match &request.input {
            EmbeddingInput::Text(text) => Value::String(text.clone()),
            EmbeddingInput::Batch(texts) => serde_json::json!(texts),
        };
        let body = EmbeddingsBody {
            model: request.model.as_deref().unwrap_or(DEFAULT_EMBEDDING_MODEL),
            input,
            user: request.user.as_deref(),
        };
        let response: EmbeddingsResponse = retry::run(&self.retry, || async {
            let req = self.authed(self.http.post(&url), key).json(&body);
            self.http.send_json(req).await
        })
        .await?;
        Ok(EmbeddingResult {
            embeddings: response
                .data
                .into_iter()
                .map(|row| Embedding { index: row.index, values: row.embedding })
                .collect(),
            model: response.model,
            usage: response.usage.unwrap_or_default().to_usage(),
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let key = self.api_key()?;
        let url = self.url("/models");
        let response: ModelsResponse = retry::run(&self.retry, || async {
            let req = self.authed(self.http.get(&url), key);
            self.http.send_json(req).await
        })
        .await?;
        Ok(response
            .data
            .into_iter()
            .map(|entry| ModelInfo {
                id: entry.id,
                owned_by: entry.owned_by,
                created: entry.created,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completions_parse_trims_text() {
        let value = json!({
            "choices": [{"text": "  hello  "}],
            "usage": {"prompt_tokens": 2, "completion_tokens": 3, "total_tokens": 5}
        });
        let result = parse_completions_value(value).unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(result.usage.total_tokens, 5);
    }

    #[test]
    fn completions_parse_rejects_missing_choices() {
        let err = parse_completions_value(json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[test]
    fn image_parse_collects_urls() {
        let value = json!({"data": [{"url": "https://a"}, {"url": "https://b"}, {}]});
        let result = parse_image_value(value).unwrap();
        assert_eq!(result.urls, vec!["https://a", "https://b"]);
    }

    #[test]
    fn default_base_url_and_model() {
        let provider = OpenAiProvider::new(OpenAiOptions::default());
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.model, DEFAULT_MODEL);
    }

    #[test]
    fn missing_api_key_is_lazy_configuration_error() {
        let provider = OpenAiProvider::new(OpenAiOptions::default());
        let err = provider.api_key().unwrap_err();
        assert!(matches!(err, ProviderError::Configuration { .. }));
    }

    #[test]
    fn trailing_slash_is_stripped_from_base_url() {
        let provider = OpenAiProvider::new(OpenAiOptions {
            base_url: Some("https://proxy.example.com/v1/".into()),
            ..OpenAiOptions::default()
        });
        assert_eq!(provider.url("/models"), "https://proxy.example.com/v1/models");
    }
}
