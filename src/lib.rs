pub mod auth;
pub mod client;
pub mod http;
pub mod providers;
pub mod streaming;
pub mod types;
pub mod usage;

// Re-exports for convenience
pub use client::{OmniClient, OmniClientBuilder};
pub use providers::anthropic::{AnthropicOptions, AnthropicProvider};
pub use providers::deepseek::{DeepSeekOptions, DeepSeekProvider};
pub use providers::doubao::{DoubaoOptions, DoubaoProvider};
pub use providers::ernie::{ErnieOptions, ErnieProvider};
pub use providers::gemini::{GeminiOptions, GeminiProvider};
pub use providers::grok::{GrokOptions, GrokProvider};
pub use providers::moonshot::{MoonshotOptions, MoonshotProvider};
pub use providers::openai::{OpenAiOptions, OpenAiProvider};
pub use providers::qwen::{QwenApiMode, QwenOptions, QwenProvider};
pub use providers::retry::RetryPolicy;
pub use providers::spark::{SparkOptions, SparkProvider};
pub use providers::zhipu::{ZhipuOptions, ZhipuProvider};
pub use providers::{Capability, Provider, ProviderError};
pub use streaming::ByteStream;
pub use types::*;
pub use usage::{LedgerReport, LedgerSnapshot, ModelPrices, PriceTable, UsageLedger};
