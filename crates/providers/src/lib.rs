//! LLM provider adapters for agentrun.
//!
//! All adapters implement the `agentrun_core::Provider` trait.
//! [`build_provider`] selects the correct one for a model configuration.

pub mod anthropic;
pub mod bedrock;
pub mod gemini;
mod http;
pub mod openai_compat;
pub mod router;
pub mod schema;
pub mod sigv4;

pub use anthropic::AnthropicProvider;
pub use bedrock::{AwsCredentials, BedrockProvider};
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderKind, build_provider};
