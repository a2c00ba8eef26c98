//! Provider trait: the abstraction over LLM vendors.
//!
//! A provider adapter knows how to send the canonical message stack to one
//! vendor and normalize the reply back into a canonical assistant message
//! plus token usage.
//!
//! Implementations: OpenAI-compatible, Anthropic, Gemini, Bedrock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::manifest::ToolDeclaration;
use crate::message::Message;

/// How the model is allowed (or forced) to call tools on a turn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// Model decides.
    Auto,
    /// Model must call some tool.
    #[default]
    Required,
    /// Model must not call tools.
    None,
    /// Model must call this specific tool.
    Tool(String),
}

impl ToolChoice {
    /// Parse the manifest/config spelling: `auto`, `required`, `none`, or a tool name.
    pub fn parse(s: &str) -> Self {
        match s {
            "auto" => ToolChoice::Auto,
            "required" | "any" => ToolChoice::Required,
            "none" => ToolChoice::None,
            name => ToolChoice::Tool(name.to_string()),
        }
    }
}

impl std::fmt::Display for ToolChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolChoice::Auto => f.write_str("auto"),
            ToolChoice::Required => f.write_str("required"),
            ToolChoice::None => f.write_str("none"),
            ToolChoice::Tool(name) => f.write_str(name),
        }
    }
}

impl Serialize for ToolChoice {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ToolChoice {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ToolChoice::parse(&s))
    }
}

/// Per-turn invocation options.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Tool declarations offered to the model
    pub tools: Vec<ToolDeclaration>,

    /// Tool-choice directive for this turn
    pub tool_choice: ToolChoice,
}

/// Token usage for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// A normalized response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The assistant message, in canonical form
    pub message: Message,

    /// Token usage statistics
    pub usage: Usage,
}

/// The core Provider trait.
///
/// The orchestrator calls `invoke()` without knowing which vendor is behind
/// it. Credentials are checked when the adapter is constructed, so `invoke`
/// only fails on transport or vendor errors.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable provider name (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// The vendor model this adapter targets.
    fn model(&self) -> &str;

    /// Send the message stack and return the normalized reply.
    async fn invoke(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Whether the message requests any tool calls.
    fn has_tool_calls(&self, message: &Message) -> bool {
        !message.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_parsing() {
        assert_eq!(ToolChoice::parse("auto"), ToolChoice::Auto);
        assert_eq!(ToolChoice::parse("required"), ToolChoice::Required);
        assert_eq!(ToolChoice::parse("none"), ToolChoice::None);
        assert_eq!(
            ToolChoice::parse("finish_agent_run"),
            ToolChoice::Tool("finish_agent_run".into())
        );
    }

    #[test]
    fn default_choice_forces_a_call() {
        assert_eq!(ToolChoice::default(), ToolChoice::Required);
        assert_eq!(InvokeOptions::default().tool_choice, ToolChoice::Required);
    }

    #[test]
    fn tool_choice_serializes_as_string() {
        let json = serde_json::to_string(&ToolChoice::Tool("search".into())).unwrap();
        assert_eq!(json, "\"search\"");
        let back: ToolChoice = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(back, ToolChoice::Auto);
    }
}
