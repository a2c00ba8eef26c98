//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Groq, DeepSeek, Together AI, Fireworks,
//! Mistral, xAI, Ollama, vLLM, and any endpoint exposing
//! `/chat/completions`.
//!
//! Supports:
//! - Multimodal user content (`image_url` parts, data URLs for inline images)
//! - Tool use / function calling with `tool_choice`
//! - Arbitrary request parameters merged into the body top level

use agentrun_core::error::ProviderError;
use agentrun_core::manifest::ToolDeclaration;
use agentrun_core::message::{Content, ContentPart, Message, Role, ToolCall};
use agentrun_core::provider::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::http;
use crate::schema::{ToolShape, classify};

/// An OpenAI-compatible LLM provider.
///
/// This handles the vast majority of LLM providers since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    params: Map<String, Value>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    ///
    /// `api_key` may be absent for local servers (Ollama, vLLM); no
    /// `Authorization` header is sent in that case.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            params: Map::new(),
            client: http::build_client(http::DEFAULT_TIMEOUT_SECS)?,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", Some(api_key.into()), model)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            None,
            model,
        )
    }

    /// Vendor parameters merged into every request body.
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ApiMessage::text("system", m.content.as_text()),
                Role::User => ApiMessage {
                    role: "user".into(),
                    content: Some(Self::to_api_content(&m.content)),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Role::Assistant => ApiMessage {
                    role: "assistant".into(),
                    content: match m.content.as_text() {
                        text if text.is_empty() && !m.tool_calls.is_empty() => None,
                        text => Some(ApiContent::Text(text)),
                    },
                    tool_calls: if m.tool_calls.is_empty() {
                        None
                    } else {
                        Some(
                            m.tool_calls
                                .iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: "function".into(),
                                    function: ApiFunction {
                                        name: tc.name.clone(),
                                        arguments: tc.arguments.to_string(),
                                    },
                                })
                                .collect(),
                        )
                    },
                    tool_call_id: None,
                },
                Role::Tool => ApiMessage {
                    role: "tool".into(),
                    content: Some(ApiContent::Text(m.content.as_text())),
                    tool_calls: None,
                    tool_call_id: m.tool_call_id.clone(),
                },
            })
            .collect()
    }

    fn to_api_content(content: &Content) -> ApiContent {
        match content {
            Content::Text(text) => ApiContent::Text(text.clone()),
            Content::Parts(parts) => ApiContent::Parts(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => ApiPart::Text { text: text.clone() },
                        ContentPart::Image { media_type, data } => ApiPart::ImageUrl {
                            image_url: ApiImageUrl {
                                url: format!("data:{media_type};base64,{data}"),
                            },
                        },
                        ContentPart::ImageUrl { url } => ApiPart::ImageUrl {
                            image_url: ApiImageUrl { url: url.clone() },
                        },
                    })
                    .collect(),
            ),
        }
    }

    /// Convert tool declarations to OpenAI API format.
    ///
    /// Declarations already in the `{"type": "function"}` shape pass through.
    fn to_api_tools(tools: &[ToolDeclaration]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| match classify(t.as_value()) {
                ToolShape::OpenAiFunction(_) => t.as_value().clone(),
                other => {
                    let sig = other.into_signature();
                    json!({
                        "type": "function",
                        "function": {
                            "name": sig.name,
                            "description": sig.description,
                            "parameters": sig.schema,
                        }
                    })
                }
            })
            .collect()
    }

    fn to_api_tool_choice(choice: &ToolChoice) -> Value {
        match choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::Required => json!("required"),
            ToolChoice::None => json!("none"),
            ToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
        }
    }

    fn build_body(&self, messages: &[Message], options: &InvokeOptions) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": Self::to_api_messages(messages),
        });

        if !options.tools.is_empty() {
            body["tools"] = json!(Self::to_api_tools(&options.tools));
            body["tool_choice"] = Self::to_api_tool_choice(&options.tool_choice);
        }

        http::merge_params(&mut body, &self.params);
        body
    }

    fn to_provider_response(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, parse_arguments(&tc.function.arguments)))
            .collect();

        let content = match choice.message.content {
            Some(Value::String(text)) => text,
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| match part.get("type").and_then(|t| t.as_str()) {
                    Some("text") => part.get("text").and_then(|t| t.as_str()),
                    Some(other) => {
                        warn!(part_type = other, "Non-text output part not supported, skipping");
                        None
                    }
                    None => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        };

        let usage = api_response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(ProviderResponse {
            message: Message::assistant_with_calls(content, tool_calls),
            usage,
        })
    }
}

/// Decode the JSON-encoded argument string of a tool call.
///
/// Empty strings become `{}`; text that is not JSON is kept under `_raw`.
fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| json!({ "_raw": arguments }))
}

#[async_trait]
impl agentrun_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(messages, options);

        debug!(
            provider = %self.name,
            model = %self.model,
            messages = messages.len(),
            tools = options.tools.len(),
            "Sending completion request"
        );

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let api_response: ApiResponse = http::send_json(&self.name, request).await?;
        Self::to_provider_response(api_response)
    }
}

// --- API types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, text: String) -> Self {
        Self {
            role: role.into(),
            content: Some(ApiContent::Text(text)),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_core::Provider;

    fn provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::openai("sk-test", "gpt-4o").unwrap()
    }

    #[test]
    fn openai_constructor() {
        let provider = provider();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4o");
        assert!(provider.base_url.contains("api.openai.com"));
    }

    #[test]
    fn ollama_constructor_has_no_key() {
        let provider = OpenAiCompatProvider::ollama(None, "llama3").unwrap();
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api = serde_json::to_value(OpenAiCompatProvider::to_api_messages(&messages)).unwrap();
        assert_eq!(api[0], json!({"role": "system", "content": "You are helpful"}));
        assert_eq!(api[1], json!({"role": "user", "content": "Hello"}));
    }

    #[test]
    fn image_parts_become_data_urls() {
        let msg = Message::user(Content::Parts(vec![
            ContentPart::text("What is this?"),
            ContentPart::Image {
                media_type: "image/png".into(),
                data: "iVBOR".into(),
            },
        ]));
        let api = serde_json::to_value(OpenAiCompatProvider::to_api_messages(&[msg])).unwrap();
        let parts = api[0]["content"].as_array().unwrap();
        assert_eq!(parts[0], json!({"type": "text", "text": "What is this?"}));
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,iVBOR");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let call = ToolCall::new("call_1", "shell", json!({"command": "ls"}));
        let msg = Message::assistant_with_calls("", vec![call.clone()]);
        let result = Message::tool_result(&call, &json!({"files": 2}));
        let api = serde_json::to_value(OpenAiCompatProvider::to_api_messages(&[msg, result])).unwrap();

        assert!(api[0].get("content").is_none());
        let tc = &api[0]["tool_calls"][0];
        assert_eq!(tc["type"], "function");
        assert_eq!(tc["function"]["name"], "shell");
        let args: Value = serde_json::from_str(tc["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args, json!({"command": "ls"}));

        assert_eq!(api[1]["role"], "tool");
        assert_eq!(api[1]["tool_call_id"], "call_1");
        assert_eq!(api[1]["content"], r#"{"files":2}"#);
    }

    #[test]
    fn tools_pass_through_or_convert() {
        let native = ToolDeclaration(json!({
            "type": "function",
            "function": {"name": "native", "description": "", "parameters": {"type": "object"}}
        }));
        let anthropic_shape = ToolDeclaration(json!({
            "name": "search", "description": "Search", "input_schema": {"type": "object"}
        }));
        let api = OpenAiCompatProvider::to_api_tools(&[native.clone(), anthropic_shape]);
        assert_eq!(api[0], native.0);
        assert_eq!(api[1]["function"]["name"], "search");
        assert_eq!(api[1]["function"]["parameters"], json!({"type": "object"}));
    }

    #[test]
    fn tool_choice_mapping() {
        assert_eq!(OpenAiCompatProvider::to_api_tool_choice(&ToolChoice::Required), json!("required"));
        assert_eq!(
            OpenAiCompatProvider::to_api_tool_choice(&ToolChoice::Tool("finish_agent_run".into())),
            json!({"type": "function", "function": {"name": "finish_agent_run"}})
        );
    }

    #[test]
    fn body_omits_tools_when_none_offered() {
        let p = provider().with_params(json!({"temperature": 0.1}).as_object().unwrap().clone());
        let body = p.build_body(&[Message::user("hi")], &InvokeOptions::default());
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["temperature"], 0.1);
    }

    #[test]
    fn body_includes_tool_choice() {
        let options = InvokeOptions {
            tools: vec![ToolDeclaration::new("a", "A", json!({"type": "object"}))],
            tool_choice: ToolChoice::Auto,
        };
        let body = provider().build_body(&[Message::user("hi")], &options);
        assert_eq!(body["tools"].as_array().unwrap().len(), 1);
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn parse_response_with_tool_calls() {
        let data = r#"{
            "choices": [{"message": {"role": "assistant", "content": null, "tool_calls": [
                {"id": "call_a", "type": "function", "function": {"name": "search", "arguments": "{\"q\":\"rust\"}"}},
                {"id": "call_b", "type": "function", "function": {"name": "broken", "arguments": "not json"}}
            ]}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let resp = OpenAiCompatProvider::to_provider_response(parsed).unwrap();
        assert_eq!(resp.usage, Usage::new(12, 7));
        assert_eq!(resp.message.role, Role::Assistant);
        assert_eq!(resp.message.tool_calls[0].arguments, json!({"q": "rust"}));
        assert_eq!(resp.message.tool_calls[1].arguments, json!({"_raw": "not json"}));
    }

    #[test]
    fn parse_response_text_parts() {
        let data = r#"{"choices": [{"message": {"content": [
            {"type": "text", "text": "one"}, {"type": "image_url", "image_url": {"url": "x"}}, {"type": "text", "text": "two"}
        ]}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        let resp = OpenAiCompatProvider::to_provider_response(parsed).unwrap();
        assert_eq!(resp.message.text(), "one\ntwo");
        assert_eq!(resp.usage, Usage::default());
    }

    #[test]
    fn empty_choices_is_an_error() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(OpenAiCompatProvider::to_provider_response(parsed).is_err());
    }

    #[test]
    fn empty_arguments_become_object() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("{\"a\":1}"), json!({"a": 1}));
    }
}
