//! AWS Bedrock provider implementation (Converse API).
//!
//! Requests are signed with SigV4 using static credentials. Tool calls are
//! `toolUse` / `toolResult` content blocks matched by `toolUseId`.

use agentrun_core::error::ProviderError;
use agentrun_core::manifest::ToolDeclaration;
use agentrun_core::message::{ContentPart, Message, Role, ToolCall};
use agentrun_core::provider::*;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::http;
use crate::schema::{ToolShape, classify};
use crate::sigv4::{self, CanonicalRequest, SigningParams};

const SERVICE: &str = "bedrock";

/// Parameters that belong in `inferenceConfig`; everything else goes to
/// `additionalModelRequestFields`.
const INFERENCE_KEYS: &[&str] = &["maxTokens", "temperature", "topP", "stopSequences"];

/// Static AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Bedrock Converse provider.
pub struct BedrockProvider {
    region: String,
    base_url: String,
    host: String,
    credentials: AwsCredentials,
    model: String,
    params: Map<String, Value>,
    client: reqwest::Client,
}

impl BedrockProvider {
    pub fn new(
        region: impl Into<String>,
        credentials: AwsCredentials,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let region = region.into();
        let host = format!("bedrock-runtime.{region}.amazonaws.com");
        Ok(Self {
            base_url: format!("https://{host}"),
            host,
            region,
            credentials,
            model: model.into(),
            params: Map::new(),
            client: http::build_client(http::DEFAULT_TIMEOUT_SECS)?,
        })
    }

    /// Override the runtime endpoint (VPC endpoints, testing).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let without_scheme = base_url.split("://").nth(1).unwrap_or(&base_url);
        self.host = without_scheme.split('/').next().unwrap_or(without_scheme).to_string();
        self.base_url = base_url;
        self
    }

    /// Vendor parameters, split between `inferenceConfig` and
    /// `additionalModelRequestFields`.
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Request path and its canonical (double-encoded) form.
    fn paths(&self) -> (String, String) {
        let once = sigv4::uri_encode(&self.model);
        let twice = sigv4::uri_encode(&once);
        (
            format!("/model/{once}/converse"),
            format!("/model/{twice}/converse"),
        )
    }

    fn to_api_messages(messages: &[Message]) -> (Vec<Value>, Vec<Value>) {
        let mut system: Vec<Value> = Vec::new();
        let mut result: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system.push(json!({"text": msg.text()})),
                Role::User => {
                    let blocks: Vec<Value> = msg
                        .content
                        .to_parts()
                        .iter()
                        .filter_map(Self::to_api_block)
                        .collect();
                    result.push(json!({"role": "user", "content": blocks}));
                }
                Role::Assistant => {
                    let mut blocks: Vec<Value> = Vec::new();
                    let text = msg.text();
                    if !text.is_empty() {
                        blocks.push(json!({"text": text}));
                    }
                    for tc in &msg.tool_calls {
                        blocks.push(json!({
                            "toolUse": {"toolUseId": tc.id, "name": tc.name, "input": tc.arguments}
                        }));
                    }
                    if blocks.is_empty() {
                        // Converse rejects empty content arrays
                        blocks.push(json!({"text": " "}));
                    }
                    result.push(json!({"role": "assistant", "content": blocks}));
                }
                Role::Tool => {
                    let text = msg.text();
                    let content = match serde_json::from_str::<Value>(&text) {
                        Ok(value @ Value::Object(_)) => json!([{"json": value}]),
                        _ => json!([{"text": text}]),
                    };
                    let block = json!({
                        "toolResult": {
                            "toolUseId": msg.tool_call_id.clone().unwrap_or_default(),
                            "content": content,
                        }
                    });
                    let merged = result.last_mut().is_some_and(|last| {
                        let is_results = last["role"] == "user"
                            && last["content"].as_array().is_some_and(|blocks| {
                                blocks.iter().all(|b| b.get("toolResult").is_some())
                            });
                        if is_results {
                            if let Some(blocks) = last["content"].as_array_mut() {
                                blocks.push(block.clone());
                            }
                        }
                        is_results
                    });
                    if !merged {
                        result.push(json!({"role": "user", "content": [block]}));
                    }
                }
            }
        }

        (system, result)
    }

    fn to_api_block(part: &ContentPart) -> Option<Value> {
        match part {
            ContentPart::Text { text } => Some(json!({"text": text})),
            ContentPart::Image { media_type, data } => {
                let format = media_type
                    .strip_prefix("image/")
                    .unwrap_or(media_type)
                    .replace("jpg", "jpeg");
                Some(json!({"image": {"format": format, "source": {"bytes": data}}}))
            }
            ContentPart::ImageUrl { url } => {
                warn!(url = %url, "Bedrock does not accept image URLs, dropping part");
                None
            }
        }
    }

    fn to_api_tool_config(tools: &[ToolDeclaration], choice: &ToolChoice) -> Value {
        let tools: Vec<Value> = tools
            .iter()
            .map(|t| match classify(t.as_value()) {
                ToolShape::BedrockToolSpec(_) => t.as_value().clone(),
                other => {
                    let sig = other.into_signature();
                    json!({
                        "toolSpec": {
                            "name": sig.name,
                            "description": sig.description,
                            "inputSchema": {"json": sig.schema},
                        }
                    })
                }
            })
            .collect();

        let choice = match choice {
            ToolChoice::Auto => json!({"auto": {}}),
            ToolChoice::Required => json!({"any": {}}),
            ToolChoice::None => {
                warn!("Bedrock has no 'none' tool choice, falling back to auto");
                json!({"auto": {}})
            }
            ToolChoice::Tool(name) => json!({"tool": {"name": name}}),
        };

        json!({"tools": tools, "toolChoice": choice})
    }

    fn build_body(&self, messages: &[Message], options: &InvokeOptions) -> Value {
        let (system, messages) = Self::to_api_messages(messages);
        let mut body = json!({ "messages": messages });

        if !system.is_empty() {
            body["system"] = json!(system);
        }

        if !options.tools.is_empty() {
            body["toolConfig"] = Self::to_api_tool_config(&options.tools, &options.tool_choice);
        }

        let (inference, additional): (Map<String, Value>, Map<String, Value>) = self
            .params
            .clone()
            .into_iter()
            .partition(|(k, _)| INFERENCE_KEYS.contains(&k.as_str()));

        if !inference.is_empty() {
            let mut section = Value::Null;
            http::merge_params(&mut section, &inference);
            body["inferenceConfig"] = section;
        }
        if !additional.is_empty() {
            let mut section = Value::Null;
            http::merge_params(&mut section, &additional);
            body["additionalModelRequestFields"] = section;
        }

        body
    }

    fn to_provider_response(resp: ConverseResponse) -> ProviderResponse {
        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();

        for block in resp.output.message.map(|m| m.content).unwrap_or_default() {
            if let Some(text) = block.text {
                text_parts.push(text);
            }
            if let Some(tool_use) = block.tool_use {
                tool_calls.push(ToolCall::new(tool_use.tool_use_id, tool_use.name, tool_use.input));
            }
        }

        let usage = resp
            .usage
            .map(|u| Usage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        ProviderResponse {
            message: Message::assistant_with_calls(text_parts.join("\n"), tool_calls),
            usage,
        }
    }
}

#[async_trait]
impl agentrun_core::Provider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn invoke(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = self.build_body(messages, options);
        let payload = serde_json::to_vec(&body).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to encode Bedrock request: {e}"))
        })?;
        let (path, canonical_uri) = self.paths();

        let params = SigningParams {
            access_key_id: &self.credentials.access_key_id,
            secret_access_key: &self.credentials.secret_access_key,
            session_token: self.credentials.session_token.as_deref(),
            region: &self.region,
            service: SERVICE,
        };
        let signed = sigv4::sign(
            &params,
            &CanonicalRequest {
                method: "POST",
                host: &self.host,
                canonical_uri: &canonical_uri,
                canonical_query: "",
                headers: &[("content-type", "application/json")],
                payload: &payload,
            },
            chrono::Utc::now(),
        );

        debug!(
            provider = "bedrock",
            model = %self.model,
            region = %self.region,
            messages = messages.len(),
            tools = options.tools.len(),
            "Sending converse request"
        );

        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("content-type", "application/json")
            .body(payload);
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let resp: ConverseResponse = http::send_json("bedrock", request).await?;
        Ok(Self::to_provider_response(resp))
    }
}

// --- API types ---

#[derive(Debug, Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
    usage: Option<ConverseUsage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: Option<ConverseMessage>,
}

#[derive(Debug, Deserialize)]
struct ConverseMessage {
    #[serde(default)]
    content: Vec<ConverseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseBlock {
    text: Option<String>,
    tool_use: Option<ConverseToolUse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseToolUse {
    tool_use_id: String,
    name: String,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
