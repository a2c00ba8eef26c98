//! Google Gemini provider implementation.
//!
//! Talks to the `generateContent` endpoint of the Generative Language API.
//! System prompts travel as `systemInstruction`, the assistant role is
//! `model`, and tool calls are `functionCall` / `functionResponse` parts
//! matched by function name.

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    params: Map<String, Value>,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            params: Map::new(),
            client: http::build_client(http::DEFAULT_TIMEOUT_SECS)?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Vendor parameters merged into `generationConfig`.
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// Convert messages to `contents` plus an optional system instruction.
    fn to_api_contents(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
        let mut system_parts: Vec<Value> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(json!({"text": msg.text()})),
                Role::User => {
                    let parts: Vec<Value> = msg.content.to_parts().iter().map(Self::to_api_part).collect();
                    contents.push(json!({"role": "user", "parts": parts}));
                }
                Role::Assistant => {
                    let mut parts: Vec<Value> = Vec::new();
                    let text = msg.text();
                    if !text.is_empty() {
                        parts.push(json!({"text": text}));
                    }
                    for tc in &msg.tool_calls {
                        parts.push(json!({"functionCall": {"name": tc.name, "args": tc.arguments}}));
                    }
                    if parts.is_empty() {
                        parts.push(json!({"text": ""}));
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                }
                Role::Tool => {
                    let part = json!({
                        "functionResponse": {
                            "name": msg.name.clone().unwrap_or_default(),
                            "response": Self::function_response(&msg.text()),
                        }
                    });
                    let merged = contents.last_mut().is_some_and(|last| {
                        let is_responses = last["role"] == "user"
                            && last["parts"].as_array().is_some_and(|parts| {
                                parts.iter().all(|p| p.get("functionResponse").is_some())
                            });
                        if is_responses {
                            if let Some(parts) = last["parts"].as_array_mut() {
                                parts.push(part.clone());
                            }
                        }
                        is_responses
                    });
                    if !merged {
                        contents.push(json!({"role": "user", "parts": [part]}));
                    }
                }
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(json!({"parts": system_parts}))
        };

        (system, contents)
    }

    fn to_api_part(part: &ContentPart) -> Value {
        match part {
            ContentPart::Text { text } => json!({"text": text}),
            ContentPart::Image { media_type, data } => {
                json!({"inlineData": {"mimeType": media_type, "data": data}})
            }
            ContentPart::ImageUrl { url } => {
                json!({"fileData": {"mimeType": guess_mime_type(url), "fileUri": url}})
            }
        }
    }

    /// `functionResponse.response` must be an object. JSON objects are sent
    /// as-is; anything else is wrapped under `content`.
    fn function_response(text: &str) -> Value {
        match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => value,
            Ok(other) => json!({"content": other}),
            Err(_) => json!({"content": text}),
        }
    }

    fn to_api_tools(tools: &[ToolDeclaration]) -> Value {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| match classify(t.as_value()) {
                ToolShape::Parameters(_) => t.as_value().clone(),
                other => {
                    let sig = other.into_signature();
                    json!({
                        "name": sig.name,
                        "description": sig.description,
                        "parameters": sig.schema,
                    })
                }
            })
            .collect();
        json!([{"functionDeclarations": declarations}])
    }

    fn to_api_tool_config(choice: &ToolChoice) -> Value {
        let config = match choice {
            ToolChoice::Auto => json!({"mode": "AUTO"}),
            ToolChoice::Required => json!({"mode": "ANY"}),
            ToolChoice::None => json!({"mode": "NONE"}),
            ToolChoice::Tool(name) => json!({"mode": "ANY", "allowedFunctionNames": [name]}),
        };
        json!({"functionCallingConfig": config})
    }

    fn build_body(&self, messages: &[Message], options: &InvokeOptions) -> Value {
        let (system, contents) = Self::to_api_contents(messages);
        let mut body = json!({ "contents": contents });

        if let Some(system) = system {
            body["systemInstruction"] = system;
        }

        if !options.tools.is_empty() {
            body["tools"] = Self::to_api_tools(&options.tools);
            body["toolConfig"] = Self::to_api_tool_config(&options.tool_choice);
        }

        if !self.params.is_empty() {
            let mut generation = Value::Null;
            http::merge_params(&mut generation, &self.params);
            body["generationConfig"] = generation;
        }

        body
    }

    fn to_provider_response(resp: GeminiResponse) -> Result<ProviderResponse, ProviderError> {
        let candidate = resp.candidates.into_iter().next().ok_or_else(|| {
            let reason = resp
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!(" (blocked: {r})"))
                .unwrap_or_default();
            ProviderError::InvalidResponse(format!("No candidates in Gemini response{reason}"))
        })?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                text_parts.push(text);
            }
            if let Some(call) = part.function_call {
                let id = call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                let args = if call.args.is_null() { json!({}) } else { call.args };
                tool_calls.push(ToolCall::new(id, call.name, args));
            }
            if part.inline_data.is_some() {
                warn!("Gemini returned inline binary output, not supported, skipping");
            }
        }

        let usage = resp
            .usage_metadata
            .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        Ok(ProviderResponse {
            message: Message::assistant_with_calls(text_parts.join(""), tool_calls),
            usage,
        })
    }
}

/// Best-effort MIME type from a file extension.
fn guess_mime_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl agentrun_core::Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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

        debug!(
            provider = "gemini",
            model = %self.model,
            messages = messages.len(),
            tools = options.tools.len(),
            "Sending completion request"
        );

        let request = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body);

        let resp: GeminiResponse = http::send_json("gemini", request).await?;
        Self::to_provider_response(resp)
    }
}

// --- API types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    function_call: Option<FunctionCall>,
    inline_data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_core::message::Content;

    fn provider() -> GeminiProvider {
        GeminiProvider::new("g-test", "gemini-2.0-flash").unwrap()
    }

    #[test]
    fn endpoint_includes_model() {
        assert_eq!(
            provider().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn system_becomes_instruction() {
        let (system, contents) =
            GeminiProvider::to_api_contents(&[Message::system("rules"), Message::user("hi")]);
        assert_eq!(system.unwrap(), json!({"parts": [{"text": "rules"}]}));
        assert_eq!(contents, vec![json!({"role": "user", "parts": [{"text": "hi"}]})]);
    }

    #[test]
    fn tool_round_trip_shapes() {
        let a = ToolCall::new("c1", "lookup", json!({"id": 1}));
        let b = ToolCall::new("c2", "status", json!({}));
        let messages = vec![
            Message::user("go"),
            Message::assistant_with_calls("", vec![a.clone(), b.clone()]),
            Message::tool_result(&a, &json!({"found": true})),
            Message::tool_result(&b, &json!("idle")),
        ];
        let (_, contents) = GeminiProvider::to_api_contents(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "lookup");

        let responses = contents[2]["parts"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["functionResponse"]["response"], json!({"found": true}));
        assert_eq!(responses[1]["functionResponse"]["name"], "status");
        assert_eq!(responses[1]["functionResponse"]["response"], json!({"content": "idle"}));
    }

    #[test]
    fn images_become_inline_or_file_data() {
        let msg = Message::user(Content::Parts(vec![
            ContentPart::Image {
                media_type: "image/png".into(),
                data: "AAAA".into(),
            },
            ContentPart::ImageUrl {
                url: "gs://bucket/photo.JPG".into(),
            },
        ]));
        let (_, contents) = GeminiProvider::to_api_contents(&[msg]);
        assert_eq!(contents[0]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(contents[0]["parts"][1]["fileData"]["mimeType"], "image/jpeg");
    }

    #[test]
    fn tool_config_modes() {
        assert_eq!(
            GeminiProvider::to_api_tool_config(&ToolChoice::Required),
            json!({"functionCallingConfig": {"mode": "ANY"}})
        );
        assert_eq!(
            GeminiProvider::to_api_tool_config(&ToolChoice::Tool("finish".into())),
            json!({"functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": ["finish"]}})
        );
    }

    #[test]
    fn params_go_to_generation_config() {
        let params = json!({"temperature": 0.5, "maxOutputTokens": 256});
        let options = InvokeOptions {
            tools: vec![ToolDeclaration::new("a", "A", json!({"type": "object"}))],
            tool_choice: ToolChoice::Auto,
        };
        let body = provider()
            .with_params(params.as_object().unwrap().clone())
            .build_body(&[Message::user("hi")], &options);
        assert_eq!(body["generationConfig"], params);
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "a");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn parse_function_call_response() {
        let data = r#"{
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "Checking."},
                {"functionCall": {"name": "lookup", "args": {"id": 7}}}
            ]}}],
            "usageMetadata": {"promptTokenCount": 40, "candidatesTokenCount": 9, "totalTokenCount": 49}
        }"#;
        let parsed: GeminiResponse = serde_json::from_str(data).unwrap();
        let resp = GeminiProvider::to_provider_response(parsed).unwrap();
        assert_eq!(resp.message.text(), "Checking.");
        let call = &resp.message.tool_calls[0];
        assert_eq!(call.name, "lookup");
        assert_eq!(call.arguments, json!({"id": 7}));
        assert!(call.id.starts_with("call_"));
        assert_eq!(resp.usage, Usage::new(40, 9));
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let data = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let parsed: GeminiResponse = serde_json::from_str(data).unwrap();
        let err = GeminiProvider::to_provider_response(parsed).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(guess_mime_type("https://x/a.webp?sig=1"), "image/webp");
        assert_eq!(guess_mime_type("https://x/noext"), "application/octet-stream");
    }
}
