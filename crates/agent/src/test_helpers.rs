//! Shared test helpers for orchestrator tests.

use agentrun_core::error::ProviderError;
use agentrun_core::message::{Message, ToolCall};
use agentrun_core::provider::{InvokeOptions, Provider, ProviderResponse, Usage};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `invoke` returns the next response in the queue and
/// records the options it was called with.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    calls: Mutex<Vec<InvokeOptions>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn options(&self, call: usize) -> InvokeOptions {
        self.calls.lock().unwrap()[call].clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn invoke(
        &self,
        _messages: &[Message],
        options: &InvokeOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut calls = self.calls.lock().unwrap();
        let responses = self.responses.lock().unwrap();

        if calls.len() >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                calls.len(),
                responses.len()
            );
        }

        let response = responses[calls.len()].clone();
        calls.push(options.clone());
        Ok(response)
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Usage::new(10, 5),
    }
}

/// Create a response carrying tool calls.
#[allow(dead_code)]
pub fn make_tool_call_response(tool_calls: Vec<ToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls("", tool_calls),
        usage: Usage::new(10, 5),
    }
}

/// Helper to create a tool call.
#[allow(dead_code)]
pub fn make_tool_call(name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(format!("call_{name}"), name, args)
}
