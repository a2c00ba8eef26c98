//! Scripted providers and fixtures for orchestrator integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use agentrun_core::{
    Chunk, InvokeOptions, Manifest, Message, ModelConfig, Provider, ProviderError,
    ProviderResponse, ToolCall, ToolDeclaration, Usage,
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Returns scripted responses in order; the last one repeats when
/// `repeat_last` is set, otherwise running out is an error.
pub struct ScriptedProvider {
    responses: Vec<ProviderResponse>,
    repeat_last: bool,
    calls: Mutex<Vec<(Vec<Message>, InvokeOptions)>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses,
            repeat_last: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(response: ProviderResponse) -> Self {
        Self {
            responses: vec![response],
            repeat_last: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn options(&self, call: usize) -> InvokeOptions {
        self.calls.lock().unwrap()[call].1.clone()
    }

    pub fn messages(&self, call: usize) -> Vec<Message> {
        self.calls.lock().unwrap()[call].0.clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn invoke(
        &self,
        messages: &[Message],
        options: &InvokeOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push((messages.to_vec(), options.clone()));

        let response = if index < self.responses.len() {
            self.responses.get(index)
        } else if self.repeat_last {
            self.responses.last()
        } else {
            None
        };

        response.cloned().ok_or_else(|| {
            ProviderError::InvalidResponse(format!("no scripted response for call #{index}"))
        })
    }
}

pub fn text(content: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(content),
        usage: Usage::new(10, 5),
    }
}

pub fn calls(calls: Vec<ToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls("", calls),
        usage: Usage::new(10, 5),
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

/// A minimal valid manifest with one declared tool.
pub fn manifest() -> Manifest {
    Manifest {
        name: Some("test-agent".into()),
        system: vec![Chunk::new("role", "You are a research assistant.")],
        user: vec![Chunk::new("task", "Research {topic}.")],
        tools: vec![ToolDeclaration::new(
            "search",
            "Search the web",
            json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        )],
        models: vec![ModelConfig::new("openai", "gpt-4o")],
        ..Manifest::default()
    }
}
