//! The record every execution returns.

use agentrun_core::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Token and cost totals for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(rename = "totalCostUSD")]
    pub total_cost_usd: f64,
}

/// Outcome of `Orchestrator::execute`. Always returned, never an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub ok: bool,
    pub usage: UsageSummary,
    /// Terminating call arguments, raw text, or `{status: "cancelled"}`
    pub result: Value,
    /// The full message stack at the end of the run
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub(crate) fn completed(result: Value, usage: UsageSummary, messages: Vec<Message>) -> Self {
        Self {
            ok: true,
            usage,
            result,
            messages,
            error: None,
        }
    }

    pub(crate) fn cancelled(usage: UsageSummary, messages: Vec<Message>) -> Self {
        Self {
            ok: false,
            usage,
            result: json!({ "status": "cancelled" }),
            messages,
            error: None,
        }
    }

    pub(crate) fn failed(error: String, usage: UsageSummary, messages: Vec<Message>) -> Self {
        Self {
            ok: false,
            usage,
            result: Value::Null,
            messages,
            error: Some(error),
        }
    }

    /// Whether the run ended by cancellation or callback abort.
    pub fn is_cancelled(&self) -> bool {
        !self.ok && self.result.get("status").and_then(|s| s.as_str()) == Some("cancelled")
    }
}
