//! Fire-and-forget execution traces.
//!
//! Two record kinds: a [`TurnTrace`] per model invocation and a
//! [`ToolTrace`] per built-in tool execution. Delivery runs on a detached
//! task and never affects the execution that produced the record.

use std::sync::Arc;
use std::time::Duration;

use agentrun_core::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::TelemetryError;

/// One model invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnTrace {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    /// Snapshot of the manifest being executed
    pub manifest: serde_json::Value,
    pub variables: serde_json::Value,
    /// Conversation so far, without the two seed messages
    pub messages: Vec<Message>,
    pub response: Message,
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    pub duration_ms: u64,
}

/// Outcome of a traced tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// One built-in tool execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolTrace {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub duration_ms: u64,
    pub status: ToolStatus,
}

/// A record as sent to a sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TraceRecord {
    Turn(TurnTrace),
    Tool(ToolTrace),
}

impl TraceRecord {
    pub fn run_id(&self) -> &str {
        match self {
            TraceRecord::Turn(t) => &t.run_id,
            TraceRecord::Tool(t) => &t.run_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TraceRecord::Turn(_) => "turn",
            TraceRecord::Tool(_) => "tool",
        }
    }
}

/// Destination for trace records.
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn send(&self, record: &TraceRecord) -> Result<(), TelemetryError>;
}

/// POSTs each record as JSON to an HTTP endpoint.
pub struct HttpTraceSink {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpTraceSink {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TelemetryError::Http(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl TraceSink for HttpTraceSink {
    async fn send(&self, record: &TraceRecord) -> Result<(), TelemetryError> {
        let mut request = self.client.post(&self.endpoint).json(record);
        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TelemetryError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Sink(format!(
                "trace endpoint returned {status}"
            )));
        }
        Ok(())
    }
}

/// Dispatches trace records to an optional sink.
#[derive(Clone, Default)]
pub struct TraceEmitter {
    sink: Option<Arc<dyn TraceSink>>,
}

impl TraceEmitter {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// An emitter that drops every record.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Deliver a record on a detached task.
    ///
    /// Returns `None` when tracing is disabled. Delivery failures are logged.
    pub fn emit(&self, record: TraceRecord) -> Option<JoinHandle<()>> {
        let sink = self.sink.clone()?;
        Some(tokio::spawn(async move {
            let kind = record.kind();
            match sink.send(&record).await {
                Ok(()) => debug!(kind, run_id = %record.run_id(), "Trace delivered"),
                Err(e) => warn!(kind, run_id = %record.run_id(), error = %e, "Trace delivery failed"),
            }
        }))
    }

    pub fn emit_turn(&self, trace: TurnTrace) -> Option<JoinHandle<()>> {
        self.emit(TraceRecord::Turn(trace))
    }

    pub fn emit_tool(&self, trace: ToolTrace) -> Option<JoinHandle<()>> {
        self.emit(TraceRecord::Tool(trace))
    }
}

impl std::fmt::Debug for TraceEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceEmitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        records: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl TraceSink for MemorySink {
        async fn send(&self, record: &TraceRecord) -> Result<(), TelemetryError> {
            self.records.lock().unwrap().push(serde_json::to_value(record)?);
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl TraceSink for BrokenSink {
        async fn send(&self, _record: &TraceRecord) -> Result<(), TelemetryError> {
            Err(TelemetryError::Sink("down".into()))
        }
    }

    fn tool_trace() -> ToolTrace {
        ToolTrace {
            run_id: "run-1".into(),
            timestamp: Utc::now(),
            tool_name: "list_scenarios".into(),
            input: json!({}),
            output: json!({"scenarios": []}),
            duration_ms: 2,
            status: ToolStatus::Success,
        }
    }

    #[test]
    fn turn_record_shape() {
        let record = TraceRecord::Turn(TurnTrace {
            run_id: "run-1".into(),
            timestamp: Utc::now(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            manifest: json!({"name": "demo"}),
            variables: json!({"x": 1}),
            messages: vec![],
            response: Message::assistant("ok"),
            input_tokens: 10,
            output_tokens: 4,
            cost_usd: 0.0001,
            duration_ms: 120,
        });
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "turn");
        assert_eq!(value["runId"], "run-1");
        assert_eq!(value["inputTokens"], 10);
        assert_eq!(value["costUSD"], 0.0001);
        assert_eq!(value["response"]["role"], "assistant");
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn tool_record_shape() {
        let value = serde_json::to_value(TraceRecord::Tool(tool_trace())).unwrap();
        assert_eq!(value["kind"], "tool");
        assert_eq!(value["toolName"], "list_scenarios");
        assert_eq!(value["status"], "success");
    }

    #[tokio::test]
    async fn disabled_emitter_is_a_no_op() {
        let emitter = TraceEmitter::disabled();
        assert!(!emitter.is_enabled());
        assert!(emitter.emit_tool(tool_trace()).is_none());
    }

    #[tokio::test]
    async fn emitter_delivers_to_sink() {
        let sink = Arc::new(MemorySink::default());
        let emitter = TraceEmitter::new(sink.clone());
        emitter.emit_tool(tool_trace()).unwrap().await.unwrap();
        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["runId"], "run-1");
    }

    #[tokio::test]
    async fn sink_failure_does_not_panic() {
        let emitter = TraceEmitter::new(Arc::new(BrokenSink));
        emitter.emit_tool(tool_trace()).unwrap().await.unwrap();
    }
}
