//! Cancellation and per-tool-call callbacks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use agentrun_core::ToolCall;
use async_trait::async_trait;

/// Cooperative cancellation flag, shareable while `execute()` runs.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What a callback wants the orchestrator to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackSignal {
    Continue,
    Abort,
}

/// Observer invoked after every non-terminating tool execution.
#[async_trait]
pub trait ToolCallback: Send + Sync {
    async fn on_tool_call(&self, call: &ToolCall, result: &serde_json::Value) -> CallbackSignal;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let handle = CancelHandle::new();
        let other = handle.clone();
        assert!(!handle.is_cancelled());
        other.cancel();
        assert!(handle.is_cancelled());
    }
}
