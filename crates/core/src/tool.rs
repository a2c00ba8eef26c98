//! Tool router: caller-supplied tool handlers.
//!
//! The orchestrator resolves its built-in tools first and then looks up
//! everything else here. Handler results are opaque JSON except for the
//! fields interpreted by [`ToolOutcome`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ToolError;

/// An executable tool handler.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
{
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        (self.f)(arguments).await
    }
}

/// Mapping from tool name to handler.
#[derive(Clone, Default)]
pub struct ToolRouter {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Replaces any existing handler with the same name.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Register an async closure as a handler.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
    {
        self.register(name, Arc::new(FnHandler { f }));
    }

    /// Builder-style registration.
    pub fn with_fn<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
    {
        self.register_fn(name, f);
        self
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("ToolRouter").field("tools", &names).finish()
    }
}

/// The fields of a tool result the orchestrator understands.
pub struct ToolOutcome<'a>(pub &'a serde_json::Value);

impl ToolOutcome<'_> {
    /// `completed: false` or `error: true` marks a rejected result.
    pub fn is_rejected(&self) -> bool {
        self.0.get("completed").and_then(|v| v.as_bool()) == Some(false)
            || self.0.get("error").and_then(|v| v.as_bool()) == Some(true)
    }

    /// Tool the result asks to force on the following turn.
    pub fn force_next_tool(&self) -> Option<&str> {
        self.0
            .get("forceNextTool")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}
