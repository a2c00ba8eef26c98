//! Pricing and execution tracing for agentrun.
//!
//! Provides a shared, time-bounded pricing cache fed by a pricing source,
//! and a fire-and-forget trace emitter for per-turn and per-tool records.

pub mod pricing;
pub mod trace;

pub use pricing::{
    HttpPricingSource, ModelPricing, PricingCache, PricingSource, find_in_catalog, spawn_fetch,
};
pub use trace::{
    HttpTraceSink, ToolStatus, ToolTrace, TraceEmitter, TraceRecord, TraceSink, TurnTrace,
};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("invalid pricing catalog: {0}")]
    InvalidCatalog(String),

    #[error("trace sink error: {0}")]
    Sink(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
