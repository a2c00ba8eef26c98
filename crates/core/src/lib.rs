//! # agentrun Core
//!
//! Domain types, traits, and error definitions for the agentrun manifest
//! execution engine. This crate has no I/O; it defines the model that all
//! other crates implement against.
//!
//! ## Contents
//!
//! - [`manifest`]: the declarative agent definition and its validation
//! - [`template`]: block and variable resolution into prompt text
//! - [`provider`]: the vendor-agnostic invocation contract
//! - [`tool`]: caller-supplied tool handlers
//! - [`message`]: the canonical message stack entries

pub mod error;
pub mod manifest;
pub mod message;
pub mod provider;
pub mod template;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ManifestError, ProviderError, Result, ToolError};
pub use manifest::{Chunk, Manifest, ModelConfig, Scenario, ToolDeclaration, VariableDecl, VariableType};
pub use message::{Content, ContentPart, Message, Role, ToolCall};
pub use provider::{InvokeOptions, Provider, ProviderResponse, ToolChoice, Usage};
pub use template::{Bindings, TemplateRenderer};
pub use tool::{ToolHandler, ToolOutcome, ToolRouter};
