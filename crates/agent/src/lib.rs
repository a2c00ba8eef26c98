//! The manifest execution loop.
//!
//! An execution follows a **Render → Invoke → Act** cycle:
//!
//! 1. **Validate** variables against the manifest declarations
//! 2. **Render** the system and user prompts from chunks and blocks
//! 3. **Invoke** the primary model through its provider adapter
//! 4. **If tool calls**: run them in order, append results, invoke again
//! 5. **If the terminating tool succeeds**: its arguments are the result
//!
//! The loop also stops on cancellation, a callback abort, the message
//! ceiling, or a tool that keeps failing.

pub mod builtin;
pub mod control;
pub mod orchestrator;
pub mod result;
pub mod settings;

#[cfg(test)]
mod test_helpers;

pub use control::{CallbackSignal, CancelHandle, ToolCallback};
pub use orchestrator::Orchestrator;
pub use result::{ExecutionResult, UsageSummary};
pub use settings::ExecutionSettings;
