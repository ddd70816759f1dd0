//! Error types for the context engine.
//!
//! Errors fall into three families with different propagation rules:
//!
//! - [`ToolError`]: anything the model can react to. Converted into an
//!   error tool result and kept inside the conversation loop.
//! - [`GcError`]: a rejected garbage-collection pass. The pass is aborted,
//!   the context is left untouched, and the session continues.
//! - [`AgentError`]: the only errors that end a turn. Exhausted model-call
//!   retries and user cancellation.

use std::path::PathBuf;
use thiserror::Error;

/// A tool invocation that failed. Rendered into the conversation as
/// `Error: {self}` so the model can self-correct.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("{0}")]
    Execution(String),

    #[error("Command failed ({status}):\n{output}")]
    CommandFailed { status: String, output: String },

    #[error(
        "{path} has not been read in this session or changed since it was last read ({detail}). \
         Use Read on the file before editing it."
    )]
    StaleRead { path: PathBuf, detail: String },

    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool '{tool}' timed out after {secs} seconds")]
    TimedOut { tool: String, secs: u64 },
}

impl ToolError {
    /// Build an [`ToolError::Execution`] from anything displayable.
    pub fn execution(msg: impl std::fmt::Display) -> Self {
        ToolError::Execution(msg.to_string())
    }

    /// Text of the tool result delivered to the model.
    pub fn to_tool_result(&self) -> String {
        format!("Error: {self}")
    }
}

/// A garbage-collection pass that was rejected before touching the context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GcError {
    /// The classifier failed or produced a plan that is malformed or unsafe.
    #[error("classification failed: {0}")]
    Classification(String),

    /// The plan has overlapping or out-of-range spans, or touches an
    /// excluded turn.
    #[error("plan conflict: {0}")]
    PlanConflict(String),
}

/// Errors that terminate [`Orchestrator::run_turn`](crate::agent::orchestrator::Orchestrator::run_turn).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("model call failed after {attempts} attempt(s): {message}")]
    ModelCall { attempts: u32, message: String },

    #[error("turn cancelled by user")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_errors_render_with_prefix() {
        let err = ToolError::UnknownTool("Frobnicate".into());
        assert_eq!(err.to_tool_result(), "Error: Unknown tool 'Frobnicate'");

        let stale = ToolError::StaleRead {
            path: PathBuf::from("/w/b.py"),
            detail: "never read".into(),
        };
        let text = stale.to_tool_result();
        assert!(text.starts_with("Error: /w/b.py has not been read"));
        assert!(text.contains("never read"));
    }

    #[test]
    fn agent_error_mentions_attempts() {
        let err = AgentError::ModelCall {
            attempts: 4,
            message: "OpenRouter API HTTP 503".into(),
        };
        assert!(err.to_string().contains("4 attempt(s)"));
    }
}
