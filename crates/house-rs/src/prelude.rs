//! Convenience re-exports for common `house-rs` types.
//!
//! ```ignore
//! use house_rs::prelude::*;
//! ```
//!
//! Covers the client, the orchestrator and its config, event handlers, the
//! conversation context and the tool set. GC internals (plans, analysis,
//! exclusions) stay in [`gc`](crate::gc).

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    ChatCompletion, ChatMessage, ChatRequest, DEFAULT_CLASSIFIER_MODEL, DEFAULT_MODEL,
    OpenRouterClient, ToolCall, ToolDef, json_schema_for,
};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    AgentEvent, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    Orchestrator, OrchestratorConfig, SpawnerConfig, SubAgentProfile, Toggle, TurnOutcome,
};
pub use crate::api::{ModelClient, RetryConfig};
pub use crate::error::{AgentError, ToolError};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{ContextUsage, ConversationContext, TodoItem, TodoStatus};
pub use crate::gc::{GcConfig, ModelClassifier, RuleClassifier};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{Tool, ToolFuture, ToolOutput, ToolSet, ToolSpec, parse_tool_args};
