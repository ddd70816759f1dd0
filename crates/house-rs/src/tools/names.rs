//! Canonical tool names.
//!
//! These are the names the model sees and the names the GC policy keys on,
//! so every reference goes through these constants.

pub const READ: &str = "Read";
pub const WRITE: &str = "Write";
pub const EDIT: &str = "Edit";
pub const BASH: &str = "Bash";
pub const GREP: &str = "Grep";
pub const GLOB: &str = "Glob";
pub const TODO_WRITE: &str = "TodoWrite";
/// Sub-agent delegation. Intercepted by the orchestrator, never dispatched
/// through a [`ToolSet`](super::core::ToolSet).
pub const TASK: &str = "Task";
