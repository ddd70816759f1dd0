//! Tool abstraction for the agent loop.
//!
//! The [`Tool`] trait defines the interface every tool implements: a static
//! API definition (name, description, JSON schema) and an async `execute`
//! method. Tools are collected into a [`ToolSet`] which handles dispatch,
//! argument validation, timeouts and result truncation.
//!
//! Tools never see the conversation. A tool that observes or changes state
//! the context tracks (file contents, the todo list) reports it as a
//! [`ContextEffect`], and the orchestrator applies it. A tool that needs the
//! context to be in a certain state before it runs (Edit needs a fresh read)
//! declares it as a [`Precondition`], and the orchestrator checks it.

use crate::ToolDef;
use crate::context::TodoItem;
use crate::error::ToolError;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + 'a>>;

// ── Tool output ────────────────────────────────────────────────────

/// State change a tool reports back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextEffect {
    /// The full content of `path` was read and hashes to `content_hash`.
    FileRead { path: PathBuf, content_hash: String },
    /// `path` was written; its new content hashes to `content_hash`.
    FileWritten { path: PathBuf, content_hash: String },
    /// The todo list was replaced by this snapshot.
    TodosReplaced(Vec<TodoItem>),
}

impl ContextEffect {
    /// Path the effect concerns, for file effects.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ContextEffect::FileRead { path, .. } | ContextEffect::FileWritten { path, .. } => {
                Some(path)
            }
            ContextEffect::TodosReplaced(_) => None,
        }
    }
}

/// Successful tool result: the text for the model plus an optional effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub effect: Option<ContextEffect>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            effect: None,
        }
    }

    pub fn with_effect(mut self, effect: ContextEffect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Context state a tool requires before it may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The file must have been read or written in this session, and its
    /// current content must still match what was observed.
    FreshRead(PathBuf),
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool that the model can invoke via function calling.
///
/// Implementors provide:
/// - A static definition ([`Tool::definition`]) describing the tool's name,
///   description, and JSON Schema parameters.
/// - An async [`Tool::execute`] method that receives the raw JSON arguments
///   string. Failures are returned as [`ToolError`]; the orchestrator renders
///   them as `Error: ...` tool results so the model can self-correct.
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model API.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    ///
    /// Uses a boxed future so that the trait is dyn-compatible.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    /// The tool's name (convenience, delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name.clone()
    }

    /// What the context must satisfy before this call may run.
    fn precondition(&self, _arguments: &str) -> Option<Precondition> {
        None
    }

    /// Time this particular call needs, when it asks for more than the
    /// set's default (Bash's `timeout` argument).
    fn timeout(&self, _arguments: &str) -> Option<Duration> {
        None
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// A collection of tools that can be dispatched by name.
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_max_result_bytes(15_000)
///     .with_coding_tools("/path/to/workdir")
///     .with_default_timeout(Some(Duration::from_secs(60)));
///
/// let read_only = tools.restricted_to(&["Read", "Grep", "Glob"]);
/// ```
#[derive(Clone)]
pub struct ToolSet {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    max_result_bytes: usize,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
    /// Default timeout for tool execution. `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("max_result_bytes", &self.max_result_bytes)
            .finish()
    }
}

impl ToolSet {
    /// Create an empty tool set with argument validation enabled.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: true,
            default_timeout: None,
        }
    }

    /// Set the maximum result size in bytes before truncation.
    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    /// Enable or disable JSON Schema argument validation before execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Set a default timeout for tool execution. Pass `None` to disable.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Arc::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Conditionally register a tool (builder pattern).
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// Register Read, Write, Edit, Bash, Grep, Glob and TodoWrite, all
    /// resolving paths against `workdir`.
    pub fn with_coding_tools(self, workdir: impl Into<PathBuf>) -> Self {
        use crate::tools::files::{EditTool, ReadTool, WriteTool};
        use crate::tools::search::{GlobTool, GrepTool};
        use crate::tools::shell::BashTool;
        use crate::tools::todo::TodoWriteTool;
        let workdir = workdir.into();
        self.with(ReadTool::new(workdir.clone()))
            .with(WriteTool::new(workdir.clone()))
            .with(EditTool::new(workdir.clone()))
            .with(BashTool::new(workdir.clone()))
            .with(GrepTool::new(workdir.clone()))
            .with(GlobTool::new(workdir))
            .with(TodoWriteTool)
    }

    /// A new set holding only the named tools that exist in this one.
    /// Settings (truncation, validation, timeout) are kept.
    pub fn restricted_to(&self, names: &[&str]) -> ToolSet {
        ToolSet {
            tools: self
                .tools
                .iter()
                .filter(|(name, _)| names.contains(&name.as_str()))
                .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
                .collect(),
            ..self.clone()
        }
    }

    /// All tool definitions for the model API, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Precondition of a call, if the tool exists and declares one.
    pub fn precondition(&self, name: &str, arguments: &str) -> Option<Precondition> {
        self.tools.get(name)?.precondition(arguments)
    }

    /// Execute a tool call by name, with validation, timing, timeout and
    /// truncation.
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        if self.validate_args {
            validate_tool_arguments(tool.as_ref(), arguments)?;
        }

        log_tool_call(name, arguments);
        let start = std::time::Instant::now();

        let limit = match (self.default_timeout, tool.timeout(arguments)) {
            (Some(default), Some(wanted)) => Some(default.max(wanted)),
            (default, wanted) => default.or(wanted),
        };
        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, tool.execute(arguments)).await {
                Ok(r) => r,
                Err(_) => {
                    info!(
                        "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                        start.elapsed().as_secs_f64(),
                        limit.as_secs_f64(),
                    );
                    Err(ToolError::TimedOut {
                        tool: name.to_string(),
                        secs: limit.as_secs(),
                    })
                }
            },
            None => tool.execute(arguments).await,
        };

        let elapsed = start.elapsed();
        match &result {
            Ok(output) => {
                debug!(
                    "Tool {name} completed in {:.0}ms ({} bytes)",
                    elapsed.as_secs_f64() * 1000.0,
                    output.content.len()
                );
                trace!(
                    "Tool {name} result preview: {}",
                    crate::preview(&output.content, 300)
                );
            }
            Err(e) => debug!(
                "Tool {name} failed in {:.0}ms: {e}",
                elapsed.as_secs_f64() * 1000.0
            ),
        }

        result.map(|mut output| {
            output.content = truncate_result(output.content, self.max_result_bytes);
            output
        })
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate tool arguments against the tool's declared JSON Schema.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Result<(), ToolError> {
    let invalid = |message: String| ToolError::InvalidArguments {
        tool: tool.name(),
        message,
    };
    let args_value: serde_json::Value = serde_json::from_str(arguments)
        .map_err(|e| invalid(format!("arguments are not valid JSON: {e}")))?;

    let schema = tool.definition().function.parameters;
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        // A broken schema is the tool's problem, not the model's.
        return Ok(());
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(invalid(format!(
            "\n{}\nPlease fix the arguments and try again.",
            errors.join("\n")
        )))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    info!("[tool] {name}({})", crate::preview(arguments, 120));
    debug!("[tool] {name} full args ({} bytes)", arguments.len());
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate a string to at most `max` bytes (on a char boundary),
/// appending a notice if trimmed.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let head = s.get(..end).unwrap_or_default();
    format!("{head}...\n[truncated: {} bytes total]", s.len())
}

/// Parse raw JSON arguments into a typed struct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(
    tool: &str,
    arguments: &str,
) -> Result<T, ToolError> {
    serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: format!("{e}. Please provide valid JSON matching the tool's parameter schema."),
    })
}
