//! Tool framework and the coding tool set.
//!
//! - **[`core`]**: the [`Tool`] trait, [`ToolSet`] dispatch, [`ContextEffect`]
//!   and [`Precondition`].
//! - **[`spec`]**: [`ToolSpec`] builder for model-facing descriptions.
//! - **[`files`]**: Read, Write, Edit.
//! - **[`shell`]**: Bash.
//! - **[`search`]**: Grep, Glob.
//! - **[`todo`]**: TodoWrite.
//! - **[`names`]**: tool name constants.

pub mod core;
pub mod files;
pub mod names;
pub mod search;
pub mod shell;
pub mod spec;
pub mod todo;

pub use self::core::{
    ContextEffect, DEFAULT_MAX_RESULT_BYTES, Precondition, Tool, ToolFuture, ToolOutput, ToolSet,
    parse_tool_args,
};
pub use files::{EditTool, ReadTool, WriteTool};
pub use search::{GlobTool, GrepTool};
pub use shell::BashTool;
pub use spec::ToolSpec;
pub use todo::TodoWriteTool;
