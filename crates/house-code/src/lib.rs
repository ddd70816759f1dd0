//! Terminal coding agent powered by house-rs.
//!
//! `house-code` wires the house-rs orchestrator, context GC and sub-agents
//! into a command-line assistant.
//!
//! # Library usage
//!
//! ```ignore
//! use house_code::CodeConfig;
//! use house_rs::prelude::*;
//!
//! let config = CodeConfig::default();
//! let tools = config.build_tool_set();
//! let mut orchestrator = Orchestrator::new(&client, &tools, config.build_orchestrator_config());
//! if let Some(spawner) = config.build_spawner_config() {
//!     orchestrator = orchestrator.with_sub_agents(spawner);
//! }
//! ```
//!
//! # Binary
//!
//! ```sh
//! # One-shot mode
//! house-code "Add error handling to src/main.rs"
//!
//! # Interactive mode (default)
//! house-code --workdir /path/to/project
//! ```

pub mod config;
pub mod progress;
pub mod prompt;

pub use config::CodeConfig;
pub use progress::ProgressHandler;
pub use prompt::coding_system_prompt;
