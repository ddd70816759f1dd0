//! The agent layer: the turn loop and everything it drives.
//!
//! - **[`orchestrator`]**: [`Orchestrator`], the agentic loop. Sole writer of
//!   the [`ConversationContext`](crate::context::ConversationContext).
//! - **[`config`]**: [`OrchestratorConfig`], [`SpawnerConfig`] and [`Toggle`].
//! - **[`events`]**: [`AgentEvent`], [`EventHandler`] implementations and
//!   [`TurnOutcome`].
//! - **[`sub_agent`]**: the `Task` tool's [`Spawner`] and the built-in
//!   [`SubAgentProfile`]s.

pub mod config;
pub mod events;
pub mod orchestrator;
pub mod sub_agent;

pub use config::{OrchestratorConfig, SpawnerConfig, Toggle};
pub use events::{
    AgentEvent, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    TurnOutcome,
};
pub use orchestrator::Orchestrator;
pub use sub_agent::{SpawnRequest, Spawner, SubAgentProfile, SubAgentReport};
