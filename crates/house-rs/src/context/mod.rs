//! Conversation state: the message log, its side tables, and compaction.
//!
//! 1. **[`conversation`]**: [`ConversationContext`], the append-only message
//!    log with monotonically increasing turn indices, plus the todo snapshot
//!    and pinned critical state. Owned by the orchestrator; everything else
//!    borrows it immutably.
//!
//! 2. **[`file_cache`]**: content hashes of every file the session has read or
//!    written. Backs the read-before-edit rule.
//!
//! 3. **[`budget`]**: character-based token estimates that drive the GC size
//!    trigger.
//!
//! 4. **[`compaction`]**: the placeholder manager. Applies a validated
//!    [`GcPlan`](crate::gc::GcPlan) atomically.
//!
//! 5. **[`todos`]**: the todo snapshot model shared by TodoWrite and the GC.

pub mod budget;
pub mod compaction;
pub mod conversation;
pub mod file_cache;
pub mod todos;

// Re-export commonly used items at the module level.
pub use budget::{ContextUsage, DEFAULT_CHARS_PER_TOKEN, DEFAULT_CONTEXT_WINDOW};
pub use compaction::{ApplyReport, PLACEHOLDER_PREFIX};
pub use conversation::{ConversationContext, CriticalEntry, Message, Placeholder, Role, ToolOutcome};
pub use file_cache::{FileCache, FileCacheEntry, content_hash};
pub use todos::{TodoItem, TodoStatus};
