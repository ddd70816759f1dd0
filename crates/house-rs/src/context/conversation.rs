//! The authoritative in-memory state of one session.
//!
//! [`ConversationContext`] is an append-only log of [`Message`]s plus the
//! side tables the engine maintains while the conversation runs: the file
//! cache, the current todo snapshot, and author-pinned critical state.
//!
//! Every message gets a turn index from a monotonically increasing counter.
//! Indices are never reused and never renumbered. When the compaction manager
//! replaces a span with a placeholder, the placeholder keeps the span's start
//! turn and the turns after it keep theirs, so a gap in the numbering is how
//! a compacted span shows up.

use super::compaction::PLACEHOLDER_PREFIX;
use super::file_cache::FileCache;
use super::todos::TodoItem;
use crate::gc::plan::{PruneReason, TurnSpan};
use crate::{ChatMessage, ToolCall};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

/// Who produced a message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::ToolResult => write!(f, "tool_result"),
        }
    }
}

/// Bookkeeping attached to a tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub tool_name: String,
    pub is_error: bool,
    /// Absolute path the call touched, for file tools.
    pub path: Option<PathBuf>,
}

impl ToolOutcome {
    pub fn success(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            is_error: false,
            path: None,
        }
    }

    pub fn error(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            is_error: true,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Metadata of a placeholder that replaced a compacted span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub original_turn_range: TurnSpan,
    pub summary: String,
    pub reason: PruneReason,
    /// How many messages the span held when it was compacted.
    pub compacted_messages: usize,
}

impl Placeholder {
    /// Text shown to the model in place of the compacted messages.
    pub fn render(&self) -> String {
        let range = self.original_turn_range;
        format!(
            "{PLACEHOLDER_PREFIX} {}-{} ({}, {} messages): {}]",
            range.start,
            range.end.saturating_sub(1),
            self.reason,
            self.compacted_messages,
            self.summary
        )
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub turn_index: u64,
    pub role: Role,
    pub content: String,
    /// Calls requested by an assistant message. Empty for other roles.
    pub tool_calls: Vec<ToolCall>,
    /// For tool results: the id of the call this message answers.
    pub tool_use_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub outcome: Option<ToolOutcome>,
    pub placeholder: Option<Placeholder>,
}

impl Message {
    fn new(turn_index: u64, role: Role, content: String) -> Self {
        Self {
            turn_index,
            role,
            content,
            tool_calls: Vec::new(),
            tool_use_id: None,
            created_at: Utc::now(),
            outcome: None,
            placeholder: None,
        }
    }

    /// Build the placeholder message that stands in for a compacted span.
    pub fn placeholder(placeholder: Placeholder) -> Self {
        let mut msg = Self::new(
            placeholder.original_turn_range.start,
            Role::ToolResult,
            placeholder.render(),
        );
        msg.placeholder = Some(placeholder);
        msg
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder.is_some()
    }

    /// Whether this is a tool result carrying an error payload.
    pub fn is_error(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.is_error)
    }

    /// Turns this message stands for: its own turn, or the whole original
    /// range for a placeholder.
    pub fn covered_span(&self) -> TurnSpan {
        match &self.placeholder {
            Some(p) => p.original_turn_range,
            None => TurnSpan::single(self.turn_index),
        }
    }

    /// Characters this message contributes to the prompt.
    pub fn char_len(&self) -> usize {
        self.content.len()
            + self
                .tool_calls
                .iter()
                .map(|c| c.function.name.len() + c.function.arguments.len())
                .sum::<usize>()
    }

    fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            Role::User => ChatMessage::user(&self.content),
            Role::Assistant if !self.tool_calls.is_empty() => ChatMessage::assistant_tool_calls(
                (!self.content.is_empty()).then(|| self.content.clone()),
                self.tool_calls.clone(),
            ),
            Role::Assistant => ChatMessage::assistant_text(&self.content),
            Role::ToolResult => match &self.tool_use_id {
                Some(id) => ChatMessage::tool_result(id, &self.content),
                // Placeholders have no call to pair with on the wire.
                None => ChatMessage::user(&self.content),
            },
        }
    }
}

/// A pinned piece of state that automatic pruning must never remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalEntry {
    pub value: String,
    /// Turns the entry is anchored to. Messages at these turns are protected.
    pub turns: Vec<u64>,
}

/// Ordered message history plus file cache, todos and critical state.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    messages: Vec<Message>,
    next_turn: u64,
    /// Every call id issued in this session, including compacted ones.
    issued_call_ids: HashSet<String>,
    file_cache: FileCache,
    todos: Vec<TodoItem>,
    critical_state: BTreeMap<String, CriticalEntry>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Log access ──

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Turn index the next appended message will receive.
    pub fn next_turn(&self) -> u64 {
        self.next_turn
    }

    /// The message standing for `turn`: the message itself, or the
    /// placeholder whose compacted range contains it.
    pub fn resolve_turn(&self, turn: u64) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.covered_span().contains(turn))
    }

    /// Total characters across all messages.
    pub fn total_chars(&self) -> usize {
        self.messages.iter().map(Message::char_len).sum()
    }

    pub fn estimate_tokens(&self, chars_per_token: f64) -> usize {
        super::budget::estimate_tokens(self.total_chars(), chars_per_token)
    }

    // ── Appending ──

    fn push(&mut self, mut msg: Message) -> u64 {
        let turn = self.next_turn;
        msg.turn_index = turn;
        self.messages.push(msg);
        self.next_turn += 1;
        turn
    }

    /// Append a user message. Returns its turn.
    pub fn push_user(&mut self, content: impl Into<String>) -> u64 {
        self.push(Message::new(0, Role::User, content.into()))
    }

    /// Append an assistant message and return the calls as recorded.
    ///
    /// Call ids must be unique within the session. Empty ids and ids that
    /// were already issued are replaced with fresh ones, so the returned
    /// calls are the ones tool results have to answer.
    pub fn push_assistant(
        &mut self,
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Vec<ToolCall> {
        let turn = self.next_turn;
        let mut calls = Vec::with_capacity(tool_calls.len());
        for (i, mut call) in tool_calls.into_iter().enumerate() {
            if call.id.is_empty() || self.issued_call_ids.contains(&call.id) {
                let base = if call.id.is_empty() { "call" } else { call.id.as_str() };
                let mut fresh = format!("{base}-t{turn}-{i}");
                while self.issued_call_ids.contains(&fresh) {
                    fresh.push('x');
                }
                call.id = fresh;
            }
            self.issued_call_ids.insert(call.id.clone());
            calls.push(call);
        }
        let mut msg = Message::new(0, Role::Assistant, content.unwrap_or_default());
        msg.tool_calls = calls.clone();
        self.push(msg);
        calls
    }

    /// Append the result of call `call_id`. Returns its turn.
    pub fn push_tool_result(
        &mut self,
        call_id: impl Into<String>,
        content: impl Into<String>,
        outcome: ToolOutcome,
    ) -> u64 {
        let mut msg = Message::new(0, Role::ToolResult, content.into());
        msg.tool_use_id = Some(call_id.into());
        msg.outcome = Some(outcome);
        self.push(msg)
    }

    /// Append an error result for every call that has none, so the history
    /// is well-formed again after an interrupted round. Returns how many
    /// results were added.
    pub fn close_unresolved_calls(&mut self, note: &str) -> usize {
        let pending: Vec<(String, String)> = self
            .unresolved_calls()
            .into_iter()
            .map(|c| (c.id.clone(), c.function.name.clone()))
            .collect();
        for (id, name) in &pending {
            self.push_tool_result(id, format!("Error: {note}"), ToolOutcome::error(name));
        }
        pending.len()
    }

    /// Copy of the context without the in-flight exchange: assistant messages
    /// holding an unresolved call are dropped together with the results
    /// already recorded for their calls. Placeholders, the file cache, todos
    /// and critical state are kept; turn numbering continues where it was.
    pub fn fork_settled(&self) -> ConversationContext {
        let open: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| self.holds_unresolved_call(m))
            .collect();
        let open_ids: HashSet<&str> = open
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
            .collect();
        let messages = self
            .messages
            .iter()
            .filter(|m| !self.holds_unresolved_call(m))
            .filter(|m| m.tool_use_id.as_deref().is_none_or(|id| !open_ids.contains(id)))
            .cloned()
            .collect();
        ConversationContext {
            messages,
            ..self.clone()
        }
    }

    /// Swap in a rewritten log. Only the compaction manager calls this, after
    /// it has verified the new log.
    pub(crate) fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    // ── Pairing ──

    /// Ids of calls that already have a tool result.
    pub fn resolved_call_ids(&self) -> HashSet<&str> {
        self.messages
            .iter()
            .filter_map(|m| m.tool_use_id.as_deref())
            .collect()
    }

    /// Calls that have no tool result yet, in the order they were issued.
    pub fn unresolved_calls(&self) -> Vec<&ToolCall> {
        let resolved = self.resolved_call_ids();
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .filter(|c| !resolved.contains(c.id.as_str()))
            .collect()
    }

    /// Whether the message holds a call that has no result yet.
    pub fn holds_unresolved_call(&self, msg: &Message) -> bool {
        let resolved = self.resolved_call_ids();
        msg.tool_calls
            .iter()
            .any(|c| !resolved.contains(c.id.as_str()))
    }

    /// Check the structural invariants of the log: strictly increasing turns,
    /// unique call ids, and every result answering exactly one earlier call.
    pub fn check_integrity(&self) -> Result<(), String> {
        check_log(&self.messages)
    }

    // ── Side tables ──

    pub fn file_cache(&self) -> &FileCache {
        &self.file_cache
    }

    pub fn file_cache_mut(&mut self) -> &mut FileCache {
        &mut self.file_cache
    }

    pub fn todos(&self) -> &[TodoItem] {
        &self.todos
    }

    pub fn replace_todos(&mut self, todos: Vec<TodoItem>) {
        self.todos = todos;
    }

    pub fn critical_state(&self) -> &BTreeMap<String, CriticalEntry> {
        &self.critical_state
    }

    /// Pin a value. Any message that mentions `key` is protected from GC.
    pub fn pin(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.critical_state.insert(
            key.into(),
            CriticalEntry {
                value: value.into(),
                turns: Vec::new(),
            },
        );
    }

    /// Pin a value and anchor it to `turn`, protecting that message as well.
    pub fn pin_at(&mut self, key: impl Into<String>, value: impl Into<String>, turn: u64) {
        let entry = self
            .critical_state
            .entry(key.into())
            .or_insert_with(|| CriticalEntry {
                value: String::new(),
                turns: Vec::new(),
            });
        entry.value = value.into();
        if !entry.turns.contains(&turn) {
            entry.turns.push(turn);
        }
    }

    pub fn unpin(&mut self, key: &str) -> Option<CriticalEntry> {
        self.critical_state.remove(key)
    }

    /// Name of the first critical key `msg` overlaps, if any.
    pub fn critical_key_for(&self, msg: &Message) -> Option<&str> {
        let span = msg.covered_span();
        self.critical_state
            .iter()
            .find(|(key, entry)| {
                entry.turns.iter().any(|t| span.contains(*t))
                    || msg.content.contains(key.as_str())
                    || msg
                        .tool_calls
                        .iter()
                        .any(|c| c.function.arguments.contains(key.as_str()))
            })
            .map(|(key, _)| key.as_str())
    }

    // ── Rendering ──

    /// Render the history as chat messages, prefixed by the system prompt.
    pub fn to_chat_messages(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if !system_prompt.is_empty() {
            out.push(ChatMessage::system(system_prompt));
        }
        out.extend(self.messages.iter().map(Message::to_chat_message));
        out
    }
}

/// Structural checks shared by [`ConversationContext::check_integrity`] and
/// the compaction manager's pre-swap verification.
pub(crate) fn check_log(messages: &[Message]) -> Result<(), String> {
    let mut last_turn: Option<u64> = None;
    let mut calls: HashMap<&str, u64> = HashMap::new();
    let mut answered: HashSet<&str> = HashSet::new();

    for msg in messages {
        if let Some(prev) = last_turn
            && msg.turn_index <= prev
        {
            return Err(format!(
                "turn {} follows turn {prev}; turns must strictly increase",
                msg.turn_index
            ));
        }
        last_turn = Some(msg.turn_index);

        for call in &msg.tool_calls {
            if calls.insert(call.id.as_str(), msg.turn_index).is_some() {
                return Err(format!("duplicate tool call id '{}'", call.id));
            }
        }

        if let Some(id) = msg.tool_use_id.as_deref() {
            if !calls.contains_key(id) {
                return Err(format!(
                    "tool result at turn {} answers unknown call '{id}'",
                    msg.turn_index
                ));
            }
            if !answered.insert(id) {
                return Err(format!("call '{id}' has more than one result"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatRole;

    fn read_call(id: &str, path: &str) -> ToolCall {
        ToolCall::new(id, "Read", format!(r#"{{"file_path":"{path}"}}"#))
    }

    #[test]
    fn turns_are_monotonic() {
        let mut ctx = ConversationContext::new();
        assert_eq!(ctx.push_user("hi"), 0);
        ctx.push_assistant(None, vec![read_call("c1", "a.rs")]);
        assert_eq!(
            ctx.push_tool_result("c1", "content", ToolOutcome::success("Read")),
            2
        );
        assert_eq!(ctx.next_turn(), 3);
        assert!(ctx.check_integrity().is_ok());
    }

    #[test]
    fn duplicate_call_ids_are_rewritten() {
        let mut ctx = ConversationContext::new();
        let first = ctx.push_assistant(None, vec![read_call("c1", "a.rs")]);
        ctx.push_tool_result(&first[0].id, "x", ToolOutcome::success("Read"));
        let second = ctx.push_assistant(
            None,
            vec![read_call("c1", "b.rs"), read_call("", "c.rs")],
        );
        assert_ne!(second[0].id, "c1");
        assert!(!second[1].id.is_empty());
        assert_ne!(second[0].id, second[1].id);
        assert_eq!(ctx.messages()[2].tool_calls, second);
    }

    #[test]
    fn unresolved_calls_are_tracked_and_closed() {
        let mut ctx = ConversationContext::new();
        ctx.push_user("go");
        ctx.push_assistant(None, vec![read_call("c1", "a"), read_call("c2", "b")]);
        ctx.push_tool_result("c1", "ok", ToolOutcome::success("Read"));

        let pending: Vec<&str> = ctx.unresolved_calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(pending, vec!["c2"]);
        assert!(ctx.holds_unresolved_call(&ctx.messages()[1]));

        assert_eq!(ctx.close_unresolved_calls("interrupted"), 1);
        assert!(ctx.unresolved_calls().is_empty());
        let last = ctx.messages().last().unwrap();
        assert_eq!(last.tool_use_id.as_deref(), Some("c2"));
        assert!(last.is_error());
    }

    #[test]
    fn settled_fork_drops_the_open_exchange() {
        let mut ctx = ConversationContext::new();
        ctx.push_user("look at a.rs and b.rs");
        ctx.push_assistant(None, vec![read_call("c1", "a.rs")]);
        ctx.push_tool_result("c1", "fn a() {}", ToolOutcome::success("Read"));
        ctx.push_assistant(None, vec![read_call("c2", "b.rs"), read_call("c3", "c.rs")]);
        ctx.push_tool_result("c2", "fn b() {}", ToolOutcome::success("Read"));

        let fork = ctx.fork_settled();
        assert_eq!(fork.len(), 3);
        assert!(fork.unresolved_calls().is_empty());
        assert!(fork.check_integrity().is_ok());
        assert_eq!(fork.next_turn(), ctx.next_turn());
        assert_eq!(ctx.len(), 5);
    }

    #[test]
    fn integrity_rejects_orphan_results() {
        let mut ctx = ConversationContext::new();
        ctx.push_tool_result("ghost", "x", ToolOutcome::success("Read"));
        assert!(ctx.check_integrity().unwrap_err().contains("unknown call"));
    }

    #[test]
    fn placeholder_resolves_compacted_turns() {
        let mut ctx = ConversationContext::new();
        for i in 0..6 {
            ctx.push_user(format!("m{i}"));
        }
        let mut messages = ctx.messages().to_vec();
        let placeholder = Message::placeholder(Placeholder {
            original_turn_range: TurnSpan::new(1, 4),
            summary: "three notes".into(),
            reason: PruneReason::Redundant,
            compacted_messages: 3,
        });
        messages.splice(1..4, [placeholder]);
        ctx.replace_messages(messages);

        assert_eq!(ctx.resolve_turn(2).unwrap().turn_index, 1);
        assert!(ctx.resolve_turn(2).unwrap().is_placeholder());
        assert_eq!(ctx.resolve_turn(4).unwrap().content, "m4");
        assert!(ctx.resolve_turn(99).is_none());
        assert!(ctx.check_integrity().is_ok());
    }

    #[test]
    fn chat_rendering_pairs_calls_and_inlines_placeholders() {
        let mut ctx = ConversationContext::new();
        ctx.push_user("read it");
        ctx.push_assistant(Some("Reading.".into()), vec![read_call("c1", "a.rs")]);
        ctx.push_tool_result("c1", "fn main() {}", ToolOutcome::success("Read"));
        let mut messages = ctx.messages().to_vec();
        messages.push(Message::placeholder(Placeholder {
            original_turn_range: TurnSpan::new(3, 5),
            summary: "old read".into(),
            reason: PruneReason::SupersededRead,
            compacted_messages: 2,
        }));
        ctx.replace_messages(messages);

        let chat = ctx.to_chat_messages("sys");
        assert_eq!(chat.len(), 5);
        assert_eq!(chat[0].role, ChatRole::System);
        assert_eq!(chat[2].content.as_deref(), Some("Reading."));
        assert_eq!(chat[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(chat[4].role, ChatRole::User);
        assert!(chat[4].content.as_deref().unwrap().starts_with(PLACEHOLDER_PREFIX));
    }

    #[test]
    fn critical_keys_protect_by_anchor_and_mention() {
        let mut ctx = ConversationContext::new();
        ctx.push_user("the deploy token lives in DEPLOY_TOKEN_PATH");
        ctx.push_user("unrelated");
        ctx.push_user("also unrelated");
        ctx.pin("DEPLOY_TOKEN_PATH", "/etc/deploy/token");
        ctx.pin_at("schema", "v2", 2);

        let msgs = ctx.messages().to_vec();
        assert_eq!(ctx.critical_key_for(&msgs[0]), Some("DEPLOY_TOKEN_PATH"));
        assert_eq!(ctx.critical_key_for(&msgs[1]), None);
        assert_eq!(ctx.critical_key_for(&msgs[2]), Some("schema"));
        assert!(ctx.unpin("schema").is_some());
        assert_eq!(ctx.critical_key_for(&msgs[2]), None);
    }
}
