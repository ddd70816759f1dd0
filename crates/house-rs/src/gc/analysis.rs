//! Deterministic analysis of a conversation for the GC.
//!
//! The unit of pruning is an [`Exchange`]: one assistant message that
//! requested tool calls, followed directly by the results of all of them.
//! Compacting whole exchanges keeps every call paired with its result.
//!
//! [`Analysis`] decides, per call, whether one of the named categories
//! applies:
//!
//! - `superseded_read`: a successful Read of a path that a later successful
//!   Read, Write or Edit touched again.
//! - `completed_todo`: a TodoWrite snapshot fully superseded by a later one.
//! - `resolved_error`: a failed call followed by a successful call of the
//!   same tool with the same intent (path, command, or pattern).
//!
//! [`Exclusions`] carries the hard rules no plan may break, whatever the
//! classifier says.

use crate::context::conversation::{ConversationContext, Message, Role};
use crate::context::todos::{self, TodoItem};
use crate::error::GcError;
use crate::gc::plan::{PruneReason, TurnSpan};
use crate::tools::names;
use std::collections::HashMap;
use std::path::PathBuf;

/// One resolved tool call: the request and its result.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: String,
    pub call_turn: u64,
    pub result_turn: u64,
    pub is_error: bool,
    pub path: Option<PathBuf>,
    /// First line of the result text.
    pub result_head: String,
}

impl CallRecord {
    /// Key identifying what the call was trying to do, used to match a
    /// failed call with its successful retry.
    pub fn intent_key(&self) -> String {
        intent_key(&self.tool_name, &self.arguments)
    }

    fn todo_snapshot(&self) -> Option<Vec<TodoItem>> {
        (self.tool_name == names::TODO_WRITE)
            .then(|| todos::parse_snapshot(&self.arguments))
            .flatten()
    }
}

/// Intent key for a tool call: path for file tools, whitespace-normalized
/// command for Bash, pattern and search root for Grep/Glob, raw arguments
/// otherwise.
pub fn intent_key(tool_name: &str, arguments: &str) -> String {
    let args: serde_json::Value =
        serde_json::from_str(arguments).unwrap_or(serde_json::Value::Null);
    let field = |key: &str| args.get(key).and_then(|v| v.as_str()).unwrap_or("").trim();
    match tool_name {
        names::READ | names::WRITE | names::EDIT => {
            format!("{tool_name}:{}", field("file_path"))
        }
        names::BASH => format!(
            "{tool_name}:{}",
            field("command").split_whitespace().collect::<Vec<_>>().join(" ")
        ),
        names::GREP | names::GLOB => {
            format!("{tool_name}:{}:{}", field("pattern"), field("path"))
        }
        _ => format!("{tool_name}:{args}"),
    }
}

/// An assistant message with tool calls plus all of their results, with
/// nothing else in between.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub span: TurnSpan,
    pub calls: Vec<CallRecord>,
}

/// Why a call may be pruned, and which later turn made it obsolete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub reason: PruneReason,
    pub superseded_at: u64,
}

/// Per-call eligibility and the exchanges of one context snapshot.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub exchanges: Vec<Exchange>,
    /// call id → (call turn, result turn) for every resolved call.
    pairs: HashMap<String, (u64, u64)>,
    eligible: HashMap<String, Eligibility>,
}

impl Analysis {
    pub fn of(ctx: &ConversationContext) -> Self {
        let messages = ctx.messages();
        let mut exchanges = Vec::new();
        let mut records: Vec<CallRecord> = Vec::new();
        let mut pairs = HashMap::new();

        let results: HashMap<&str, &Message> = messages
            .iter()
            .filter_map(|m| m.tool_use_id.as_deref().map(|id| (id, m)))
            .collect();

        for (i, msg) in messages.iter().enumerate() {
            if msg.role != Role::Assistant || msg.tool_calls.is_empty() {
                continue;
            }
            let mut calls = Vec::new();
            for call in &msg.tool_calls {
                let Some(result) = results.get(call.id.as_str()) else {
                    continue;
                };
                pairs.insert(call.id.clone(), (msg.turn_index, result.turn_index));
                let outcome = result.outcome.as_ref();
                calls.push(CallRecord {
                    call_id: call.id.clone(),
                    tool_name: call.function.name.clone(),
                    arguments: call.function.arguments.clone(),
                    call_turn: msg.turn_index,
                    result_turn: result.turn_index,
                    is_error: outcome.is_some_and(|o| o.is_error),
                    path: outcome
                        .and_then(|o| o.path.clone())
                        .or_else(|| path_argument(&call.function.arguments)),
                    result_head: result.content.lines().next().unwrap_or("").to_string(),
                });
            }
            records.extend(calls.iter().cloned());

            // Complete only if every call is answered by the messages that
            // directly follow the assistant message.
            let n = msg.tool_calls.len();
            let follow = messages.get(i + 1..i + 1 + n).unwrap_or(&[]);
            let contiguous = follow.len() == n
                && follow.iter().all(|r| {
                    r.tool_use_id
                        .as_deref()
                        .is_some_and(|id| msg.tool_calls.iter().any(|c| c.id == id))
                });
            if contiguous && calls.len() == n {
                let last = follow.last().map_or(msg.turn_index, |m| m.turn_index);
                exchanges.push(Exchange {
                    span: TurnSpan::new(msg.turn_index, last + 1),
                    calls,
                });
            }
        }

        records.sort_by_key(|r| r.result_turn);
        let eligible = classify_records(&records);

        Self {
            exchanges,
            pairs,
            eligible,
        }
    }

    pub fn eligibility(&self, call_id: &str) -> Option<Eligibility> {
        self.eligible.get(call_id).copied()
    }

    /// Reason the whole exchange may be pruned: every call must be eligible.
    /// Mixed exchanges report the reason of their first call.
    pub fn exchange_reason(&self, exchange: &Exchange) -> Option<PruneReason> {
        let reasons: Option<Vec<PruneReason>> = exchange
            .calls
            .iter()
            .map(|c| self.eligibility(&c.call_id).map(|e| e.reason))
            .collect();
        reasons.and_then(|r| r.first().copied())
    }

    /// One-line description of what the exchange did and why it is stale.
    pub fn exchange_summary(&self, exchange: &Exchange) -> String {
        exchange
            .calls
            .iter()
            .map(|c| describe_call(c, self.eligibility(&c.call_id)))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Exchanges whose calls are all eligible, with their reason.
    pub fn eligible_exchanges(&self) -> impl Iterator<Item = (&Exchange, PruneReason)> {
        self.exchanges
            .iter()
            .filter_map(|ex| self.exchange_reason(ex).map(|r| (ex, r)))
    }

    /// Check that `span` keeps every call/result pair together, covers at
    /// least two messages, and for a named `reason`, that it consists only of
    /// eligible exchanges with at least one call of that category.
    pub fn check_span(
        &self,
        ctx: &ConversationContext,
        span: TurnSpan,
        reason: PruneReason,
    ) -> Result<(), GcError> {
        let covered: Vec<&Message> = ctx
            .messages()
            .iter()
            .filter(|m| span.contains(m.turn_index))
            .collect();
        if covered.len() < 2 {
            return Err(GcError::Classification(format!(
                "span {span} covers {} message(s); at least two are needed",
                covered.len()
            )));
        }

        for msg in &covered {
            for call in &msg.tool_calls {
                match self.pairs.get(&call.id) {
                    Some((_, result)) if span.contains(*result) => {}
                    _ => {
                        return Err(GcError::Classification(format!(
                            "span {span} separates call '{}' at turn {} from its result",
                            call.id, msg.turn_index
                        )));
                    }
                }
            }
            if let Some(id) = msg.tool_use_id.as_deref() {
                match self.pairs.get(id) {
                    Some((call, _)) if span.contains(*call) => {}
                    _ => {
                        return Err(GcError::Classification(format!(
                            "span {span} separates result at turn {} from call '{id}'",
                            msg.turn_index
                        )));
                    }
                }
            }
        }

        if reason == PruneReason::Redundant {
            return Ok(());
        }

        let mut matched = false;
        for msg in &covered {
            if msg.tool_calls.is_empty() && msg.tool_use_id.is_none() {
                return Err(GcError::Classification(format!(
                    "span {span} claims {reason} but turn {} is not part of a tool exchange",
                    msg.turn_index
                )));
            }
            for call in &msg.tool_calls {
                match self.eligibility(&call.id) {
                    Some(e) => matched |= e.reason == reason,
                    None => {
                        return Err(GcError::Classification(format!(
                            "span {span} claims {reason} but call '{}' ({}) at turn {} is still live",
                            call.id, call.function.name, msg.turn_index
                        )));
                    }
                }
            }
        }
        if matched {
            Ok(())
        } else {
            Err(GcError::Classification(format!(
                "span {span} claims {reason} but no call in it is {reason}"
            )))
        }
    }
}

fn path_argument(arguments: &str) -> Option<PathBuf> {
    let args: serde_json::Value = serde_json::from_str(arguments).ok()?;
    args.get("file_path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
}

/// Find, for every record, the first later record that makes it obsolete.
fn classify_records(records: &[CallRecord]) -> HashMap<String, Eligibility> {
    let mut eligible = HashMap::new();
    for (i, rec) in records.iter().enumerate() {
        let later = &records[i + 1..];
        let found = if rec.is_error {
            let key = rec.intent_key();
            later
                .iter()
                .find(|l| !l.is_error && l.tool_name == rec.tool_name && l.intent_key() == key)
                .map(|l| (PruneReason::ResolvedError, l.result_turn))
        } else if rec.tool_name == names::READ {
            rec.path.as_ref().and_then(|path| {
                later
                    .iter()
                    .find(|l| {
                        !l.is_error
                            && matches!(l.tool_name.as_str(), names::READ | names::WRITE | names::EDIT)
                            && l.path.as_ref() == Some(path)
                    })
                    .map(|l| (PruneReason::SupersededRead, l.result_turn))
            })
        } else if let Some(older) = rec.todo_snapshot() {
            later
                .iter()
                .filter(|l| !l.is_error)
                .find(|l| {
                    l.todo_snapshot()
                        .is_some_and(|newer| todos::supersedes(&newer, &older))
                })
                .map(|l| (PruneReason::CompletedTodo, l.result_turn))
        } else {
            None
        };

        if let Some((reason, superseded_at)) = found {
            eligible.insert(
                rec.call_id.clone(),
                Eligibility {
                    reason,
                    superseded_at,
                },
            );
        }
    }
    eligible
}

fn describe_call(call: &CallRecord, eligibility: Option<Eligibility>) -> String {
    let at = eligibility.map_or(String::new(), |e| format!(" at turn {}", e.superseded_at));
    match eligibility.map(|e| e.reason) {
        Some(PruneReason::SupersededRead) => {
            let path = call
                .path
                .as_ref()
                .map_or_else(|| "?".to_string(), |p| p.display().to_string());
            format!("Read {path} (superseded{at})")
        }
        Some(PruneReason::CompletedTodo) => {
            let items = call.todo_snapshot().unwrap_or_default();
            let (done, _, _) = todos::status_counts(&items);
            format!(
                "TodoWrite with {} item(s), {done} completed (replaced{at})",
                items.len()
            )
        }
        Some(PruneReason::ResolvedError) => format!(
            "{} failed: {} (resolved{at})",
            call.tool_name,
            crate::preview(&call.result_head, 120)
        ),
        _ => format!("{} call", call.tool_name),
    }
}

/// Hard exclusions that no plan may violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exclusions {
    /// Messages at or after this turn are within the recency buffer.
    pub protected_from: u64,
    /// Whether user messages are protected.
    pub protect_user_messages: bool,
}

impl Exclusions {
    /// Protect the most recent `recent_turns` turns of `ctx`.
    pub fn for_context(ctx: &ConversationContext, recent_turns: u64, protect_user_messages: bool) -> Self {
        Self {
            protected_from: ctx.next_turn().saturating_sub(recent_turns),
            protect_user_messages,
        }
    }

    /// Reject a span that is out of range or touches an excluded message.
    pub fn check(&self, ctx: &ConversationContext, span: TurnSpan) -> Result<(), GcError> {
        if span.is_empty() {
            return Err(GcError::PlanConflict(format!("span {span} is empty")));
        }
        if span.end > ctx.next_turn() {
            return Err(GcError::PlanConflict(format!(
                "span {span} is out of range (next turn is {})",
                ctx.next_turn()
            )));
        }
        if span.end > self.protected_from {
            return Err(GcError::PlanConflict(format!(
                "span {span} reaches into the protected recent turns (from {})",
                self.protected_from
            )));
        }
        for msg in ctx
            .messages()
            .iter()
            .filter(|m| m.covered_span().overlaps(&span))
        {
            let turn = msg.turn_index;
            if msg.is_placeholder() {
                return Err(GcError::PlanConflict(format!(
                    "span {span} touches turns already compacted at turn {turn}"
                )));
            }
            if ctx.holds_unresolved_call(msg) {
                return Err(GcError::PlanConflict(format!(
                    "span {span} holds an unresolved tool call at turn {turn}"
                )));
            }
            if let Some(key) = ctx.critical_key_for(msg) {
                return Err(GcError::PlanConflict(format!(
                    "span {span} overlaps critical state '{key}' at turn {turn}"
                )));
            }
            if self.protect_user_messages && msg.role == Role::User {
                return Err(GcError::PlanConflict(format!(
                    "span {span} contains the user message at turn {turn}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Builders for hand-made conversations used across GC tests.

    use crate::ToolCall;
    use crate::context::conversation::{ConversationContext, ToolOutcome};
    use crate::tools::names;
    use std::path::Path;

    /// Append one assistant call and its result. Returns the call turn.
    pub(crate) fn exchange(
        ctx: &mut ConversationContext,
        tool: &str,
        arguments: serde_json::Value,
        result: &str,
        is_error: bool,
    ) -> u64 {
        let turn = ctx.next_turn();
        let id = format!("call-{turn}");
        let calls = ctx.push_assistant(None, vec![ToolCall::new(id, tool, arguments.to_string())]);
        let mut outcome = if is_error {
            ToolOutcome::error(tool)
        } else {
            ToolOutcome::success(tool)
        };
        if matches!(tool, names::READ | names::WRITE | names::EDIT)
            && let Some(p) = arguments.get("file_path").and_then(|v| v.as_str())
        {
            outcome = outcome.with_path(Path::new("/w").join(p));
        }
        ctx.push_tool_result(&calls[0].id, result, outcome);
        turn
    }

    pub(crate) fn read(ctx: &mut ConversationContext, path: &str, content: &str) -> u64 {
        exchange(ctx, names::READ, serde_json::json!({ "file_path": path }), content, false)
    }

    pub(crate) fn bash(ctx: &mut ConversationContext, command: &str, result: &str, is_error: bool) -> u64 {
        exchange(ctx, names::BASH, serde_json::json!({ "command": command }), result, is_error)
    }

    pub(crate) fn todo_write(ctx: &mut ConversationContext, todos: serde_json::Value) -> u64 {
        exchange(
            ctx,
            names::TODO_WRITE,
            serde_json::json!({ "todos": todos }),
            "Todos updated",
            false,
        )
    }

    /// Append `n` plain chat turns (user question, assistant answer pairs).
    pub(crate) fn chatter(ctx: &mut ConversationContext, n: usize) {
        for i in 0..n {
            if i % 2 == 0 {
                ctx.push_user(format!("question {i}"));
            } else {
                ctx.push_assistant(Some(format!("answer {i}")), vec![]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn earlier_read_is_superseded_not_the_latest() {
        let mut ctx = ConversationContext::new();
        ctx.push_user("look at a.py");
        let first = read(&mut ctx, "a.py", "X");
        let second = read(&mut ctx, "a.py", "Y");

        let analysis = Analysis::of(&ctx);
        let first_ex = &analysis.exchanges[0];
        assert_eq!(first_ex.span, TurnSpan::new(first, first + 2));
        assert_eq!(
            analysis.exchange_reason(first_ex),
            Some(PruneReason::SupersededRead)
        );
        assert_eq!(analysis.exchanges[1].span.start, second);
        assert_eq!(analysis.exchange_reason(&analysis.exchanges[1]), None);
        assert!(analysis.exchange_summary(first_ex).contains("a.py"));
    }

    #[test]
    fn write_or_edit_supersedes_a_read() {
        let mut ctx = ConversationContext::new();
        read(&mut ctx, "a.py", "X");
        read(&mut ctx, "b.py", "Z");
        exchange(
            &mut ctx,
            names::EDIT,
            json!({"file_path": "a.py", "old_string": "X", "new_string": "Y"}),
            "Successfully edited",
            false,
        );
        let analysis = Analysis::of(&ctx);
        let reasons: Vec<_> = analysis
            .exchanges
            .iter()
            .map(|e| analysis.exchange_reason(e))
            .collect();
        assert_eq!(reasons, vec![Some(PruneReason::SupersededRead), None, None]);
    }

    #[test]
    fn failed_read_does_not_supersede() {
        let mut ctx = ConversationContext::new();
        read(&mut ctx, "a.py", "X");
        exchange(&mut ctx, names::READ, json!({"file_path": "a.py"}), "Error: gone", true);
        let analysis = Analysis::of(&ctx);
        assert_eq!(analysis.exchange_reason(&analysis.exchanges[0]), None);
    }

    #[test]
    fn todo_snapshots_and_resolved_errors() {
        let mut ctx = ConversationContext::new();
        let t1 = todo_write(&mut ctx, json!([{"id": 1, "status": "pending"}]));
        let b1 = bash(&mut ctx, "cargo   test", "Error: 2 failures", true);
        bash(&mut ctx, "cargo test", "ok", false);
        todo_write(&mut ctx, json!([{"id": 1, "status": "done"}]));

        let analysis = Analysis::of(&ctx);
        let by_start: HashMap<u64, Option<PruneReason>> = analysis
            .exchanges
            .iter()
            .map(|e| (e.span.start, analysis.exchange_reason(e)))
            .collect();
        assert_eq!(by_start[&t1], Some(PruneReason::CompletedTodo));
        assert_eq!(by_start[&b1], Some(PruneReason::ResolvedError));
        assert_eq!(analysis.eligible_exchanges().count(), 2);
    }

    #[test]
    fn error_with_different_intent_stays() {
        let mut ctx = ConversationContext::new();
        bash(&mut ctx, "make build", "Error: boom", true);
        bash(&mut ctx, "make test", "ok", false);
        let analysis = Analysis::of(&ctx);
        assert_eq!(analysis.eligible_exchanges().count(), 0);
    }

    #[test]
    fn unanswered_call_is_not_an_exchange() {
        let mut ctx = ConversationContext::new();
        read(&mut ctx, "a.py", "X");
        ctx.push_assistant(
            None,
            vec![crate::ToolCall::new("open", names::READ, r#"{"file_path":"a.py"}"#)],
        );
        let analysis = Analysis::of(&ctx);
        assert_eq!(analysis.exchanges.len(), 1);
        // The dangling read has no result, so it cannot supersede anything.
        assert_eq!(analysis.eligible_exchanges().count(), 0);
    }

    #[test]
    fn check_span_requires_whole_pairs() {
        let mut ctx = ConversationContext::new();
        ctx.push_user("go");
        let r1 = read(&mut ctx, "a.py", "X");
        read(&mut ctx, "a.py", "Y");
        let analysis = Analysis::of(&ctx);

        assert!(
            analysis
                .check_span(&ctx, TurnSpan::new(r1, r1 + 2), PruneReason::SupersededRead)
                .is_ok()
        );
        let err = analysis
            .check_span(&ctx, TurnSpan::new(r1 + 1, r1 + 3), PruneReason::Redundant)
            .unwrap_err();
        assert!(err.to_string().contains("separates"));
        let err = analysis
            .check_span(&ctx, TurnSpan::new(r1, r1 + 2), PruneReason::ResolvedError)
            .unwrap_err();
        assert!(err.to_string().contains("no call in it is resolved_error"));
    }

    #[test]
    fn exclusions_protect_recent_user_and_critical_turns() {
        let mut ctx = ConversationContext::new();
        ctx.push_user("go");
        let r1 = read(&mut ctx, "a.py", "X");
        let r2 = read(&mut ctx, "secrets.env", "API_KEY=1");
        chatter(&mut ctx, 6);
        ctx.pin("secrets.env", "holds the api key");

        let ex = Exclusions::for_context(&ctx, 5, true);
        assert!(ex.check(&ctx, TurnSpan::new(r1, r1 + 2)).is_ok());
        assert!(ex.check(&ctx, TurnSpan::new(0, r1 + 2)).is_err());
        let err = ex.check(&ctx, TurnSpan::new(r2, r2 + 2)).unwrap_err();
        assert!(err.to_string().contains("critical state"));
        let recent = ctx.next_turn() - 2;
        assert!(ex.check(&ctx, TurnSpan::new(recent, recent + 2)).is_err());
        assert!(ex.check(&ctx, TurnSpan::new(r1, 999)).is_err());
    }
}
