//! Placeholder manager: commits an approved [`GcPlan`] to the context.
//!
//! Each action's span is replaced by one placeholder message that keeps the
//! span's start turn. Later turns are not renumbered. Actions are applied
//! from the highest start turn downward on a copy of the log; the copy is
//! verified (shrink, ordering, call/result pairing) and only then swapped
//! into the context. A failed check leaves the context exactly as it was.

use super::budget::estimate_tokens;
use super::conversation::{ConversationContext, Message, Placeholder, check_log};
use crate::error::GcError;
use crate::gc::plan::{GcPlan, PruneAction};
use std::collections::HashSet;
use tracing::debug;

/// Prefix of every placeholder's text. Used by the writer and by anything
/// that needs to recognise compacted content in rendered history.
pub const PLACEHOLDER_PREFIX: &str = "[Compacted turns";

/// Before/after numbers for one applied plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub actions_applied: usize,
    pub messages_before: usize,
    pub messages_after: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

impl ApplyReport {
    pub fn tokens_freed(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }

    pub fn messages_removed(&self) -> usize {
        self.messages_before.saturating_sub(self.messages_after)
    }
}

/// Apply `plan` to `ctx` atomically: either every action is applied or the
/// context is left untouched and an error is returned.
pub fn apply(
    ctx: &mut ConversationContext,
    plan: &GcPlan,
    chars_per_token: f64,
) -> Result<ApplyReport, GcError> {
    let messages_before = ctx.len();
    let tokens_before = ctx.estimate_tokens(chars_per_token);

    if plan.is_empty() {
        return Ok(ApplyReport {
            actions_applied: 0,
            messages_before,
            messages_after: messages_before,
            tokens_before,
            tokens_after: tokens_before,
        });
    }

    let mut actions: Vec<&PruneAction> = plan.actions.iter().collect();
    actions.sort_by(|a, b| b.span.start.cmp(&a.span.start));
    for pair in actions.windows(2) {
        // Descending order: pair[1] starts at or before pair[0].
        if pair[1].span.end > pair[0].span.start {
            return Err(GcError::PlanConflict(format!(
                "spans {} and {} overlap",
                pair[1].span, pair[0].span
            )));
        }
    }

    let orphaned_before = orphaned_calls(ctx.messages());
    let mut messages = ctx.messages().to_vec();

    for action in actions {
        let span = action.span;
        if span.is_empty() {
            return Err(GcError::PlanConflict(format!("span {span} is empty")));
        }
        let lo = messages.partition_point(|m| m.turn_index < span.start);
        let hi = messages.partition_point(|m| m.turn_index < span.end);

        if let Some(prev) = lo.checked_sub(1).map(|i| &messages[i])
            && prev.covered_span().overlaps(&span)
        {
            return Err(GcError::PlanConflict(format!(
                "span {span} reaches into the placeholder at turn {}",
                prev.turn_index
            )));
        }
        if let Some(m) = messages[lo..hi].iter().find(|m| m.is_placeholder()) {
            return Err(GcError::PlanConflict(format!(
                "span {span} contains the placeholder at turn {}; compacted content is never re-compacted",
                m.turn_index
            )));
        }
        let count = hi - lo;
        if count < 2 {
            return Err(GcError::PlanConflict(format!(
                "span {span} covers {count} message(s); at least two are needed to shrink the log"
            )));
        }

        let summary = if action.summary.trim().is_empty() {
            format!("{count} messages compacted")
        } else {
            action.summary.trim().to_string()
        };
        let placeholder = Message::placeholder(Placeholder {
            original_turn_range: span,
            summary,
            reason: action.reason,
            compacted_messages: count,
        });
        debug!(
            "Compacting turns {span} ({count} messages, reason: {})",
            action.reason
        );
        messages.splice(lo..hi, [placeholder]);
    }

    check_log(&messages).map_err(|e| {
        GcError::Classification(format!("plan would break the conversation log: {e}"))
    })?;
    let orphaned_after = orphaned_calls(&messages);
    if let Some(id) = orphaned_after
        .iter()
        .find(|id| !orphaned_before.contains(*id))
    {
        return Err(GcError::Classification(format!(
            "plan separates tool call '{id}' from its result"
        )));
    }
    if messages.len() >= messages_before {
        return Err(GcError::Classification(
            "plan does not shrink the conversation".into(),
        ));
    }

    let actions_applied = plan.len();
    ctx.replace_messages(messages);
    Ok(ApplyReport {
        actions_applied,
        messages_before,
        messages_after: ctx.len(),
        tokens_before,
        tokens_after: estimate_tokens(ctx.total_chars(), chars_per_token),
    })
}

/// Ids of calls in `messages` that have no result in `messages`.
fn orphaned_calls(messages: &[Message]) -> HashSet<String> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter_map(|m| m.tool_use_id.as_deref())
        .collect();
    messages
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .filter(|c| !answered.contains(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;
    use crate::context::DEFAULT_CHARS_PER_TOKEN;
    use crate::context::conversation::ToolOutcome;
    use crate::gc::plan::{PruneReason, TurnSpan};

    /// user(0), then `n` read exchanges: assistant at 1+2k, result at 2+2k.
    fn reads(n: usize) -> ConversationContext {
        let mut ctx = ConversationContext::new();
        ctx.push_user("start");
        for i in 0..n {
            let calls = ctx.push_assistant(
                None,
                vec![ToolCall::new(
                    format!("c{i}"),
                    "Read",
                    r#"{"file_path":"a.py"}"#,
                )],
            );
            ctx.push_tool_result(
                &calls[0].id,
                "x".repeat(400),
                ToolOutcome::success("Read").with_path("/w/a.py"),
            );
        }
        ctx
    }

    fn action(start: u64, end: u64) -> PruneAction {
        PruneAction::new(
            TurnSpan::new(start, end),
            PruneReason::SupersededRead,
            "Read a.py",
        )
    }

    fn apply_plan(ctx: &mut ConversationContext, actions: Vec<PruneAction>) -> Result<ApplyReport, GcError> {
        apply(ctx, &GcPlan::new(actions), DEFAULT_CHARS_PER_TOKEN)
    }

    #[test]
    fn span_becomes_single_placeholder_at_start_turn() {
        let mut ctx = reads(3);
        let report = apply_plan(&mut ctx, vec![action(1, 3)]).unwrap();

        assert_eq!(report.messages_before, 7);
        assert_eq!(report.messages_after, 6);
        assert!(report.tokens_freed() > 0);

        let turns: Vec<u64> = ctx.messages().iter().map(|m| m.turn_index).collect();
        assert_eq!(turns, vec![0, 1, 3, 4, 5, 6]);
        let placeholder = &ctx.messages()[1];
        assert!(placeholder.content.starts_with(PLACEHOLDER_PREFIX));
        assert_eq!(
            placeholder.placeholder.as_ref().unwrap().original_turn_range,
            TurnSpan::new(1, 3)
        );
        assert!(std::ptr::eq(ctx.resolve_turn(2).unwrap(), placeholder));
    }

    #[test]
    fn multiple_actions_apply_from_the_top_down() {
        let mut ctx = reads(3);
        let report = apply_plan(&mut ctx, vec![action(1, 3), action(3, 5)]).unwrap();
        assert_eq!(report.actions_applied, 2);
        let turns: Vec<u64> = ctx.messages().iter().map(|m| m.turn_index).collect();
        assert_eq!(turns, vec![0, 1, 3, 5, 6]);
        assert!(ctx.check_integrity().is_ok());
    }

    #[test]
    fn split_pair_is_rejected_without_mutation() {
        let mut ctx = reads(3);
        let before = ctx.messages().to_vec();

        // Turns 2..4 hold result c0 and call c1 but not their partners.
        let err = apply_plan(&mut ctx, vec![action(2, 4)]).unwrap_err();
        assert!(matches!(err, GcError::Classification(_)));
        assert_eq!(ctx.messages(), &before[..]);
    }

    #[test]
    fn overlapping_spans_are_rejected() {
        let mut ctx = reads(3);
        let err = apply_plan(&mut ctx, vec![action(1, 4), action(3, 5)]).unwrap_err();
        assert!(matches!(err, GcError::PlanConflict(_)));
        assert_eq!(ctx.len(), 7);
    }

    #[test]
    fn placeholders_are_never_recompacted() {
        let mut ctx = reads(3);
        apply_plan(&mut ctx, vec![action(1, 3)]).unwrap();
        let err = apply_plan(&mut ctx, vec![action(1, 5)]).unwrap_err();
        assert!(err.to_string().contains("never re-compacted"));
        let err = apply_plan(&mut ctx, vec![action(2, 5)]).unwrap_err();
        assert!(err.to_string().contains("reaches into the placeholder"));
    }

    #[test]
    fn single_message_span_cannot_shrink() {
        let mut ctx = reads(2);
        let err = apply_plan(&mut ctx, vec![action(0, 1)]).unwrap_err();
        assert!(err.to_string().contains("at least two"));
    }

    #[test]
    fn empty_plan_is_a_no_op() {
        let mut ctx = reads(1);
        let report = apply_plan(&mut ctx, vec![]).unwrap();
        assert_eq!(report.messages_before, report.messages_after);
        assert_eq!(report.actions_applied, 0);
    }
}
