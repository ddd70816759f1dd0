//! Token estimation for the conversation history.
//!
//! Estimates are character based: cheap, deterministic, and good enough to
//! decide when the garbage collector should run. The same estimate is used
//! for the GC size trigger and for before/after reporting in
//! [`ApplyReport`](super::compaction::ApplyReport).

use super::conversation::ConversationContext;

/// Characters per token used for all estimates.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Default context window size in tokens.
pub const DEFAULT_CONTEXT_WINDOW: usize = 200_000;

/// Convert a character count into an estimated token count.
pub fn estimate_tokens(chars: usize, chars_per_token: f64) -> usize {
    if chars_per_token <= 0.0 {
        return chars;
    }
    (chars as f64 / chars_per_token) as usize
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextUsage {
    /// Estimated tokens consumed by the message history.
    pub estimated_tokens: usize,
    /// Maximum context window.
    pub max_tokens: usize,
    /// Usage as a fraction (0.0 to 1.0+).
    pub usage_pct: f64,
    /// Number of messages in the history.
    pub messages: usize,
}

impl ContextUsage {
    /// Measure `ctx` against a context window of `max_tokens`.
    pub fn measure(ctx: &ConversationContext, max_tokens: usize, chars_per_token: f64) -> Self {
        let estimated_tokens = ctx.estimate_tokens(chars_per_token);
        let usage_pct = if max_tokens > 0 {
            estimated_tokens as f64 / max_tokens as f64
        } else {
            1.0
        };
        Self {
            estimated_tokens,
            max_tokens,
            usage_pct,
            messages: ctx.len(),
        }
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {}), {} messages",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.max_tokens,
            self.messages,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_chars_per_token() {
        assert_eq!(estimate_tokens(400, DEFAULT_CHARS_PER_TOKEN), 100);
        assert_eq!(estimate_tokens(3, DEFAULT_CHARS_PER_TOKEN), 0);
    }

    #[test]
    fn usage_accumulates_across_messages() {
        let mut ctx = ConversationContext::new();
        ctx.push_user("a".repeat(4_000));
        ctx.push_assistant(Some("b".repeat(4_000)), vec![]);

        let usage = ContextUsage::measure(&ctx, 10_000, DEFAULT_CHARS_PER_TOKEN);
        assert_eq!(usage.estimated_tokens, 2_000);
        assert_eq!(usage.messages, 2);
        assert!((usage.usage_pct - 0.2).abs() < f64::EPSILON);
        assert!(usage.to_log_string().contains("~2000 tokens"));
    }
}
