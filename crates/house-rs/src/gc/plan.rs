//! GC plan types: spans of turns and the actions proposed for them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open range of turns `[start, end)`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnSpan {
    pub start: u64,
    pub end: u64,
}

impl TurnSpan {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Span covering exactly one turn.
    pub fn single(turn: u64) -> Self {
        Self {
            start: turn,
            end: turn + 1,
        }
    }

    pub fn contains(&self, turn: u64) -> bool {
        self.start <= turn && turn < self.end
    }

    pub fn overlaps(&self, other: &TurnSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Number of turns in the span.
    pub fn width(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

impl fmt::Display for TurnSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Why a span may be compacted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PruneReason {
    /// An earlier Read of a path that was read, written or edited again later.
    SupersededRead,
    /// A TodoWrite snapshot fully replaced by a later one.
    CompletedTodo,
    /// A failed call followed by a successful equivalent retry.
    ResolvedError,
    /// Anything else a classifier judged safe to compact.
    Redundant,
}

impl PruneReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PruneReason::SupersededRead => "superseded_read",
            PruneReason::CompletedTodo => "completed_todo",
            PruneReason::ResolvedError => "resolved_error",
            PruneReason::Redundant => "redundant",
        }
    }

    /// Parse the snake_case name used in classifier output.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "superseded_read" => Some(PruneReason::SupersededRead),
            "completed_todo" => Some(PruneReason::CompletedTodo),
            "resolved_error" => Some(PruneReason::ResolvedError),
            "redundant" => Some(PruneReason::Redundant),
            _ => None,
        }
    }
}

impl fmt::Display for PruneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replace every message in `span` with one placeholder carrying `summary`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneAction {
    pub span: TurnSpan,
    pub summary: String,
    pub reason: PruneReason,
}

impl PruneAction {
    pub fn new(span: TurnSpan, reason: PruneReason, summary: impl Into<String>) -> Self {
        Self {
            span,
            summary: summary.into(),
            reason,
        }
    }
}

/// A set of non-overlapping prune actions, ordered by span start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcPlan {
    pub actions: Vec<PruneAction>,
}

impl GcPlan {
    pub fn new(actions: Vec<PruneAction>) -> Self {
        Self { actions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_overlap_is_half_open() {
        let a = TurnSpan::new(3, 5);
        assert!(a.contains(3));
        assert!(!a.contains(5));
        assert!(!a.overlaps(&TurnSpan::new(5, 7)));
        assert!(a.overlaps(&TurnSpan::new(4, 9)));
        assert!(TurnSpan::new(4, 4).is_empty());
        assert_eq!(a.width(), 2);
    }

    #[test]
    fn reasons_use_snake_case_names() {
        assert_eq!(PruneReason::SupersededRead.to_string(), "superseded_read");
        assert_eq!(
            serde_json::to_value(PruneReason::ResolvedError).unwrap(),
            "resolved_error"
        );
        assert_eq!(PruneReason::parse("completed_todo"), Some(PruneReason::CompletedTodo));
        assert_eq!(PruneReason::parse("stale"), None);
    }
}
