//! Terminal progress lines for tool calls, GC passes and sub-agents.
//!
//! Written to stderr so stdout carries only the model's answers.

use std::io::Write as _;

use house_rs::agent::{AgentEvent, EventHandler};
use house_rs::gc::GcOutcome;

const ARG_VALUE_CHARS: usize = 50;
const ARGS_CHARS: usize = 60;
const RESULT_LINE_CHARS: usize = 100;

/// Shorten `s` to at most `max` characters, marking the cut with `...`.
fn shorten(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// `key=value` pairs of a call's JSON arguments, truncated for display.
pub fn format_arguments(arguments: &str) -> String {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str(arguments) else {
        return shorten(arguments, ARGS_CHARS);
    };
    let parts: Vec<String> = map
        .iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{key}={}", shorten(&value, ARG_VALUE_CHARS))
        })
        .collect();
    shorten(&parts.join(", "), ARGS_CHARS)
}

/// The line shown when a call starts, e.g. `* Read(file_path=src/lib.rs)`.
pub fn tool_start_line(name: &str, arguments: &str) -> String {
    format!("* {name}({})", format_arguments(arguments))
}

/// The line shown when a call finishes.
pub fn tool_result_line(result: &str, is_error: bool) -> String {
    let first = result.lines().next().unwrap_or("");
    if is_error {
        format!("  x {}", shorten(first, RESULT_LINE_CHARS))
    } else {
        let lines = result.lines().count();
        format!("  ok ({lines} line{})", if lines == 1 { "" } else { "s" })
    }
}

/// Prints a line per tool call, GC pass and sub-agent to stderr.
pub struct ProgressHandler;

impl ProgressHandler {
    fn print(line: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{line}");
    }
}

impl EventHandler for ProgressHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        match event {
            AgentEvent::ToolCallStarted {
                name, arguments, ..
            } => Self::print(&tool_start_line(name, arguments)),
            AgentEvent::ToolResult {
                result, is_error, ..
            } => Self::print(&tool_result_line(result, *is_error)),
            AgentEvent::GcPass {
                outcome: GcOutcome::Applied { report, .. },
                ..
            } => Self::print(&format!(
                "[context compacted: {} message(s) removed, ~{} tokens freed]",
                report.messages_removed(),
                report.tokens_freed()
            )),
            AgentEvent::SubAgentStarted { profile, .. } => {
                Self::print(&format!("> {profile} sub-agent started"));
            }
            AgentEvent::SubAgentFinished {
                profile,
                rounds_used,
                ..
            } => Self::print(&format!(
                "< {profile} sub-agent finished ({rounds_used} round(s))"
            )),
            AgentEvent::RoundLimitReached { max_rounds } => Self::print(&format!(
                "[stopped after {max_rounds} rounds without a final answer]"
            )),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_shown_as_pairs() {
        assert_eq!(
            format_arguments(r#"{"file_path":"src/lib.rs","limit":20}"#),
            "file_path=src/lib.rs, limit=20"
        );
        assert_eq!(tool_start_line("Glob", r#"{"pattern":"**/*.rs"}"#), "* Glob(pattern=**/*.rs)");
    }

    #[test]
    fn long_values_are_cut() {
        let long = "x".repeat(80);
        let shown = format_arguments(&format!(r#"{{"command":"{long}"}}"#));
        assert!(shown.ends_with("..."));
        assert!(shown.chars().count() <= ARGS_CHARS);
        assert_eq!(format_arguments("not json"), "not json");
    }

    #[test]
    fn result_lines() {
        assert_eq!(tool_result_line("a\nb\nc", false), "  ok (3 lines)");
        assert_eq!(tool_result_line("one", false), "  ok (1 line)");
        assert_eq!(
            tool_result_line("Error: Unknown tool 'X'\nmore", true),
            "  x Error: Unknown tool 'X'"
        );
    }
}
