//! LLM-backed classifier.
//!
//! Renders the snapshot as a compact transcript, annotated with the
//! deterministic analysis and the hard exclusions, and asks a cheap model
//! which spans to compact. The reply must be a JSON object, optionally inside
//! a fenced code block:
//!
//! ```json
//! {"actions": [{"start_turn": 3, "end_turn": 4, "reason": "superseded_read",
//!               "summary": "Read src/a.py (re-read at turn 9)"}]}
//! ```
//!
//! `end_turn` is inclusive. The reply is only a proposal; the collector
//! validates it before anything is applied.

use super::classifier::{Classifier, ClassifierFuture, GcSnapshot};
use super::plan::{GcPlan, PruneAction, PruneReason, TurnSpan};
use crate::api::ModelClient;
use crate::context::Role;
use crate::error::GcError;
use crate::{ChatMessage, ChatRequest, DEFAULT_CLASSIFIER_MODEL, preview};
use serde::Deserialize;
use std::fmt::Write as _;
use tracing::debug;

const CLASSIFIER_PROMPT: &str = "\
You maintain the conversation history of a coding agent. Identify spans of \
turns that no longer carry information the agent needs, so they can be \
replaced by a one-line summary.

Prunable categories:
- superseded_read: a file read whose path was read, written or edited again later.
- completed_todo: a TodoWrite list fully replaced by a later TodoWrite.
- resolved_error: a failed tool call followed by a successful retry of the same thing.
- redundant: anything else that is clearly obsolete. Use sparingly.

Hard rules. A plan that breaks any of them is discarded:
- Never include user messages.
- Never include turns at or after the protected boundary.
- Never include already compacted turns.
- Never separate a tool call from its result: a span holds the assistant \
  message and all of its results, or none of them.
- Never include messages that mention a pinned critical key.
- Spans must not overlap and must cover at least two messages.

Reply with JSON only:
{\"actions\": [{\"start_turn\": N, \"end_turn\": M, \"reason\": \"<category>\", \"summary\": \"<one line>\"}]}
end_turn is inclusive. Reply {\"actions\": []} when nothing should be pruned. \
Summaries must keep file paths, commands and error messages verbatim.";

/// Settings for [`ModelClassifier`].
#[derive(Debug, Clone)]
pub struct ModelClassifierConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Characters of each message shown in the transcript.
    pub preview_chars: usize,
}

impl Default for ModelClassifierConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            max_tokens: 2000,
            temperature: 0.0,
            preview_chars: 200,
        }
    }
}

impl ModelClassifierConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Classifier that delegates the decision to a model.
pub struct ModelClassifier<'c> {
    client: &'c dyn ModelClient,
    config: ModelClassifierConfig,
}

impl<'c> ModelClassifier<'c> {
    pub fn new(client: &'c dyn ModelClient, config: ModelClassifierConfig) -> Self {
        Self { client, config }
    }

    /// Build the classification request for `snapshot`.
    pub fn build_request(&self, snapshot: &GcSnapshot<'_>) -> ChatRequest {
        ChatRequest {
            model: Some(self.config.model.clone()),
            messages: vec![
                ChatMessage::system(CLASSIFIER_PROMPT),
                ChatMessage::user(self.render_snapshot(snapshot)),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            ..Default::default()
        }
    }

    fn render_snapshot(&self, snapshot: &GcSnapshot<'_>) -> String {
        let ctx = snapshot.context;
        let ex = &snapshot.exclusions;
        let width = self.config.preview_chars;
        let mut out = String::new();

        let _ = writeln!(out, "Protected boundary: turns >= {} are protected.", ex.protected_from);
        if !ctx.critical_state().is_empty() {
            let keys: Vec<&str> = ctx.critical_state().keys().map(String::as_str).collect();
            let _ = writeln!(out, "Pinned critical keys: {}", keys.join(", "));
        }

        out.push_str("\n=== CONVERSATION ===\n");
        for msg in ctx.messages() {
            let turn = msg.turn_index;
            if let Some(p) = &msg.placeholder {
                let span = p.original_turn_range;
                let _ = writeln!(
                    out,
                    "[{}-{}] compacted (do not touch): {}",
                    span.start,
                    span.end.saturating_sub(1),
                    preview(&p.summary, width)
                );
                continue;
            }
            match msg.role {
                Role::User => {
                    let _ = writeln!(out, "[{turn}] user: {}", preview(&msg.content, width));
                }
                Role::Assistant => {
                    if !msg.content.is_empty() {
                        let _ = writeln!(out, "[{turn}] assistant: {}", preview(&msg.content, width));
                    }
                    for call in &msg.tool_calls {
                        let _ = writeln!(
                            out,
                            "[{turn}] assistant calls {} {}",
                            call.function.name,
                            preview(&call.function.arguments, width)
                        );
                    }
                }
                Role::ToolResult => {
                    let (tool, status) = msg.outcome.as_ref().map_or(("?", "ok"), |o| {
                        (o.tool_name.as_str(), if o.is_error { "error" } else { "ok" })
                    });
                    let _ = writeln!(
                        out,
                        "[{turn}] result of {tool} ({status}): {}",
                        preview(&msg.content, width)
                    );
                }
            }
        }

        let hints: Vec<String> = snapshot
            .analysis
            .eligible_exchanges()
            .map(|(exchange, reason)| {
                format!(
                    "- turns {}-{}: {reason}: {}",
                    exchange.span.start,
                    exchange.span.end.saturating_sub(1),
                    snapshot.analysis.exchange_summary(exchange)
                )
            })
            .collect();
        out.push_str("\n=== ANALYSIS ===\n");
        if hints.is_empty() {
            out.push_str("No exchange matched a prunable category.\n");
        } else {
            out.push_str("Exchanges matching a prunable category:\n");
            out.push_str(&hints.join("\n"));
            out.push('\n');
        }
        out
    }
}

impl Classifier for ModelClassifier<'_> {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn classify<'a>(&'a self, snapshot: &'a GcSnapshot<'a>) -> ClassifierFuture<'a> {
        Box::pin(async move {
            let request = self.build_request(snapshot);
            let completion = self
                .client
                .complete(&request)
                .await
                .map_err(|e| GcError::Classification(format!("classifier call failed: {e}")))?;
            let text = completion.content.unwrap_or_default();
            debug!("Classifier reply: {}", preview(&text, 300));
            parse_plan(&text)
        })
    }
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Deserialize)]
struct RawAction {
    start_turn: u64,
    end_turn: u64,
    reason: String,
    #[serde(default)]
    summary: String,
}

/// Parse a classifier reply into a plan. Any malformed reply is a
/// classification failure.
pub fn parse_plan(text: &str) -> Result<GcPlan, GcError> {
    let body = extract_json(text);
    let raw: RawPlan = serde_json::from_str(body).map_err(|e| {
        GcError::Classification(format!(
            "classifier reply is not a valid plan ({e}): {}",
            preview(text, 200)
        ))
    })?;

    let mut actions = Vec::with_capacity(raw.actions.len());
    for a in raw.actions {
        let reason = PruneReason::parse(&a.reason).ok_or_else(|| {
            GcError::Classification(format!("unknown prune reason '{}'", a.reason))
        })?;
        if a.end_turn < a.start_turn {
            return Err(GcError::Classification(format!(
                "action ends at turn {} before it starts at turn {}",
                a.end_turn, a.start_turn
            )));
        }
        actions.push(PruneAction::new(
            TurnSpan::new(a.start_turn, a.end_turn + 1),
            reason,
            a.summary,
        ));
    }
    Ok(GcPlan::new(actions))
}

/// The JSON object inside a reply: the first fenced block if there is one,
/// otherwise everything from the first `{` to the last `}`.
fn extract_json(text: &str) -> &str {
    let text = text.trim();
    if let Some((_, rest)) = text.split_once("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some((body, _)) = rest.split_once("```") {
            return body.trim();
        }
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => text.get(start..=end).unwrap_or(text),
        _ => text,
    }
}
