//! Events, handlers, and turn results for the
//! [`Orchestrator`](super::orchestrator::Orchestrator).
//!
//! The orchestrator reports progress through [`AgentEvent`] variants that
//! cover a turn from round start through tool execution, garbage collection
//! and sub-agent delegation. Callers implement [`EventHandler`] to observe
//! them.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::context::ContextUsage;
use crate::gc::{GcOutcome, GcTrigger};
use crate::preview;
use tracing::{debug, info, trace, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted during a turn.
#[derive(Debug)]
pub enum AgentEvent<'a> {
    /// A model round is starting.
    RoundStarted {
        round: u32,
        max_rounds: u32,
        usage: &'a ContextUsage,
    },
    /// The model answered.
    ModelResponse {
        round: u32,
        tool_calls: usize,
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// Text the model produced, final or alongside tool calls.
    Text(&'a str),
    /// The model returned neither text nor tool calls; it is asked again.
    EmptyResponse {
        round: u32,
        attempt: u32,
        max_retries: u32,
    },
    /// A tool call is about to run.
    ToolCallStarted {
        name: &'a str,
        call_id: &'a str,
        arguments: &'a str,
    },
    /// A tool call finished and its result was appended.
    ToolResult {
        name: &'a str,
        call_id: &'a str,
        result: &'a str,
        is_error: bool,
    },
    /// A garbage collection pass ran.
    GcPass {
        trigger: GcTrigger,
        outcome: &'a GcOutcome,
    },
    /// A sub-agent was spawned.
    SubAgentStarted { profile: &'a str, depth: usize },
    /// A sub-agent returned its report.
    SubAgentFinished {
        profile: &'a str,
        rounds_used: u32,
        finished: bool,
    },
    /// The model answered without tool calls; the turn is over.
    Finished,
    /// The turn hit the round limit without a final answer.
    RoundLimitReached { max_rounds: u32 },
}

/// Handler for agent events.
///
/// The default implementation ignores every event.
///
/// ```ignore
/// struct Printer;
///
/// impl EventHandler for Printer {
///     fn on_event(&self, event: &AgentEvent<'_>) {
///         if let AgentEvent::Text(text) = event {
///             println!("{text}");
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &AgentEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores everything.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let AgentEvent::Text(text) = event {
///         println!("{text}");
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&AgentEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&AgentEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &AgentEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches every event to each inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with(my_printer);
/// ```
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Conditionally add a handler to the chain.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &AgentEvent<'_>) {
        match event {
            AgentEvent::RoundStarted {
                round,
                max_rounds,
                usage,
            } => {
                info!("[round {round}/{max_rounds}] {}", usage.to_log_string());
            }
            AgentEvent::ModelResponse {
                round,
                tool_calls,
                prompt_tokens,
                completion_tokens,
            } => {
                debug!(
                    "Round {round}: {tool_calls} tool call(s), tokens prompt={prompt_tokens} \
                     completion={completion_tokens}"
                );
            }
            AgentEvent::Text(text) => {
                debug!("LLM text: {}", preview(text, 200));
            }
            AgentEvent::EmptyResponse {
                round,
                attempt,
                max_retries,
            } => {
                warn!(
                    "Empty API response at round {round} (no content, no tool calls). \
                     Retrying ({attempt}/{max_retries})..."
                );
            }
            AgentEvent::ToolCallStarted { name, call_id, .. } => {
                debug!("Executing tool: {name} ({call_id})");
            }
            AgentEvent::ToolResult {
                name,
                result,
                is_error,
                ..
            } => {
                if *is_error {
                    debug!("Tool {name} failed: {}", preview(result, 200));
                } else {
                    debug!("Tool {name} result: {} bytes", result.len());
                }
                trace!("Tool {name} output: {result}");
            }
            AgentEvent::GcPass { trigger, outcome } => match outcome {
                GcOutcome::Applied { report, .. } => info!(
                    "GC ({trigger}): removed {} message(s), ~{} tokens freed",
                    report.messages_removed(),
                    report.tokens_freed()
                ),
                GcOutcome::NothingToPrune => debug!("GC ({trigger}): nothing to prune"),
                GcOutcome::Skipped(why) => debug!("GC ({trigger}) skipped: {why}"),
                GcOutcome::Aborted(e) => warn!("GC ({trigger}) aborted: {e}"),
            },
            AgentEvent::SubAgentStarted { profile, depth } => {
                info!("Spawning {profile} sub-agent (depth {depth})");
            }
            AgentEvent::SubAgentFinished {
                profile,
                rounds_used,
                finished,
            } => {
                info!(
                    "{profile} sub-agent done after {rounds_used} round(s){}",
                    if *finished { "" } else { " (round limit)" }
                );
            }
            AgentEvent::Finished => {
                info!("Agent finished (no more tool calls)");
            }
            AgentEvent::RoundLimitReached { max_rounds } => {
                info!("Agent hit round limit ({max_rounds})");
            }
        }
    }
}

// ── Turn result ────────────────────────────────────────────────────

/// The result of one [`Orchestrator::run_turn`](super::orchestrator::Orchestrator::run_turn).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// Text the model produced across all rounds of the turn.
    pub text_output: Vec<String>,
    /// Model rounds used.
    pub rounds_used: u32,
    /// Whether the model finished with a plain answer (vs. the round limit).
    pub finished: bool,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Garbage collection passes that changed the context during the turn.
    pub gc_passes_applied: u32,
}

impl TurnOutcome {
    /// Concatenated text output from all rounds.
    pub fn text(&self) -> String {
        self.text_output.join("\n\n")
    }

    /// The final answer: the last text the model produced.
    pub fn response(&self) -> Option<&str> {
        self.text_output.last().map(String::as_str)
    }

    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn composite_dispatches_to_all_handlers() {
        let count = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&count), Arc::clone(&count));
        let handler = CompositeEventHandler::new()
            .with(FnEventHandler::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            }))
            .with_if(false, NoopHandler)
            .with(FnEventHandler::new(move |_| {
                b.fetch_add(10, Ordering::SeqCst);
            }));
        handler.on_event(&AgentEvent::Finished);
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn outcome_text_joins_rounds() {
        let outcome = TurnOutcome {
            text_output: vec!["Looking.".into(), "Done.".into()],
            prompt_tokens: 10,
            completion_tokens: 5,
            ..Default::default()
        };
        assert_eq!(outcome.text(), "Looking.\n\nDone.");
        assert_eq!(outcome.response(), Some("Done."));
        assert_eq!(outcome.total_tokens(), 15);
    }
}
