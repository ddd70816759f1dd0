//! The agentic loop.
//!
//! The [`Orchestrator`] appends the user's request to the
//! [`ConversationContext`], sends the history and tool schemas to the model,
//! runs the tool calls it asks for, appends their results, and repeats until
//! the model answers in plain text or the round limit is reached. Before
//! every model call it gives the [`GarbageCollector`] a chance to compact
//! the history.
//!
//! The orchestrator is the only writer of the context. Tools report state
//! changes as [`ContextEffect`]s and declare [`Precondition`]s; both are
//! handled here, which is where Edit's read-before-write rule is enforced.

use crate::agent::config::{OrchestratorConfig, SpawnerConfig};
use crate::agent::events::{AgentEvent, EventHandler, NoopHandler, TurnOutcome};
use crate::agent::sub_agent::{SpawnRequest, Spawner, task_tool_def};
use crate::api::model::ModelClient;
use crate::api::retry::retry_api_call;
use crate::context::{ContextUsage, ConversationContext, ToolOutcome};
use crate::error::{AgentError, ToolError};
use crate::gc::{Classifier, GarbageCollector, GcOutcome};
use crate::tools::core::{ContextEffect, Precondition, ToolOutput, ToolSet};
use crate::tools::names;
use crate::{ChatCompletion, ChatRequest, ToolCall, ToolDef};
use futures::future::join_all;
use std::future::Future;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Note appended for calls left without a result by an interrupted turn.
const INTERRUPTED_NOTE: &str = "interrupted before the tool produced a result";

/// Await `fut` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: Option<&CancellationToken>,
    fut: impl Future<Output = Result<T, AgentError>>,
) -> Result<T, AgentError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(AgentError::Cancelled),
            result = fut => result,
        },
        None => fut.await,
    }
}

/// Drives one session's turns.
///
/// ```ignore
/// let client = OpenRouterClient::new(api_key)?;
/// let tools = ToolSet::new().with_coding_tools(&workdir);
/// let config = OrchestratorConfig::new(DEFAULT_MODEL, system_prompt);
///
/// let mut ctx = ConversationContext::new();
/// let mut orchestrator = Orchestrator::new(&client, &tools, config)
///     .with_event_handler(&LoggingHandler)
///     .with_sub_agents(SpawnerConfig::default());
///
/// let outcome = orchestrator.run_turn(&mut ctx, "Fix the failing test").await?;
/// println!("{}", outcome.text());
/// ```
///
/// `Orchestrator<'a>` borrows the client, tools and event handler; bind them
/// to `let`s that outlive it.
pub struct Orchestrator<'a> {
    client: &'a dyn ModelClient,
    tools: &'a ToolSet,
    config: OrchestratorConfig,
    event_handler: &'a dyn EventHandler,
    collector: Option<GarbageCollector<'a>>,
    sub_agents: Option<SpawnerConfig>,
    /// Nesting depth; the main agent is 0.
    depth: usize,
    cancel: Option<CancellationToken>,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator. When `config.gc` is enabled the collector
    /// uses the deterministic rule classifier; see
    /// [`with_classifier`](Self::with_classifier).
    pub fn new(client: &'a dyn ModelClient, tools: &'a ToolSet, config: OrchestratorConfig) -> Self {
        let collector = config
            .gc
            .active()
            .map(|gc| GarbageCollector::with_rules(gc.clone()));
        Self {
            client,
            tools,
            config,
            event_handler: &NoopHandler,
            collector,
            sub_agents: None,
            depth: 0,
            cancel: None,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Classify with `classifier` instead of the rules. No effect when GC is
    /// disabled in the config.
    pub fn with_classifier(mut self, classifier: impl Classifier + 'a) -> Self {
        self.collector = self
            .config
            .gc
            .active()
            .map(|gc| GarbageCollector::new(gc.clone(), classifier));
        self
    }

    /// Use a fully configured collector, regardless of `config.gc`.
    pub fn with_collector(mut self, collector: GarbageCollector<'a>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Offer the `Task` tool, backed by a [`Spawner`] with `config`.
    pub fn with_sub_agents(mut self, config: SpawnerConfig) -> Self {
        self.sub_agents = Some(config);
        self
    }

    /// Abort the running turn when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Replace the cancellation token between turns. A cancelled token
    /// stays cancelled, so interactive callers install a fresh one per turn.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }

    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn collector(&self) -> Option<&GarbageCollector<'a>> {
        self.collector.as_ref()
    }

    fn spawner(&self) -> Option<Spawner<'a>> {
        let config = self.sub_agents.clone()?;
        let spawner = Spawner::new(self.client, self.tools, config)
            .with_parent_model(self.config.model.clone())
            .at_depth(self.depth)
            .with_event_handler(self.event_handler)
            .with_cancellation(self.cancel.clone());
        spawner.can_spawn().then_some(spawner)
    }

    /// Tool schemas sent to the model: the tool set plus `Task` when this
    /// orchestrator may spawn sub-agents.
    pub fn tool_definitions(&self) -> Vec<ToolDef> {
        let mut defs = self.tools.definitions();
        if let Some(spawner) = self.spawner() {
            defs.push(task_tool_def(&spawner.config().profiles));
        }
        defs
    }

    // ── Turn loop ──

    /// Run one user turn to completion.
    ///
    /// Tool failures never end the turn; they become error results the
    /// model can react to. The turn fails only when model calls keep
    /// failing after retries, or when it is cancelled. Either way the
    /// context keeps everything appended so far and stays well-formed for
    /// the next turn.
    pub async fn run_turn(
        &mut self,
        ctx: &mut ConversationContext,
        input: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let closed = ctx.close_unresolved_calls(INTERRUPTED_NOTE);
        if closed > 0 {
            warn!("Closed {closed} tool call(s) left open by an interrupted turn");
        }
        ctx.push_user(input);

        let tool_defs = self.tool_definitions();
        let max_rounds = self.config.max_rounds;
        let mut outcome = TurnOutcome::default();

        for round in 1..=max_rounds {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(AgentError::Cancelled);
            }
            outcome.rounds_used = round;

            if self.collect_garbage(ctx).await? {
                outcome.gc_passes_applied += 1;
            }

            let usage = ContextUsage::measure(
                ctx,
                self.config.context_window,
                self.gc_chars_per_token(),
            );
            self.event_handler.on_event(&AgentEvent::RoundStarted {
                round,
                max_rounds,
                usage: &usage,
            });

            let completion = self.call_model(ctx, &tool_defs, round).await?;
            let prompt_tokens = completion
                .usage
                .as_ref()
                .and_then(|u| u.prompt_tokens)
                .unwrap_or(0);
            outcome.prompt_tokens += prompt_tokens;
            outcome.completion_tokens += completion.completion_tokens();
            self.event_handler.on_event(&AgentEvent::ModelResponse {
                round,
                tool_calls: completion.tool_calls.len(),
                prompt_tokens,
                completion_tokens: completion.completion_tokens(),
            });

            let text = completion.content.filter(|t| !t.trim().is_empty());
            if let Some(text) = &text {
                self.event_handler.on_event(&AgentEvent::Text(text));
                outcome.text_output.push(text.clone());
            }

            if completion.tool_calls.is_empty() {
                ctx.push_assistant(text, Vec::new());
                self.event_handler.on_event(&AgentEvent::Finished);
                outcome.finished = true;
                return Ok(outcome);
            }

            let calls = ctx.push_assistant(text, completion.tool_calls);
            debug!("Round {round}: dispatching {} tool call(s)", calls.len());
            self.dispatch(ctx, &calls).await?;

            if let Some(collector) = self.collector.as_mut() {
                collector.note_round();
            }
        }

        self.event_handler
            .on_event(&AgentEvent::RoundLimitReached { max_rounds });
        Ok(outcome)
    }

    fn gc_chars_per_token(&self) -> f64 {
        self.collector
            .as_ref()
            .map_or(crate::context::DEFAULT_CHARS_PER_TOKEN, |c| {
                c.config().chars_per_token
            })
    }

    /// Run a GC pass when one is due. Returns whether the context changed.
    /// Only cancellation is an error; failed passes are reported and ignored.
    async fn collect_garbage(&mut self, ctx: &mut ConversationContext) -> Result<bool, AgentError> {
        let Some(collector) = self.collector.as_mut() else {
            return Ok(false);
        };
        let Some(trigger) = collector.trigger(ctx) else {
            return Ok(false);
        };
        debug!("GC triggered: {trigger}");
        let outcome = cancellable(self.cancel.as_ref(), async {
            Ok(collector.run(ctx).await)
        })
        .await?;
        self.event_handler.on_event(&AgentEvent::GcPass {
            trigger,
            outcome: &outcome,
        });
        Ok(matches!(outcome, GcOutcome::Applied { .. }))
    }

    /// Call the model, retrying transient failures and empty responses.
    async fn call_model(
        &self,
        ctx: &ConversationContext,
        tool_defs: &[ToolDef],
        round: u32,
    ) -> Result<ChatCompletion, AgentError> {
        let request = ChatRequest {
            model: Some(self.config.model.clone()),
            messages: ctx.to_chat_messages(&self.config.system_prompt),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tools: (!tool_defs.is_empty()).then(|| tool_defs.to_vec()),
            ..Default::default()
        };

        let max_retries = self.config.empty_response_retries;
        let mut attempt = 0;
        loop {
            let completion = cancellable(
                self.cancel.as_ref(),
                retry_api_call(&self.config.retry, || self.client.complete(&request)),
            )
            .await?;

            let empty = completion.tool_calls.is_empty()
                && completion
                    .content
                    .as_deref()
                    .is_none_or(|t| t.trim().is_empty())
                && completion.completion_tokens() == 0;
            if !empty || attempt >= max_retries {
                return Ok(completion);
            }
            attempt += 1;
            self.event_handler.on_event(&AgentEvent::EmptyResponse {
                round,
                attempt,
                max_retries,
            });
            let delay = self.config.retry.initial_delay * attempt;
            cancellable(self.cancel.as_ref(), async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
    }

    // ── Tool dispatch ──

    /// Run `calls` and append one result per call, in call order.
    async fn dispatch(
        &self,
        ctx: &mut ConversationContext,
        calls: &[ToolCall],
    ) -> Result<(), AgentError> {
        for call in calls {
            self.event_handler.on_event(&AgentEvent::ToolCallStarted {
                name: &call.function.name,
                call_id: &call.id,
                arguments: &call.function.arguments,
            });
        }

        // Sub-agents own their contexts, so a round of nothing but Task
        // calls can run them side by side.
        let all_tasks = calls.len() > 1 && calls.iter().all(|c| c.function.name == names::TASK);
        if all_tasks && let Some(spawner) = self.spawner() {
            let parent: &ConversationContext = ctx;
            let runs = calls.iter().map(|call| run_task(&spawner, parent, call));
            let results = cancellable(self.cancel.as_ref(), async { Ok(join_all(runs).await) }).await?;
            for (call, result) in calls.iter().zip(results) {
                self.record(ctx, call, result, None);
            }
            return Ok(());
        }

        for call in calls {
            let view: &ConversationContext = ctx;
            let (result, path) =
                cancellable(self.cancel.as_ref(), async { Ok(self.execute_call(view, call).await) })
                    .await?;
            self.record(ctx, call, result, path);
        }
        Ok(())
    }

    /// Execute one call. Also returns the path the call's precondition
    /// concerns, so error results still carry it.
    async fn execute_call(
        &self,
        ctx: &ConversationContext,
        call: &ToolCall,
    ) -> (Result<ToolOutput, ToolError>, Option<PathBuf>) {
        let name = call.function.name.as_str();
        let arguments = call.function.arguments.as_str();

        if name == names::TASK {
            let result = match self.spawner() {
                Some(spawner) => run_task(&spawner, ctx, call).await,
                None => Err(ToolError::UnknownTool(name.to_string())),
            };
            return (result, None);
        }

        let path = match self.tools.precondition(name, arguments) {
            Some(Precondition::FreshRead(path)) => Some(path),
            None => None,
        };
        if let Some(path) = &path
            && let Err(e) = ctx.file_cache().verify_fresh(path).await
        {
            info!("Refusing {name} on {}: {e}", path.display());
            return (Err(e), Some(path.clone()));
        }
        (self.tools.execute(name, arguments).await, path)
    }

    /// Apply a call's effect to the context and append its result.
    fn record(
        &self,
        ctx: &mut ConversationContext,
        call: &ToolCall,
        result: Result<ToolOutput, ToolError>,
        precondition_path: Option<PathBuf>,
    ) {
        let name = call.function.name.as_str();
        let result_turn = ctx.next_turn();
        let (content, mut outcome) = match result {
            Ok(output) => {
                let mut outcome = ToolOutcome::success(name);
                match output.effect {
                    Some(
                        ContextEffect::FileRead { path, content_hash }
                        | ContextEffect::FileWritten { path, content_hash },
                    ) => {
                        ctx.file_cache_mut()
                            .record(path.clone(), content_hash, result_turn);
                        outcome = outcome.with_path(path);
                    }
                    Some(ContextEffect::TodosReplaced(items)) => ctx.replace_todos(items),
                    None => {}
                }
                (output.content, outcome)
            }
            Err(e) => (e.to_tool_result(), ToolOutcome::error(name)),
        };
        if outcome.path.is_none()
            && let Some(path) = precondition_path
        {
            outcome = outcome.with_path(path);
        }

        self.event_handler.on_event(&AgentEvent::ToolResult {
            name,
            call_id: &call.id,
            result: &content,
            is_error: outcome.is_error,
        });
        ctx.push_tool_result(call.id.clone(), content, outcome);
    }
}

/// Parse a `Task` call and run the sub-agent it asks for.
async fn run_task(
    spawner: &Spawner<'_>,
    parent: &ConversationContext,
    call: &ToolCall,
) -> Result<ToolOutput, ToolError> {
    let request = SpawnRequest::from_arguments(&call.function.arguments)?;
    let report = spawner.spawn(parent, request).await?;
    Ok(ToolOutput::text(report.to_parent_result()))
}
