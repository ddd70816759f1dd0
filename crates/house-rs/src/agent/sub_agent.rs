//! Sub-agent delegation through the `Task` tool.
//!
//! A sub-agent is a child [`Orchestrator`] with:
//! - its own [`ConversationContext`], either a minimal seed or a settled copy
//!   of the parent history,
//! - a strict subset of the parent's tools, chosen by its
//!   [`SubAgentProfile`],
//! - the parent's model client and event handler.
//!
//! The parent context is only borrowed. Whatever the child does, the parent
//! receives exactly one tool result: `[{type} agent report]\n\n{answer}`.

use crate::agent::config::{OrchestratorConfig, SpawnerConfig};
use crate::agent::events::{AgentEvent, EventHandler, NoopHandler, TurnOutcome};
use crate::agent::orchestrator::Orchestrator;
use crate::api::model::ModelClient;
use crate::context::ConversationContext;
use crate::error::{AgentError, ToolError};
use crate::tools::core::{ToolSet, parse_tool_args};
use crate::tools::names;
use crate::tools::spec::ToolSpec;
use crate::ToolDef;
use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// ── Profiles ───────────────────────────────────────────────────────

/// A kind of sub-agent: its prompt and the tools it may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAgentProfile {
    pub name: String,
    /// One line shown to the parent model in the `Task` description.
    pub description: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
}

impl SubAgentProfile {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        tools: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            tools: tools.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    /// The built-in profiles: explore, research, bash and git.
    pub fn builtin() -> Vec<SubAgentProfile> {
        vec![
            SubAgentProfile::new(
                "explore",
                "Fast codebase exploration: find files, map structure, answer questions",
                "You are an explore sub-agent of a coding assistant. Find the files and facts \
                 the task asks for, quickly. Start with Glob to locate candidates, narrow down \
                 with Grep, and Read only the files that matter. Finish with a concise report \
                 that names files and line numbers.",
                &[names::READ, names::GREP, names::GLOB, names::BASH],
            ),
            SubAgentProfile::new(
                "research",
                "Thorough read-only research across many files",
                "You are a research sub-agent of a coding assistant. Search the codebase \
                 systematically, read the relevant files, and connect the findings. Report \
                 condensed results with file and line references. You cannot change files.",
                &[names::READ, names::GREP, names::GLOB],
            ),
            SubAgentProfile::new(
                "bash",
                "Multi-step command sequences: builds, tests, scripts",
                "You are a command execution sub-agent of a coding assistant. Run the commands \
                 the task needs one at a time and check each result before the next. Report \
                 what ran, what failed and what to do about it.",
                &[names::BASH, names::READ],
            ),
            SubAgentProfile::new(
                "git",
                "Git history and diff analysis",
                "You are a git analysis sub-agent of a coding assistant. Use git commands to \
                 inspect history, diffs and branches. Report the key changes with commit \
                 references and leave out the noise.",
                &[names::BASH, names::READ, names::GREP],
            ),
        ]
    }

    /// Whether `requested` names this profile. Case-insensitive; a `house-`
    /// prefix is ignored.
    pub fn matches(&self, requested: &str) -> bool {
        let requested = requested.trim().to_lowercase();
        let requested = requested.strip_prefix("house-").unwrap_or(&requested);
        self.name.eq_ignore_ascii_case(requested)
    }
}

// ── Requests and reports ───────────────────────────────────────────

/// Arguments of the `Task` tool.
#[derive(Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Which kind of sub-agent to launch.
    pub subagent_type: String,
    /// The complete task. The sub-agent sees nothing else unless
    /// include_parent_history is set.
    pub prompt: String,
    /// Give the sub-agent a copy of this conversation's history.
    #[serde(default)]
    pub include_parent_history: bool,
}

impl SpawnRequest {
    pub fn new(subagent_type: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            subagent_type: subagent_type.into(),
            prompt: prompt.into(),
            include_parent_history: false,
        }
    }

    pub fn with_parent_history(mut self) -> Self {
        self.include_parent_history = true;
        self
    }

    /// Parse the raw arguments of a `Task` call.
    pub fn from_arguments(arguments: &str) -> Result<Self, ToolError> {
        parse_tool_args(names::TASK, arguments)
    }
}

/// What a finished sub-agent hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct SubAgentReport {
    pub profile: String,
    /// The child's final answer.
    pub text: String,
    pub rounds_used: u32,
    /// Whether the child answered before its round limit.
    pub finished: bool,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl SubAgentReport {
    fn from_outcome(profile: &str, outcome: &TurnOutcome, max_rounds: u32) -> Self {
        let mut text = outcome
            .response()
            .unwrap_or("(the sub-agent produced no answer)")
            .to_string();
        if !outcome.finished {
            let _ = write!(text, "\n\n[stopped at the limit of {max_rounds} rounds]");
        }
        Self {
            profile: profile.to_string(),
            text,
            rounds_used: outcome.rounds_used,
            finished: outcome.finished,
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
        }
    }

    /// The tool result the parent sees.
    pub fn to_parent_result(&self) -> String {
        format!("[{} agent report]\n\n{}", self.profile, self.text)
    }
}

/// Definition of the `Task` tool for the given profiles.
pub fn task_tool_def(profiles: &[SubAgentProfile]) -> ToolDef {
    let mut available = String::new();
    for profile in profiles {
        let _ = write!(
            available,
            "\n  - {}: {} (tools: {})",
            profile.name,
            profile.description,
            profile.tools.join(", ")
        );
    }
    let mut def = ToolSpec::builder(names::TASK)
        .purpose("Launch a sub-agent that works on a task in its own context and reports back")
        .when_to_use(format!(
            "For self-contained searches or command sequences whose intermediate output you \
             do not need to keep. Available agents:{available}"
        ))
        .when_not_to_use(
            "For a single Read, Grep or Bash call, or for work that must edit files you are \
             already editing",
        )
        .parameters_for::<SpawnRequest>()
        .example(
            "Task(subagent_type='explore', prompt='Where is the HTTP retry logic implemented?')",
            "a short report naming files and lines",
        )
        .output_format("'[{type} agent report]' followed by the sub-agent's answer")
        .to_tool_def();
    let names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
    if let Some(property) = def
        .function
        .parameters
        .pointer_mut("/properties/subagent_type")
    {
        property["enum"] = serde_json::json!(names);
    }
    def
}

// ── Spawner ────────────────────────────────────────────────────────

/// Child turns are boxed to break the `Orchestrator → Spawner →
/// Orchestrator` type recursion.
type ChildTurn<'f> = Pin<Box<dyn Future<Output = Result<TurnOutcome, AgentError>> + 'f>>;

/// Creates and runs child orchestrators.
pub struct Spawner<'a> {
    client: &'a dyn ModelClient,
    tools: &'a ToolSet,
    config: SpawnerConfig,
    parent_model: String,
    /// Depth of the agent that owns this spawner; the main agent is 0.
    depth: usize,
    event_handler: &'a dyn EventHandler,
    cancel: Option<CancellationToken>,
}

impl<'a> Spawner<'a> {
    pub fn new(client: &'a dyn ModelClient, tools: &'a ToolSet, config: SpawnerConfig) -> Self {
        Self {
            client,
            tools,
            config,
            parent_model: crate::DEFAULT_MODEL.to_string(),
            depth: 0,
            event_handler: &NoopHandler,
            cancel: None,
        }
    }

    pub fn with_parent_model(mut self, model: impl Into<String>) -> Self {
        self.parent_model = model.into();
        self
    }

    pub fn at_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &SpawnerConfig {
        &self.config
    }

    /// Whether the owning agent may launch children at all.
    pub fn can_spawn(&self) -> bool {
        self.depth < self.config.max_depth
    }

    pub fn profile(&self, requested: &str) -> Option<&SubAgentProfile> {
        self.config.profiles.iter().find(|p| p.matches(requested))
    }

    /// Build the child's context and the first user message of its turn.
    pub fn derive_context(
        &self,
        parent: &ConversationContext,
        request: &SpawnRequest,
        profile: &SubAgentProfile,
    ) -> (ConversationContext, String) {
        if request.include_parent_history {
            let task = format!(
                "[Task for the {} sub-agent. The conversation above belongs to the parent \
                 session and is background only.]\n\n{}",
                profile.name, request.prompt
            );
            (parent.fork_settled(), task)
        } else {
            let task = format!(
                "[You are a {} sub-agent. The parent session has {} message(s) of history you \
                 cannot see; everything you need is in this task. Your final answer is your \
                 report.]\n\n{}",
                profile.name,
                parent.len(),
                request.prompt
            );
            (ConversationContext::new(), task)
        }
    }

    /// Run one child to completion and return its report.
    ///
    /// Failures the parent model can react to (unknown profile, depth limit,
    /// a child whose model calls failed) are [`ToolError`]s.
    pub async fn spawn(
        &self,
        parent: &ConversationContext,
        request: SpawnRequest,
    ) -> Result<SubAgentReport, ToolError> {
        if !self.can_spawn() {
            return Err(ToolError::execution(format!(
                "maximum sub-agent depth ({}) reached; cannot spawn a '{}' agent",
                self.config.max_depth, request.subagent_type
            )));
        }
        let profile = self.profile(&request.subagent_type).ok_or_else(|| {
            let known: Vec<&str> = self.config.profiles.iter().map(|p| p.name.as_str()).collect();
            ToolError::execution(format!(
                "Unknown subagent_type '{}'. Available: {}",
                request.subagent_type,
                known.join(", ")
            ))
        })?;

        let allowed: Vec<&str> = profile
            .tools
            .iter()
            .map(String::as_str)
            .filter(|name| *name != names::TASK)
            .collect();
        let tools = self.tools.restricted_to(&allowed);
        let model = self
            .config
            .child_model
            .clone()
            .unwrap_or_else(|| self.parent_model.clone());
        let config = OrchestratorConfig {
            gc: self.config.child_gc.clone(),
            ..OrchestratorConfig::new(model, profile.system_prompt.clone())
                .with_max_rounds(self.config.child_max_rounds)
        };

        let child_depth = self.depth + 1;
        let mut child = Orchestrator::new(self.client, &tools, config)
            .with_event_handler(self.event_handler)
            .at_depth(child_depth);
        if child_depth < self.config.max_depth {
            child = child.with_sub_agents(self.config.clone());
        }
        if let Some(token) = &self.cancel {
            child = child.with_cancellation(token.clone());
        }

        let (mut ctx, task) = self.derive_context(parent, &request, profile);
        info!(
            "Spawning {} sub-agent (depth={child_depth}, tools=[{}], parent_history={})",
            profile.name,
            tools.names().join(", "),
            request.include_parent_history
        );
        self.event_handler.on_event(&AgentEvent::SubAgentStarted {
            profile: &profile.name,
            depth: child_depth,
        });

        let turn: ChildTurn<'_> = Box::pin(child.run_turn(&mut ctx, &task));
        let outcome = turn.await.map_err(|e| {
            ToolError::execution(format!("{} sub-agent failed: {e}", profile.name))
        })?;

        let report =
            SubAgentReport::from_outcome(&profile.name, &outcome, self.config.child_max_rounds);
        debug!(
            "{} sub-agent used {} round(s), {} child message(s) discarded",
            profile.name,
            report.rounds_used,
            ctx.len()
        );
        self.event_handler.on_event(&AgentEvent::SubAgentFinished {
            profile: &profile.name,
            rounds_used: report.rounds_used,
            finished: report.finished,
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::model::testing::ScriptedClient;
    use crate::context::ToolOutcome;
    use crate::{ChatCompletion, ChatRole, ToolCall};

    fn tool_names(request: &crate::ChatRequest) -> Vec<String> {
        request
            .tools
            .iter()
            .flatten()
            .map(|t| t.function.name.clone())
            .collect()
    }

    #[test]
    fn profiles_match_loosely() {
        let profiles = SubAgentProfile::builtin();
        assert!(profiles[0].matches("Explore"));
        assert!(profiles[1].matches("house-research"));
        assert!(!profiles[2].matches("git"));
    }

    #[test]
    fn task_definition_lists_profiles() {
        let def = task_tool_def(&SubAgentProfile::builtin());
        assert_eq!(def.function.name, "Task");
        assert!(def.function.description.contains("research: Thorough read-only"));
        assert_eq!(
            def.function.parameters["properties"]["subagent_type"]["enum"][3],
            "git"
        );
    }

    #[test]
    fn report_format() {
        let report = SubAgentReport {
            profile: "explore".into(),
            text: "Found it in src/lib.rs:12".into(),
            rounds_used: 2,
            finished: true,
            prompt_tokens: 0,
            completion_tokens: 0,
        };
        assert_eq!(
            report.to_parent_result(),
            "[explore agent report]\n\nFound it in src/lib.rs:12"
        );
    }

    #[tokio::test]
    async fn child_gets_profile_tools_and_a_seed_context() {
        let client = ScriptedClient::new(vec![Ok(ChatCompletion::text("parse() is in src/parse.rs"))]);
        let tools = ToolSet::new().with_coding_tools("/tmp");
        let spawner = Spawner::new(&client, &tools, SpawnerConfig::default());

        let mut parent = ConversationContext::new();
        parent.push_user("refactor the parser");
        let before = parent.clone();

        let report = spawner
            .spawn(&parent, SpawnRequest::new("research", "Where is parse() defined?"))
            .await
            .unwrap();
        assert_eq!(report.text, "parse() is in src/parse.rs");
        assert!(report.finished);

        let requests = client.requests.lock().unwrap();
        assert_eq!(tool_names(&requests[0]), vec!["Glob", "Grep", "Read"]);
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.as_deref().unwrap().contains("research sub-agent"));
        let task = messages[1].content.as_deref().unwrap();
        assert!(task.contains("1 message(s) of history"));
        assert!(task.ends_with("Where is parse() defined?"));

        assert_eq!(parent.messages(), before.messages());
    }

    #[tokio::test]
    async fn parent_history_is_copied_without_the_open_exchange() {
        let client = ScriptedClient::new(vec![Ok(ChatCompletion::text("ok"))]);
        let tools = ToolSet::new().with_coding_tools("/tmp");
        let spawner = Spawner::new(&client, &tools, SpawnerConfig::default());

        let mut parent = ConversationContext::new();
        parent.push_user("what changed?");
        parent.push_assistant(
            None,
            vec![ToolCall::new("t1", "Bash", r#"{"command":"git log -1"}"#)],
        );
        parent.push_tool_result("t1", "abc123 fix parser", ToolOutcome::success("Bash"));
        parent.push_assistant(
            None,
            vec![ToolCall::new("t2", "Task", r#"{"subagent_type":"git","prompt":"p"}"#)],
        );

        spawner
            .spawn(&parent, SpawnRequest::new("git", "Summarize abc123").with_parent_history())
            .await
            .unwrap();

        let requests = client.requests.lock().unwrap();
        let messages = &requests[0].messages;
        // system, user, assistant(t1), result(t1), task
        assert_eq!(messages.len(), 5);
        assert!(messages.iter().all(|m| m.tool_calls.iter().flatten().all(|c| c.id != "t2")));
        assert_eq!(tool_names(&requests[0]), vec!["Bash", "Grep", "Read"]);
    }

    #[tokio::test]
    async fn unknown_profile_and_depth_limit_are_tool_errors() {
        let client = ScriptedClient::new(vec![]);
        let tools = ToolSet::new().with_coding_tools("/tmp");
        let parent = ConversationContext::new();

        let spawner = Spawner::new(&client, &tools, SpawnerConfig::default());
        let err = spawner
            .spawn(&parent, SpawnRequest::new("painter", "draw"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Available: explore, research, bash, git"));

        let nested = Spawner::new(&client, &tools, SpawnerConfig::default()).at_depth(1);
        let err = nested
            .spawn(&parent, SpawnRequest::new("explore", "look"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("maximum sub-agent depth (1)"));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn child_tool_work_stays_in_the_child() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "retry lives in api/retry.rs\n").unwrap();
        let client = ScriptedClient::new(vec![
            Ok(ChatCompletion::tool_calls(vec![ToolCall::new(
                "c1",
                "Read",
                r#"{"file_path":"notes.md"}"#,
            )])),
            Ok(ChatCompletion::text("retry lives in api/retry.rs")),
        ]);
        let tools = ToolSet::new().with_coding_tools(dir.path());
        let spawner = Spawner::new(&client, &tools, SpawnerConfig::default());
        let parent = ConversationContext::new();

        let report = spawner
            .spawn(&parent, SpawnRequest::new("explore", "Find the retry code"))
            .await
            .unwrap();
        assert_eq!(report.rounds_used, 2);
        assert_eq!(report.text, "retry lives in api/retry.rs");
        assert!(parent.is_empty());
        assert!(parent.file_cache().is_empty());

        let second = &client.requests.lock().unwrap()[1];
        let result = second.messages.last().unwrap().content.as_deref().unwrap();
        assert!(result.contains("retry lives in api/retry.rs"));
    }

    #[tokio::test]
    async fn round_limit_is_noted_in_the_report() {
        let looping = || {
            Ok(ChatCompletion::tool_calls(vec![ToolCall::new(
                "",
                "Bash",
                r#"{"command":"echo again"}"#,
            )]))
        };
        let client = ScriptedClient::new(vec![looping(), looping()]);
        let tools = ToolSet::new().with_coding_tools("/tmp");
        let spawner = Spawner::new(
            &client,
            &tools,
            SpawnerConfig::default().with_child_max_rounds(2),
        );
        let report = spawner
            .spawn(&ConversationContext::new(), SpawnRequest::new("bash", "loop"))
            .await
            .unwrap();
        assert!(!report.finished);
        assert!(report.text.ends_with("[stopped at the limit of 2 rounds]"));
    }
}
