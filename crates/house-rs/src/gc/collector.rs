//! The garbage collector: triggers, plan validation, and the pass state
//! machine.
//!
//! A pass runs `Idle → Classifying → Applying → Idle`. Any failure moves it
//! to `Aborted` and then back to `Idle` with the context untouched; a failed
//! pass never ends the session.

use super::analysis::Exclusions;
use super::classifier::{Classifier, GcSnapshot, RuleClassifier};
use super::plan::{GcPlan, PruneAction, PruneReason};
use crate::context::compaction::{self, ApplyReport};
use crate::context::{ConversationContext, DEFAULT_CHARS_PER_TOKEN};
use crate::error::GcError;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// GC settings.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Run a pass every this many model rounds. 0 disables the round trigger.
    pub every_rounds: u32,
    /// Run a pass whenever the estimated context size reaches this many tokens.
    pub token_threshold: usize,
    /// Number of most recent turns that are never pruned.
    pub recent_turns: u64,
    /// Passes are skipped while the context holds fewer messages than this.
    pub min_messages: usize,
    pub protect_user_messages: bool,
    /// Accept `redundant` actions from the classifier. Off by default: only
    /// the named categories are applied.
    pub allow_redundant: bool,
    pub chars_per_token: f64,
    /// Upper bound on one classifier call.
    pub classifier_timeout: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            every_rounds: 3,
            token_threshold: 150_000,
            recent_turns: 5,
            min_messages: 10,
            protect_user_messages: true,
            allow_redundant: false,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            classifier_timeout: Duration::from_secs(60),
        }
    }
}

impl GcConfig {
    pub fn with_every_rounds(mut self, rounds: u32) -> Self {
        self.every_rounds = rounds;
        self
    }

    pub fn with_token_threshold(mut self, tokens: usize) -> Self {
        self.token_threshold = tokens;
        self
    }

    pub fn with_recent_turns(mut self, turns: u64) -> Self {
        self.recent_turns = turns;
        self
    }

    pub fn with_min_messages(mut self, messages: usize) -> Self {
        self.min_messages = messages;
        self
    }

    pub fn with_allow_redundant(mut self, allow: bool) -> Self {
        self.allow_redundant = allow;
        self
    }
}

/// Where the collector is in its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    Idle,
    Classifying,
    Applying,
    Aborted,
}

/// What fired a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcTrigger {
    /// `every_rounds` rounds have passed since the last pass.
    Rounds(u32),
    /// The estimated size reached the threshold.
    Tokens(usize),
}

impl fmt::Display for GcTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcTrigger::Rounds(n) => write!(f, "{n} rounds since last pass"),
            GcTrigger::Tokens(t) => write!(f, "~{t} tokens in context"),
        }
    }
}

/// Result of one [`GarbageCollector::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcOutcome {
    /// The pass did not run.
    Skipped(String),
    /// The classifier found nothing to prune.
    NothingToPrune,
    /// The plan was applied.
    Applied { plan: GcPlan, report: ApplyReport },
    /// The pass was rejected; the context is unchanged.
    Aborted(GcError),
}

/// Decides when to collect, validates plans, and applies them.
pub struct GarbageCollector<'c> {
    config: GcConfig,
    classifier: Box<dyn Classifier + 'c>,
    state: GcState,
    rounds_since_pass: u32,
    /// `next_turn` of the context at the end of the last completed pass.
    last_pass_turn: Option<u64>,
}

impl<'c> GarbageCollector<'c> {
    pub fn new(config: GcConfig, classifier: impl Classifier + 'c) -> Self {
        Self {
            config,
            classifier: Box::new(classifier),
            state: GcState::Idle,
            rounds_since_pass: 0,
            last_pass_turn: None,
        }
    }

    /// Collector driven by the deterministic [`RuleClassifier`].
    pub fn with_rules(config: GcConfig) -> Self {
        Self::new(config, RuleClassifier)
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    pub fn state(&self) -> GcState {
        self.state
    }

    fn transition(&mut self, next: GcState) {
        debug!("GC state: {:?} -> {next:?}", self.state);
        self.state = next;
    }

    /// Count one completed model round toward the round trigger.
    pub fn note_round(&mut self) {
        self.rounds_since_pass += 1;
    }

    /// Whether a pass is due for `ctx`.
    pub fn trigger(&self, ctx: &ConversationContext) -> Option<GcTrigger> {
        if self.config.every_rounds > 0 && self.rounds_since_pass >= self.config.every_rounds {
            return Some(GcTrigger::Rounds(self.rounds_since_pass));
        }
        let tokens = ctx.estimate_tokens(self.config.chars_per_token);
        (tokens >= self.config.token_threshold).then_some(GcTrigger::Tokens(tokens))
    }

    pub fn exclusions(&self, ctx: &ConversationContext) -> Exclusions {
        Exclusions::for_context(ctx, self.config.recent_turns, self.config.protect_user_messages)
    }

    /// Ask the classifier for a plan and validate it. Reads the context only.
    ///
    /// A context that has not grown since the last completed pass yields an
    /// empty plan without consulting the classifier.
    pub async fn analyze(&mut self, ctx: &ConversationContext) -> Result<GcPlan, GcError> {
        if self.last_pass_turn == Some(ctx.next_turn()) {
            debug!("GC: no new turns since the last pass");
            return Ok(GcPlan::empty());
        }

        self.transition(GcState::Classifying);
        let snapshot = GcSnapshot::new(ctx, self.exclusions(ctx));
        let timeout = self.config.classifier_timeout;
        let result =
            match tokio::time::timeout(timeout, self.classifier.classify(&snapshot)).await {
                Ok(result) => result,
                Err(_) => Err(GcError::Classification(format!(
                    "classifier '{}' timed out after {timeout:?}",
                    self.classifier.name()
                ))),
            }
            .and_then(|plan| self.validate(&snapshot, plan));

        match result {
            Ok(plan) => {
                if plan.is_empty() {
                    self.finish(ctx);
                } else {
                    self.transition(GcState::Applying);
                }
                Ok(plan)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// Apply a plan returned by [`analyze`](Self::analyze). Atomic: on error
    /// the context is unchanged.
    pub fn apply(
        &mut self,
        ctx: &mut ConversationContext,
        plan: &GcPlan,
    ) -> Result<ApplyReport, GcError> {
        match compaction::apply(ctx, plan, self.config.chars_per_token) {
            Ok(report) => {
                self.finish(ctx);
                Ok(report)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    /// Run a full pass: analyze, then apply. Failures are logged and
    /// reported in the outcome; they never propagate.
    pub async fn run(&mut self, ctx: &mut ConversationContext) -> GcOutcome {
        self.rounds_since_pass = 0;
        if ctx.len() < self.config.min_messages {
            return GcOutcome::Skipped(format!(
                "{} messages, fewer than {}",
                ctx.len(),
                self.config.min_messages
            ));
        }

        let plan = match self.analyze(ctx).await {
            Ok(plan) if plan.is_empty() => return GcOutcome::NothingToPrune,
            Ok(plan) => plan,
            Err(e) => {
                warn!("GC pass aborted: {e}");
                return GcOutcome::Aborted(e);
            }
        };

        match self.apply(ctx, &plan) {
            Ok(report) => {
                info!(
                    "GC compacted {} span(s): {} -> {} messages, ~{} tokens freed",
                    report.actions_applied,
                    report.messages_before,
                    report.messages_after,
                    report.tokens_freed()
                );
                GcOutcome::Applied { plan, report }
            }
            Err(e) => {
                warn!("GC pass aborted while applying: {e}");
                GcOutcome::Aborted(e)
            }
        }
    }

    fn finish(&mut self, ctx: &ConversationContext) {
        self.last_pass_turn = Some(ctx.next_turn());
        self.transition(GcState::Idle);
    }

    fn abort(&mut self) {
        self.transition(GcState::Aborted);
        self.transition(GcState::Idle);
    }

    /// Check a proposed plan against the exclusions and the analysis.
    /// Returns the plan sorted by span start, with `redundant` actions
    /// dropped unless they are allowed.
    fn validate(&self, snapshot: &GcSnapshot<'_>, plan: GcPlan) -> Result<GcPlan, GcError> {
        let ctx = snapshot.context;
        let mut actions: Vec<PruneAction> = plan
            .actions
            .into_iter()
            .filter(|a| {
                let keep = self.config.allow_redundant || a.reason != PruneReason::Redundant;
                if !keep {
                    debug!("GC: dropping redundant action for {}", a.span);
                }
                keep
            })
            .collect();
        actions.sort_by_key(|a| a.span.start);

        for pair in actions.windows(2) {
            if pair[0].span.overlaps(&pair[1].span) {
                return Err(GcError::PlanConflict(format!(
                    "spans {} and {} overlap",
                    pair[0].span, pair[1].span
                )));
            }
        }
        for action in &actions {
            snapshot.exclusions.check(ctx, action.span)?;
            snapshot.analysis.check_span(ctx, action.span, action.reason)?;
        }
        Ok(GcPlan::new(actions))
    }
}
