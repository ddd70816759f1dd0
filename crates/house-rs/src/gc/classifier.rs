//! The classifier seam: who proposes what to prune.
//!
//! A [`Classifier`] receives a read-only [`GcSnapshot`] and returns a
//! [`GcPlan`]. It never touches the context. Whatever it proposes is
//! validated by the [`GarbageCollector`](super::GarbageCollector) before
//! anything is applied.

use super::analysis::{Analysis, Exclusions};
use super::plan::{GcPlan, PruneAction};
use crate::context::ConversationContext;
use crate::error::GcError;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Classifier::classify`].
pub type ClassifierFuture<'a> = Pin<Box<dyn Future<Output = Result<GcPlan, GcError>> + Send + 'a>>;

/// Everything a classifier may look at during one pass.
#[derive(Debug)]
pub struct GcSnapshot<'a> {
    pub context: &'a ConversationContext,
    pub analysis: Analysis,
    pub exclusions: Exclusions,
}

impl<'a> GcSnapshot<'a> {
    pub fn new(context: &'a ConversationContext, exclusions: Exclusions) -> Self {
        Self {
            context,
            analysis: Analysis::of(context),
            exclusions,
        }
    }
}

/// Proposes prune actions for a conversation snapshot.
pub trait Classifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn classify<'a>(&'a self, snapshot: &'a GcSnapshot<'a>) -> ClassifierFuture<'a>;
}

/// Deterministic classifier: proposes exactly the exchanges the analysis
/// marks eligible and the exclusions allow, merging neighbours that share a
/// reason into one action.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn plan(snapshot: &GcSnapshot<'_>) -> GcPlan {
        let ctx = snapshot.context;
        let mut actions: Vec<PruneAction> = Vec::new();

        for (exchange, reason) in snapshot.analysis.eligible_exchanges() {
            if snapshot.exclusions.check(ctx, exchange.span).is_err() {
                continue;
            }
            let summary = snapshot.analysis.exchange_summary(exchange);
            match actions.last_mut() {
                Some(last) if last.reason == reason && last.span.end == exchange.span.start => {
                    last.span.end = exchange.span.end;
                    last.summary.push_str("; ");
                    last.summary.push_str(&summary);
                }
                _ => actions.push(PruneAction::new(exchange.span, reason, summary)),
            }
        }
        GcPlan::new(actions)
    }
}

impl Classifier for RuleClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    fn classify<'a>(&'a self, snapshot: &'a GcSnapshot<'a>) -> ClassifierFuture<'a> {
        Box::pin(async move { Ok(Self::plan(snapshot)) })
    }
}
