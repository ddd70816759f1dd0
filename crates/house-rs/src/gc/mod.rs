//! Conversation garbage collection.
//!
//! 1. **[`analysis`]**: deterministic per-call eligibility (superseded reads,
//!    replaced todo snapshots, resolved errors) and the hard [`Exclusions`].
//!
//! 2. **[`classifier`]**: the [`Classifier`] trait and the rule-based
//!    [`RuleClassifier`].
//!
//! 3. **[`model_classifier`]**: [`ModelClassifier`], which asks a cheap model
//!    for the plan.
//!
//! 4. **[`collector`]**: [`GarbageCollector`], which decides when to run,
//!    validates plans, and hands them to the
//!    [compaction manager](crate::context::compaction).
//!
//! 5. **[`plan`]**: [`GcPlan`], [`PruneAction`] and [`TurnSpan`].

pub mod analysis;
pub mod classifier;
pub mod collector;
pub mod model_classifier;
pub mod plan;

pub use analysis::{Analysis, Exclusions};
pub use classifier::{Classifier, ClassifierFuture, GcSnapshot, RuleClassifier};
pub use collector::{GarbageCollector, GcConfig, GcOutcome, GcState, GcTrigger};
pub use model_classifier::{ModelClassifier, ModelClassifierConfig};
pub use plan::{GcPlan, PruneAction, PruneReason, TurnSpan};
