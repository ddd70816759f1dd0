//! Configuration for the [`Orchestrator`](super::orchestrator::Orchestrator)
//! and the sub-agent [`Spawner`](super::sub_agent::Spawner).
//!
//! ```ignore
//! let config = OrchestratorConfig::new(DEFAULT_MODEL, "You are a coding assistant.")
//!     .with_max_rounds(30)
//!     .with_retries(3)
//!     .with_gc(GcConfig::default().with_every_rounds(5));
//!
//! // No garbage collection at all:
//! let config = OrchestratorConfig {
//!     gc: Toggle::disabled(),
//!     ..OrchestratorConfig::new(DEFAULT_MODEL, "You are helpful.")
//! };
//! ```

use crate::agent::sub_agent::SubAgentProfile;
use crate::api::retry::RetryConfig;
use crate::context::DEFAULT_CONTEXT_WINDOW;
use crate::gc::GcConfig;

// ── Generic toggle ────────────────────────────────────────────────

/// Enabled/disabled wrapper for an optional module's configuration.
///
/// When `enabled` is `false` the module is skipped regardless of the inner
/// config values.
#[derive(Debug, Clone)]
pub struct Toggle<T: Default> {
    pub enabled: bool,
    pub config: T,
}

impl<T: Default> Toggle<T> {
    /// An enabled instance with the given config.
    pub fn enabled(config: T) -> Self {
        Self {
            enabled: true,
            config,
        }
    }

    /// A disabled instance with default inner config.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            config: T::default(),
        }
    }

    /// The inner config when enabled.
    pub fn active(&self) -> Option<&T> {
        self.enabled.then_some(&self.config)
    }
}

impl<T: Default> Default for Toggle<T> {
    fn default() -> Self {
        Self::enabled(T::default())
    }
}

// ── Orchestrator config ───────────────────────────────────────────

/// Configuration for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model identifier (e.g. `"anthropic/claude-sonnet-4.5"`).
    pub model: String,
    pub system_prompt: String,
    /// Model rounds allowed per user turn before stopping.
    pub max_rounds: u32,
    /// Maximum tokens per model response.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Retries for transient API failures.
    pub retry: RetryConfig,
    /// Times an empty response (no text, no calls) is re-requested.
    pub empty_response_retries: u32,
    /// Garbage collection. Enabled by default.
    pub gc: Toggle<GcConfig>,
    /// Context window in tokens, for usage reporting.
    pub context_window: usize,
}

impl OrchestratorConfig {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Retry transient API failures (429, 5xx, network errors) up to
    /// `max_retries` times with exponential backoff.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(max_retries);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enable garbage collection with `config`.
    pub fn with_gc(mut self, config: GcConfig) -> Self {
        self.gc = Toggle::enabled(config);
        self
    }

    pub fn without_gc(mut self) -> Self {
        self.gc = Toggle::disabled();
        self
    }

    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = tokens;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            system_prompt: String::new(),
            max_rounds: 50,
            max_tokens: 8192,
            temperature: 0.0,
            retry: RetryConfig::default(),
            empty_response_retries: 3,
            gc: Toggle::default(),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

// ── Spawner config ────────────────────────────────────────────────

/// Limits applied to sub-agents.
#[derive(Debug, Clone)]
pub struct SpawnerConfig {
    /// How deep sub-agents may nest. 1 means the main agent can spawn
    /// children but children cannot spawn their own.
    pub max_depth: usize,
    /// Round limit for each child's single turn.
    pub child_max_rounds: u32,
    /// Model for children; `None` uses the parent's model.
    pub child_model: Option<String>,
    /// Garbage collection inside children. Disabled by default since a
    /// child runs a single short turn.
    pub child_gc: Toggle<GcConfig>,
    /// Profiles the `Task` tool can launch.
    pub profiles: Vec<SubAgentProfile>,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            max_depth: 1,
            child_max_rounds: 25,
            child_model: None,
            child_gc: Toggle::disabled(),
            profiles: SubAgentProfile::builtin(),
        }
    }
}

impl SpawnerConfig {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_child_max_rounds(mut self, rounds: u32) -> Self {
        self.child_max_rounds = rounds;
        self
    }

    pub fn with_child_model(mut self, model: impl Into<String>) -> Self {
        self.child_model = Some(model.into());
        self
    }

    /// Add a profile, replacing a built-in one with the same name.
    pub fn with_profile(mut self, profile: SubAgentProfile) -> Self {
        self.profiles.retain(|p| p.name != profile.name);
        self.profiles.push(profile);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_is_enabled_by_default() {
        let config = OrchestratorConfig::new("m", "p");
        assert!(config.gc.enabled);
        assert_eq!(config.gc.active().map(|c| c.every_rounds), Some(3));
        assert_eq!(config.max_rounds, 50);
        assert_eq!(config.system_prompt, "p");
    }

    #[test]
    fn struct_update_disables_gc() {
        let config = OrchestratorConfig {
            gc: Toggle::disabled(),
            ..OrchestratorConfig::new("m", "p")
        };
        assert!(config.gc.active().is_none());
        assert!(OrchestratorConfig::new("m", "p").without_gc().gc.active().is_none());
    }

    #[test]
    fn spawner_defaults_allow_one_level() {
        let config = SpawnerConfig::default();
        assert_eq!(config.max_depth, 1);
        assert_eq!(config.child_max_rounds, 25);
        assert!(!config.child_gc.enabled);
        assert_eq!(config.profiles.len(), 4);
    }

    #[test]
    fn custom_profile_replaces_builtin() {
        let config = SpawnerConfig::default()
            .with_max_depth(2)
            .with_child_model("cheap/model")
            .with_profile(SubAgentProfile::new("git", "History only", "Use git log.", &["Bash"]));
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.child_model.as_deref(), Some("cheap/model"));
        assert_eq!(config.profiles.len(), 4);
        let git = config.profiles.iter().find(|p| p.name == "git").unwrap();
        assert_eq!(git.tools, vec!["Bash".to_string()]);
    }
}
