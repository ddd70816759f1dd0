//! Coding-agent configuration with sensible defaults.
//!
//! [`CodeConfig`] captures the settings the CLI exposes and converts them
//! into house-rs types via [`build_orchestrator_config`](CodeConfig::build_orchestrator_config),
//! [`build_spawner_config`](CodeConfig::build_spawner_config) and
//! [`build_tool_set`](CodeConfig::build_tool_set).

use std::path::PathBuf;

use house_rs::agent::{OrchestratorConfig, SpawnerConfig, Toggle};
use house_rs::gc::{GcConfig, ModelClassifierConfig};
use house_rs::tools::ToolSet;

use crate::prompt::coding_system_prompt;

/// Configuration for a coding session.
#[derive(Debug, Clone)]
pub struct CodeConfig {
    /// Model identifier. Default: [`house_rs::DEFAULT_MODEL`].
    pub model: String,
    /// Maximum model rounds per user turn. Default: `50`.
    pub max_rounds: u32,
    /// Maximum tokens per model response. Default: `8192`.
    pub max_tokens: u32,
    /// Sampling temperature. Default: `0.0`.
    pub temperature: f32,
    /// Working directory for file and shell tools. Default: `"."`.
    pub workdir: PathBuf,
    /// Context garbage collection. Enabled by default.
    pub gc: Toggle<GcConfig>,
    /// Classify with a model instead of the deterministic rules.
    pub model_gc: bool,
    /// Model used when `model_gc` is set.
    pub classifier_model: String,
    /// Offer the `Task` tool. Default: `true`.
    pub sub_agents: bool,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            model: house_rs::DEFAULT_MODEL.to_string(),
            max_rounds: 50,
            max_tokens: 8192,
            temperature: 0.0,
            workdir: PathBuf::from("."),
            gc: Toggle::default(),
            model_gc: false,
            classifier_model: house_rs::DEFAULT_CLASSIFIER_MODEL.to_string(),
            sub_agents: true,
        }
    }
}

impl CodeConfig {
    /// Build an [`OrchestratorConfig`] with the coding system prompt.
    pub fn build_orchestrator_config(&self) -> OrchestratorConfig {
        let spawner = self.build_spawner_config();
        let profiles = spawner.as_ref().map_or(&[][..], |s| &s.profiles[..]);
        let config = OrchestratorConfig::new(self.model.clone(), coding_system_prompt(profiles))
            .with_max_rounds(self.max_rounds)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        OrchestratorConfig {
            gc: self.gc.clone(),
            ..config
        }
    }

    /// Sub-agent limits, or `None` when sub-agents are off.
    pub fn build_spawner_config(&self) -> Option<SpawnerConfig> {
        self.sub_agents.then(SpawnerConfig::default)
    }

    /// Classifier settings when model classification is requested and GC
    /// is on.
    pub fn build_classifier_config(&self) -> Option<ModelClassifierConfig> {
        (self.model_gc && self.gc.enabled)
            .then(|| ModelClassifierConfig::default().with_model(self.classifier_model.clone()))
    }

    /// The seven coding tools rooted at the working directory.
    pub fn build_tool_set(&self) -> ToolSet {
        ToolSet::new().with_coding_tools(&self.workdir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_gc_and_sub_agents() {
        let config = CodeConfig::default();
        assert_eq!(config.max_rounds, 50);
        assert!(config.gc.enabled);
        assert!(config.sub_agents);
        assert!(config.build_classifier_config().is_none());
    }

    #[test]
    fn orchestrator_config_carries_cli_values() {
        let config = CodeConfig {
            max_rounds: 7,
            max_tokens: 1024,
            gc: Toggle::enabled(GcConfig::default().with_every_rounds(2)),
            ..Default::default()
        };
        let built = config.build_orchestrator_config();
        assert_eq!(built.max_rounds, 7);
        assert_eq!(built.max_tokens, 1024);
        assert_eq!(built.gc.active().map(|g| g.every_rounds), Some(2));
        assert!(built.system_prompt.contains("Task"));
    }

    #[test]
    fn disabling_sub_agents_drops_task_from_the_prompt() {
        let config = CodeConfig {
            sub_agents: false,
            ..Default::default()
        };
        assert!(config.build_spawner_config().is_none());
        assert!(!config.build_orchestrator_config().system_prompt.contains("Task tool"));
    }

    #[test]
    fn model_gc_needs_gc_enabled() {
        let config = CodeConfig {
            model_gc: true,
            classifier_model: "cheap/model".into(),
            ..Default::default()
        };
        assert_eq!(config.build_classifier_config().map(|c| c.model).as_deref(), Some("cheap/model"));

        let off = CodeConfig {
            gc: Toggle::disabled(),
            ..config
        };
        assert!(off.build_classifier_config().is_none());
    }

    #[test]
    fn tool_set_has_the_coding_tools() {
        let tools = CodeConfig::default().build_tool_set();
        assert_eq!(
            tools.names(),
            vec!["Bash", "Edit", "Glob", "Grep", "Read", "TodoWrite", "Write"]
        );
    }
}
