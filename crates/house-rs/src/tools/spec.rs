//! Structured tool descriptions.
//!
//! A [`ToolSpec`] turns purpose, usage guidance, examples and output format
//! into the description string the model reads, so every tool describes
//! itself the same way.

use crate::ToolDef;
use std::fmt::Write as _;

/// Structured description of one tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    /// One imperative sentence: "Search file contents by regex".
    pub purpose: String,
    pub when_to_use: String,
    /// Steers the model away from the wrong tool for the job.
    pub when_not_to_use: String,
    pub parameters: serde_json::Value,
    /// `(call, behaviour)` pairs.
    pub examples: Vec<(String, String)>,
    pub output_format: String,
}

impl ToolSpec {
    pub fn builder(name: impl Into<String>) -> ToolSpecBuilder {
        ToolSpecBuilder {
            name: name.into(),
            purpose: None,
            when_to_use: None,
            when_not_to_use: None,
            parameters: None,
            examples: Vec::new(),
            output_format: None,
        }
    }

    /// Render the description sent to the model.
    pub fn to_description(&self) -> String {
        let mut desc = format!("{}.", self.purpose);
        let _ = write!(desc, "\nWhen to use: {}", self.when_to_use);
        let _ = write!(desc, "\nWhen NOT to use: {}", self.when_not_to_use);
        if !self.examples.is_empty() {
            desc.push_str("\nExamples:");
            for (call, behaviour) in &self.examples {
                let _ = write!(desc, "\n  - {call} → {behaviour}");
            }
        }
        if !self.output_format.is_empty() {
            let _ = write!(desc, "\nOutput format: {}", self.output_format);
        }
        desc
    }

    pub fn to_tool_def(&self) -> ToolDef {
        ToolDef::new(self.name.clone(), self.to_description(), self.parameters.clone())
    }
}

/// Builder for [`ToolSpec`]. `build()` panics when a required field is
/// missing, which surfaces at tool registration.
pub struct ToolSpecBuilder {
    name: String,
    purpose: Option<String>,
    when_to_use: Option<String>,
    when_not_to_use: Option<String>,
    parameters: Option<serde_json::Value>,
    examples: Vec<(String, String)>,
    output_format: Option<String>,
}

impl ToolSpecBuilder {
    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn when_to_use(mut self, when: impl Into<String>) -> Self {
        self.when_to_use = Some(when.into());
        self
    }

    pub fn when_not_to_use(mut self, when_not: impl Into<String>) -> Self {
        self.when_not_to_use = Some(when_not.into());
        self
    }

    /// Derive the parameter schema from the typed argument struct.
    pub fn parameters_for<T: schemars::JsonSchema>(mut self) -> Self {
        self.parameters = Some(crate::json_schema_for::<T>());
        self
    }

    pub fn example(mut self, call: impl Into<String>, behaviour: impl Into<String>) -> Self {
        self.examples.push((call.into(), behaviour.into()));
        self
    }

    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = Some(format.into());
        self
    }

    pub fn build(self) -> ToolSpec {
        ToolSpec {
            name: self.name,
            purpose: self.purpose.expect("ToolSpec requires 'purpose'"),
            when_to_use: self.when_to_use.expect("ToolSpec requires 'when_to_use'"),
            when_not_to_use: self
                .when_not_to_use
                .expect("ToolSpec requires 'when_not_to_use'"),
            parameters: self.parameters.expect("ToolSpec requires 'parameters'"),
            examples: self.examples,
            output_format: self.output_format.unwrap_or_else(|| "Plain text".into()),
        }
    }

    /// Build and convert to a [`ToolDef`] in one step.
    pub fn to_tool_def(self) -> ToolDef {
        self.build().to_tool_def()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Args {
        #[allow(dead_code)]
        pattern: String,
    }

    #[test]
    fn description_lists_guidance_and_examples() {
        let def = ToolSpec::builder("Glob")
            .purpose("Find files by glob pattern")
            .when_to_use("When you know roughly what a file is called")
            .when_not_to_use("When searching file contents, use Grep")
            .parameters_for::<Args>()
            .example("Glob(pattern='**/*.rs')", "Rust files, newest first")
            .to_tool_def();

        assert_eq!(def.function.name, "Glob");
        let desc = &def.function.description;
        assert!(desc.starts_with("Find files by glob pattern."));
        assert!(desc.contains("When NOT to use: When searching file contents, use Grep"));
        assert!(desc.contains("Glob(pattern='**/*.rs') → Rust files"));
        assert!(desc.ends_with("Output format: Plain text"));
        assert_eq!(def.function.parameters["required"][0], "pattern");
    }

    #[test]
    #[should_panic(expected = "ToolSpec requires 'purpose'")]
    fn missing_purpose_panics() {
        ToolSpec::builder("incomplete")
            .when_to_use("x")
            .when_not_to_use("y")
            .parameters_for::<Args>()
            .build();
    }
}
