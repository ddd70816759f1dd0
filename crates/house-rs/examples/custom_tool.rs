//! Custom tool example: a typed tool next to the coding tools, model-based
//! GC, and a closure event handler.
//!
//! Demonstrates:
//! - Typed argument structs with `Deserialize` + `JsonSchema`
//! - Rich tool descriptions via `ToolSpec::builder()`
//! - A [`ModelClassifier`] deciding what the GC prunes
//! - Event handling with `CompositeEventHandler`
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example custom_tool
//! ```

use house_rs::gc::ModelClassifierConfig;
use house_rs::prelude::*;
use house_rs::schemars;
use schemars::JsonSchema;
use serde::Deserialize;

/// Arguments for the `word_count` tool.
#[derive(Deserialize, JsonSchema)]
struct WordCountArgs {
    /// Text to count words in.
    text: String,
}

struct WordCountTool;

impl Tool for WordCountTool {
    fn definition(&self) -> ToolDef {
        ToolSpec::builder("word_count")
            .purpose("Count the words in a piece of text")
            .when_to_use("When the user asks how long a text is")
            .when_not_to_use("For files on disk: use Bash with `wc -w` instead")
            .parameters_for::<WordCountArgs>()
            .example("word_count(text='a b c')", "3 words")
            .build()
            .to_tool_def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<WordCountArgs>("word_count", arguments);
        Box::pin(async move {
            let args = parsed?;
            Ok(ToolOutput::text(format!("{} words", args.text.split_whitespace().count())))
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let client = OpenRouterClient::new(api_key)?;

    let tools = ToolSet::new()
        .with_coding_tools(std::env::current_dir()?)
        .with(WordCountTool);

    // Log everything, and echo tool results to stderr.
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(FnEventHandler::new(|event| {
            if let AgentEvent::ToolResult { name, result, .. } = event {
                eprintln!("[callback] {name} -> {} bytes", result.len());
            }
        }));

    let config = OrchestratorConfig::new(DEFAULT_MODEL, "You are a helpful writing assistant.")
        .with_max_rounds(10)
        .with_gc(GcConfig::default().with_every_rounds(2));

    let classifier = ModelClassifier::new(&client, ModelClassifierConfig::default());
    let mut orchestrator = Orchestrator::new(&client, &tools, config)
        .with_event_handler(&handler)
        .with_classifier(classifier)
        .with_sub_agents(SpawnerConfig::default());

    let mut ctx = ConversationContext::new();
    let outcome = orchestrator
        .run_turn(&mut ctx, "How many words are in the README, if there is one?")
        .await?;

    println!("\n{}", outcome.text());
    println!("--- {} rounds | {} tokens ---", outcome.rounds_used, outcome.total_tokens());
    Ok(())
}
