//! Minimal session: the coding tools, two turns, one context.
//!
//! The second turn sees everything the first one did, including the files
//! it read, so the model can edit them without reading them again.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example basic_agent
//! ```

use house_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Create the OpenRouter client.
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let client = OpenRouterClient::new(api_key)?;

    // 2. Register the coding tools, rooted at the current directory.
    let tools = ToolSet::new().with_coding_tools(std::env::current_dir()?);

    // 3. Configure the orchestrator. GC runs with the rule classifier.
    let config = OrchestratorConfig::new(DEFAULT_MODEL, "You are a helpful coding assistant. Be concise.")
        .with_max_rounds(10)
        .with_max_tokens(4096)
        .with_gc(GcConfig::default().with_every_rounds(4));

    let mut orchestrator = Orchestrator::new(&client, &tools, config).with_event_handler(&LoggingHandler);
    let mut ctx = ConversationContext::new();

    // 4. Run two turns against the same context.
    for request in [
        "Find the Cargo.toml files in this directory and summarize what the project does.",
        "Which of those crates has the most dependencies?",
    ] {
        let outcome = orchestrator.run_turn(&mut ctx, request).await?;
        println!("\n{}", outcome.response().unwrap_or("(no answer)"));
        println!(
            "--- {} rounds | {} tokens | {} messages in context ---",
            outcome.rounds_used,
            outcome.total_tokens(),
            ctx.len()
        );
    }

    Ok(())
}
