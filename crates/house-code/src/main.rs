//! Terminal coding agent powered by house-rs.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable. With a
//! prompt argument it runs one turn and prints the answer; without one it
//! reads requests line by line from stdin. Ctrl-C cancels the running turn
//! and keeps the session.
//!
//! # Examples
//!
//! ```sh
//! # Interactive mode
//! house-code --workdir /path/to/project
//!
//! # One-shot mode
//! house-code "Add error handling to src/main.rs"
//! ```

use std::path::PathBuf;

use clap::Parser;
use house_code::{CodeConfig, ProgressHandler};
use house_rs::agent::Toggle;
use house_rs::gc::{GcConfig, ModelClassifier};
use house_rs::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Terminal coding agent powered by house-rs.
#[derive(Parser)]
#[command(name = "house-code", version)]
struct Cli {
    /// Request to run once. Without this, starts an interactive session.
    prompt: Option<String>,

    /// Model to use for completions.
    #[arg(long, default_value = house_rs::DEFAULT_MODEL)]
    model: String,

    /// Working directory for file and shell tools.
    #[arg(long, default_value = ".")]
    workdir: String,

    /// Maximum model rounds per request.
    #[arg(long, default_value_t = 50)]
    max_rounds: u32,

    /// Maximum tokens per model response.
    #[arg(long, default_value_t = 8192)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Run a context GC pass every N model rounds (0 disables the round trigger).
    #[arg(long, default_value_t = 3)]
    gc_every: u32,

    /// Run a context GC pass once the context reaches this many estimated tokens.
    #[arg(long, default_value_t = 150_000)]
    gc_token_threshold: usize,

    /// Most recent turns the GC never touches.
    #[arg(long, default_value_t = 5)]
    gc_recent: u64,

    /// Disable context garbage collection.
    #[arg(long)]
    no_gc: bool,

    /// Let a model decide what the GC prunes instead of the built-in rules.
    #[arg(long)]
    model_gc: bool,

    /// Disable the Task tool and sub-agents.
    #[arg(long)]
    no_sub_agents: bool,

    /// Debug logging (overrides RUST_LOG).
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    fn to_config(&self) -> CodeConfig {
        let workdir = std::fs::canonicalize(&self.workdir)
            .unwrap_or_else(|_| PathBuf::from(&self.workdir));
        let gc = if self.no_gc {
            Toggle::disabled()
        } else {
            Toggle::enabled(
                GcConfig::default()
                    .with_every_rounds(self.gc_every)
                    .with_token_threshold(self.gc_token_threshold)
                    .with_recent_turns(self.gc_recent),
            )
        };
        CodeConfig {
            model: self.model.clone(),
            max_rounds: self.max_rounds,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            workdir,
            gc,
            model_gc: self.model_gc,
            sub_agents: !self.no_sub_agents,
            ..Default::default()
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("house_rs=debug,house_code=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Run one turn, cancelling it on Ctrl-C.
async fn run_turn(
    orchestrator: &mut Orchestrator<'_>,
    ctx: &mut ConversationContext,
    input: &str,
) -> Result<TurnOutcome, AgentError> {
    let token = CancellationToken::new();
    orchestrator.set_cancellation(token.clone());
    let turn = orchestrator.run_turn(ctx, input);
    tokio::pin!(turn);
    tokio::select! {
        result = &mut turn => result,
        _ = tokio::signal::ctrl_c() => {
            token.cancel();
            turn.await
        }
    }
}

fn print_outcome(result: Result<TurnOutcome, AgentError>) {
    match result {
        Ok(outcome) => {
            if let Some(answer) = outcome.response() {
                println!("{answer}");
            }
            info!(
                "Turn done: {} round(s), {} tokens, {} GC pass(es)",
                outcome.rounds_used,
                outcome.total_tokens(),
                outcome.gc_passes_applied
            );
        }
        Err(AgentError::Cancelled) => eprintln!("[cancelled]"),
        Err(e) => eprintln!("Error: {e}"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.to_config();

    let api_key = match std::env::var("OPENROUTER_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Error: OPENROUTER_KEY environment variable is not set");
            std::process::exit(1);
        }
    };
    let client = match OpenRouterClient::with_headers(
        api_key,
        "https://github.com/house-code/house-rs",
        "house-code",
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to create API client: {e}");
            std::process::exit(1);
        }
    };

    let tools = config.build_tool_set();
    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(ProgressHandler);

    let mut orchestrator = Orchestrator::new(&client, &tools, config.build_orchestrator_config())
        .with_event_handler(&handler);
    if let Some(classifier) = config.build_classifier_config() {
        orchestrator = orchestrator.with_classifier(ModelClassifier::new(&client, classifier));
    }
    if let Some(spawner) = config.build_spawner_config() {
        orchestrator = orchestrator.with_sub_agents(spawner);
    }
    info!(
        "house-code in {} with {} ({} tools)",
        config.workdir.display(),
        config.model,
        orchestrator.tool_definitions().len()
    );

    let mut ctx = ConversationContext::new();

    if let Some(prompt) = &cli.prompt {
        let result = run_turn(&mut orchestrator, &mut ctx, prompt).await;
        let failed = result.is_err();
        print_outcome(result);
        if failed {
            std::process::exit(1);
        }
        return;
    }

    eprintln!("house-code {}", env!("CARGO_PKG_VERSION"));
    eprintln!("Type 'exit' or 'quit' to stop. Ctrl-C cancels the running request.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {e}");
                break;
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
            break;
        }
        let result = run_turn(&mut orchestrator, &mut ctx, input).await;
        print_outcome(result);
        println!();
    }
}
