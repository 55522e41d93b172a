//! Switchboard - multi-agent chat assistant
//!
//! Main entry point for the CLI application.

use clap::Parser;
use std::path::PathBuf;
use switchboard::cli::commands::load_attachment;
use switchboard::{AgentId, Config, Repl};
use tracing_subscriber::EnvFilter;

/// Switchboard - routes each message to the best-suited agent
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Fix the agent instead of routing automatically
    #[arg(long, short = 'a')]
    agent: Option<AgentId>,

    /// Model for agent sessions
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Model for routing classification
    #[arg(long)]
    router_model: Option<String>,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,

    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,

    /// Attach a file to the prompt (repeatable)
    #[arg(long)]
    attach: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Build configuration
    let mut config = Config::load();

    // Apply CLI overrides
    if let Some(agent) = args.agent {
        config.agent.manual_agent = Some(agent);
    }

    if let Some(ref model) = args.model {
        config.gemini.model = model.clone();
    }

    if let Some(ref router_model) = args.router_model {
        config.gemini.router_model = router_model.clone();
    }

    if args.debug {
        config.agent.debug = true;
    }

    init_logging(config.agent.debug);

    let mut repl = Repl::with_config(config).await?;

    for path in &args.attach {
        let attachment = load_attachment(path).await?;
        repl.assistant().add_attachment(attachment).await;
    }

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        repl.send(&prompt).await?;
        return Ok(());
    }

    // Interactive REPL mode
    repl.run().await?;

    Ok(())
}

/// Logs go to stderr; `RUST_LOG` overrides the default filter
fn init_logging(debug: bool) {
    let default_filter = if debug {
        "switchboard=debug,warn"
    } else {
        "switchboard=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
