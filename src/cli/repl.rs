//! Interactive REPL for Switchboard
//!
//! Provides the main user interaction loop. Replies are rendered from the
//! conversation store's events, so text shows up as it streams.

use futures::{FutureExt, StreamExt};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::agent::{catalog, Assistant, ConversationStore, StoreEvent, TurnEngine, TurnOutcome, TurnPhase};
use crate::cli::commands::{handle_command, CommandResult};
use crate::core::{Config, Result, Role};
use crate::llm::create_provider;
use crate::tools::ToolRegistry;

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    assistant: Assistant,
    config: Config,
}

impl Repl {
    /// Create a REPL with custom configuration
    pub async fn with_config(config: Config) -> Result<Self> {
        let provider = create_provider(&config)?;
        let tools = Arc::new(ToolRegistry::with_builtin(&config)?);
        let store = ConversationStore::new(config.agent.default_agent);
        if let Some(agent) = config.agent.manual_agent {
            store.set_manual_agent(Some(agent)).await;
        }

        let engine = TurnEngine::new(provider, tools, store, &config);
        Ok(Self {
            assistant: Assistant::new(engine),
            config,
        })
    }

    /// The chat handle driven by this REPL
    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    /// Run the REPL
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("You: ");
            stdout.flush()?;

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();

            // a bare Enter still sends pending attachments
            if input.is_empty() && self.assistant.attachments().await.is_empty() {
                continue;
            }

            match handle_command(input, &self.assistant, &self.config).await {
                Ok(CommandResult::Exit) => {
                    println!("\nGoodbye!");
                    break;
                }
                Ok(CommandResult::Clear) => {
                    println!("Conversation cleared.\n");
                }
                Ok(CommandResult::Handled(output)) => {
                    println!("{}\n", output);
                }
                Ok(CommandResult::Continue(input)) => {
                    if let Err(e) = self.send(&input).await {
                        eprintln!("\nError: {}\n", e);
                    }
                }
                Err(e) => {
                    eprintln!("Command error: {}\n", e);
                }
            }
        }

        Ok(())
    }

    /// Submit one message and render the reply
    pub async fn send(&self, input: &str) -> Result<TurnOutcome> {
        let mut renderer = Renderer::new(self.config.streaming.print_tokens);
        let mut events = BroadcastStream::new(self.assistant.store().subscribe());

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let submit = self.assistant.submit_with_cancel(input, cancel);
        tokio::pin!(submit);

        let outcome = loop {
            tokio::select! {
                outcome = &mut submit => break outcome,
                Some(event) = events.next() => renderer.handle(event),
            }
        };
        watcher.abort();

        // events published right before the turn returned
        while let Some(Some(event)) = events.next().now_or_never() {
            renderer.handle(event);
        }

        let outcome = outcome?;
        if !self.config.streaming.print_tokens {
            if let Some(turn) = self.assistant.store().get(&outcome.turn_id).await {
                println!("{}", turn.content);
            }
        }
        if outcome.cancelled {
            println!("(stopped)");
        }
        if outcome.phase == TurnPhase::Errored && self.config.agent.debug {
            if let Some(ref error) = outcome.error {
                eprintln!("[debug] {}", error);
            }
        }
        println!();

        Ok(outcome)
    }

    /// Print the startup banner
    fn print_banner(&self) {
        println!(
            r#"
╔═══════════════════════════════════════════╗
║                                           ║
║   SWITCHBOARD                             ║
║   Multi-agent chat assistant              ║
║                                           ║
╚═══════════════════════════════════════════╝
"#
        );
        println!("Model:        {}", self.config.gemini.model);
        println!("Router model: {}", self.config.gemini.router_model);
        println!(
            "Agents:       {}",
            catalog::all()
                .iter()
                .map(|p| p.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!();
        println!("Commands: /help, /agents, /agent, /attach, /status, /clear, /exit");
        println!("───────────────────────────────────────────────");
    }
}

/// Turns store events into terminal output
struct Renderer {
    print_tokens: bool,
}

impl Renderer {
    fn new(print_tokens: bool) -> Self {
        Self { print_tokens }
    }

    fn handle(&mut self, event: std::result::Result<StoreEvent, BroadcastStreamRecvError>) {
        let event = match event {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "renderer fell behind, some fragments were not shown");
                return;
            }
        };

        match event {
            StoreEvent::Appended(turn) if turn.role == Role::Model => {
                let name = turn
                    .agent_id
                    .map(|id| catalog::get(id).display_name)
                    .unwrap_or("Assistant");
                println!("\n{}:", name);
            }
            StoreEvent::TextAppended { delta, .. } if self.print_tokens => {
                print!("{}", delta);
                let _ = io::stdout().flush();
            }
            StoreEvent::Finalized { .. } if self.print_tokens => {
                println!();
            }
            _ => {}
        }
    }
}
