//! CLI commands
//!
//! Special commands that can be executed in the REPL.

use std::path::Path;

use crate::agent::{catalog, Assistant};
use crate::core::{AgentId, Attachment, Config, Result};

/// Result of parsing a command
pub enum CommandResult {
    /// Continue processing as normal input
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Exit the REPL
    Exit,
    /// Clear history
    Clear,
}

/// Commands accepted without a leading `/`, only when typed alone
const BARE_COMMANDS: [&str; 7] = ["exit", "quit", "q", "help", "?", "clear", "reset"];

/// Split a line into a command name and its arguments.
///
/// Returns `None` for ordinary prompts. Anything starting with `/` is a
/// command; a bare word only counts when it is the whole line, so a prompt
/// like "clear up my confusion" is sent to the model.
pub fn parse_command(input: &str) -> Option<(String, &str)> {
    let input = input.trim();
    let (head, args) = match input.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (input, ""),
    };

    match head.strip_prefix('/') {
        Some(name) => Some((name.to_lowercase(), args)),
        None => {
            let name = head.to_lowercase();
            (args.is_empty() && BARE_COMMANDS.contains(&name.as_str())).then_some((name, args))
        }
    }
}

/// Parse and handle special commands
pub async fn handle_command(input: &str, assistant: &Assistant, config: &Config) -> Result<CommandResult> {
    let Some((cmd, args)) = parse_command(input) else {
        return Ok(CommandResult::Continue(input.trim().to_string()));
    };

    match cmd.as_str() {
        "exit" | "quit" | "q" => Ok(CommandResult::Exit),

        "clear" | "reset" => {
            assistant.clear().await?;
            Ok(CommandResult::Clear)
        }

        "help" | "?" => Ok(CommandResult::Handled(help_text())),

        "agents" => {
            let active = assistant.active_agent().await;
            let manual = assistant.manual_agent().await;
            let mut output = String::from("Agents:\n");
            for profile in catalog::all() {
                let marker = if manual == Some(profile.id) {
                    "*"
                } else if active == profile.id {
                    ">"
                } else {
                    " "
                };
                output.push_str(&format!(
                    " {} {:<14} {:<12} {}\n",
                    marker, profile.id, profile.display_name, profile.description
                ));
            }
            output.push_str("\n(* fixed by you, > handled the last message)");
            Ok(CommandResult::Handled(output))
        }

        "agent" => handle_agent_command(args, assistant).await,

        "attach" => {
            if args.is_empty() {
                return Ok(CommandResult::Handled("Usage: /attach <path>".to_string()));
            }
            let attachment = load_attachment(Path::new(args)).await?;
            let summary = format!(
                "Attached {} ({}, {} bytes)",
                attachment.name, attachment.content_type, attachment.size_bytes
            );
            assistant.add_attachment(attachment).await;
            Ok(CommandResult::Handled(summary))
        }

        "detach" => {
            let removed = match args.parse::<usize>() {
                Ok(n) if n > 0 => assistant.remove_attachment(n - 1).await,
                _ => return Ok(CommandResult::Handled("Usage: /detach <n>".to_string())),
            };
            Ok(CommandResult::Handled(match removed {
                Some(attachment) => format!("Removed {}", attachment.name),
                None => format!("No attachment #{}", args),
            }))
        }

        "status" => {
            let store = assistant.store();
            let attachments = assistant.attachments().await;
            let pending = if attachments.is_empty() {
                "none".to_string()
            } else {
                attachments
                    .iter()
                    .enumerate()
                    .map(|(i, a)| format!("{}. {}", i + 1, a.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let status = format!(
                "Switchboard Status:\n\
                 ─────────────────────────────\n\
                 Model:        {}\n\
                 Router model: {}\n\
                 Agent:        {}\n\
                 Routing:      {}\n\
                 History:      {} turns\n\
                 Attachments:  {}\n\
                 Debug:        {}",
                config.gemini.model,
                config.gemini.router_model,
                assistant.active_agent().await,
                match assistant.manual_agent().await {
                    Some(id) => format!("fixed ({})", id),
                    None => "automatic".to_string(),
                },
                store.len().await,
                pending,
                if config.agent.debug { "on" } else { "off" }
            );
            Ok(CommandResult::Handled(status))
        }

        _ => Ok(CommandResult::Handled(format!(
            "Unknown command: /{}. Type /help for available commands.",
            cmd
        ))),
    }
}

/// Handle 'agent' subcommands
async fn handle_agent_command(args: &str, assistant: &Assistant) -> Result<CommandResult> {
    if args.is_empty() {
        let message = match assistant.manual_agent().await {
            Some(id) => format!("Agent fixed to {}. Use '/agent auto' to route automatically.", id),
            None => format!(
                "Routing automatically (last agent: {}). Use '/agent <id>' to fix one.",
                assistant.active_agent().await
            ),
        };
        return Ok(CommandResult::Handled(message));
    }

    if args.eq_ignore_ascii_case("auto") {
        assistant.set_agent(None).await;
        return Ok(CommandResult::Handled("Routing automatically.".to_string()));
    }

    match args.parse::<AgentId>() {
        Ok(id) => {
            assistant.set_agent(Some(id)).await;
            Ok(CommandResult::Handled(format!(
                "Agent fixed to {} ({}).",
                id,
                catalog::get(id).display_name
            )))
        }
        Err(e) => Ok(CommandResult::Handled(format!(
            "{}. Available: {}, auto",
            e,
            AgentId::ALL.map(|id| id.as_str()).join(", ")
        ))),
    }
}

/// Read a file into an attachment
pub async fn load_attachment(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Attachment::from_bytes(name, guess_mime(path), bytes))
}

/// MIME type from a file extension
pub fn guess_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "txt" | "log" | "toml" | "yaml" | "yml" | "rs" | "py" | "js" | "ts" | "go" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Generate help text
fn help_text() -> String {
    r#"Switchboard Commands:
─────────────────────────────────────────────
  /help, /?          Show this help message
  /exit, /quit, /q   Exit Switchboard
  /clear, /reset     Clear the conversation
  /status            Show current configuration
  /agents            List agents
  /agent <id|auto>   Fix an agent, or route automatically
  /attach <path>     Attach a file to the next message
  /detach <n>        Remove a pending attachment

  exit, help and clear also work without the slash when typed alone.

Keyboard Shortcuts:
  Ctrl+C           Stop the current response
  Ctrl+D           Exit Switchboard

Tips:
  - Each message is routed to the agent best suited for it
  - Images are sent inline, text files are quoted
─────────────────────────────────────────────"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AttachmentPayload;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("notes.md")), "text/markdown");
        assert_eq!(guess_mime(Path::new("Makefile")), "application/octet-stream");
    }

    #[test]
    fn test_help_lists_commands() {
        let help = help_text();
        for command in ["/agents", "/agent <id|auto>", "/attach", "/detach", "/status"] {
            assert!(help.contains(command), "missing {}", command);
        }
    }

    #[test]
    fn test_parse_command_requires_slash_for_arguments() {
        assert_eq!(parse_command("/agent coder"), Some(("agent".to_string(), "coder")));
        assert_eq!(parse_command("  /ATTACH  notes.txt "), Some(("attach".to_string(), "notes.txt")));
        assert_eq!(parse_command("clear"), Some(("clear".to_string(), "")));
        assert_eq!(parse_command("/status"), Some(("status".to_string(), "")));
    }

    #[test]
    fn test_prompts_starting_with_command_words_are_not_commands() {
        assert_eq!(parse_command("clear up my confusion about leasing"), None);
        assert_eq!(parse_command("agent of change, explain"), None);
        assert_eq!(parse_command("status of my order?"), None);
        assert_eq!(parse_command("agents"), None);
        assert_eq!(parse_command("help me compare two cars"), None);
    }

    #[tokio::test]
    async fn test_load_attachment_reads_text() {
        let path = std::env::temp_dir().join(format!("switchboard-{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "hello").await.unwrap();

        let attachment = load_attachment(&path).await.unwrap();
        assert_eq!(attachment.content_type, "text/plain");
        assert_eq!(attachment.payload, AttachmentPayload::Text("hello".to_string()));
        assert_eq!(attachment.size_bytes, 5);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
