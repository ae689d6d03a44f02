//! `bonza chat`: Interactive or single-message chat mode.

use std::io::{BufRead, Write};
use std::sync::Arc;

use bonza_agent::{AgentCore, FnApproval};
use bonza_config::AppConfig;
use bonza_core::{AgentEvent, Observers, TrustLevel};
use bonza_security::resolve_scope_dir;

/// A `/command` typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Exit,
    Help,
    NewChat,
    Stats,
    /// Show (`None`) or set the model
    Model(Option<String>),
    /// Show (`None`) or set the trust level
    Trust(Option<TrustLevel>),
    /// Activate the autonomy scope on a directory
    Auto(String),
    AutoOff,
    Unknown(String),
}

impl SlashCommand {
    /// Parse `line` if it starts with `/`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let command = match name {
            "exit" | "quit" => Self::Exit,
            "help" => Self::Help,
            "newchat" => Self::NewChat,
            "stats" => Self::Stats,
            "model" => Self::Model((!arg.is_empty()).then(|| arg.to_string())),
            "trust" if arg.is_empty() => Self::Trust(None),
            "trust" => match arg.parse() {
                Ok(level) => Self::Trust(Some(level)),
                Err(_) => Self::Unknown(line.to_string()),
            },
            "auto" if arg.eq_ignore_ascii_case("off") => Self::AutoOff,
            "auto" if !arg.is_empty() => Self::Auto(arg.to_string()),
            _ => Self::Unknown(line.to_string()),
        };
        Some(command)
    }
}

pub async fn run(
    message: Option<String>,
    model: Option<String>,
    no_stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early: give a clear error
    if !config.has_api_key() && config.providers.values().all(|p| p.api_key.is_none()) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export NVIDIA_API_KEY='nvapi-...'   (recommended)");
        eprintln!("    export BONZA_API_KEY='...'          (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let stream = config.streaming && !no_stream;
    let agent = AgentCore::from_config(&config, bonza_tools::default_registry());
    install_printer(agent.observers(), stream);
    agent.set_approval_handler(Arc::new(FnApproval::new(|_prompt| ask_approval())));

    if let Some(model) = model {
        agent.set_model(&model).await;
    }

    if let Some(msg) = message {
        // Single message mode
        let reply = agent.chat(&msg, stream).await?;
        print_reply(&reply, stream);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Bonza — Interactive Mode            ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Trust:     {}", agent.settings().trust_level());
    println!("  Tools:     {}", agent.stats().tools);
    println!();
    println!("  Type your message and press Enter. /help lists commands.");
    println!();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = read_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = SlashCommand::parse(line) {
            if command == SlashCommand::Exit {
                break;
            }
            handle_command(&agent, command).await;
            continue;
        }

        match agent.chat(line, stream).await {
            Ok(reply) => print_reply(&reply, stream),
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

async fn handle_command(agent: &AgentCore, command: SlashCommand) {
    match command {
        SlashCommand::Exit => {}
        SlashCommand::Help => {
            println!("  /newchat             start a fresh conversation");
            println!("  /model [name|auto]   show or pin the model");
            println!("  /trust [level]       cautious, balanced or autonomous");
            println!("  /auto <dir> | off    run commands inside <dir> without asking");
            println!("  /stats               session statistics");
            println!("  /exit                quit");
        }
        SlashCommand::NewChat => agent.new_chat().await,
        SlashCommand::Stats => match serde_json::to_string_pretty(&agent.stats()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("  [Error] {e}"),
        },
        SlashCommand::Model(Some(name)) => agent.set_model(&name).await,
        SlashCommand::Model(None) => {
            let current = agent.stats().model_override;
            println!("  Model: {}", current.as_deref().unwrap_or("auto"));
        }
        SlashCommand::Trust(Some(level)) => {
            agent.settings().set_trust_level(level);
            println!("  Trust level set to: {level}");
        }
        SlashCommand::Trust(None) => {
            println!("  Trust level: {}", agent.settings().trust_level());
        }
        SlashCommand::Auto(dir) => match resolve_scope_dir(&dir) {
            Ok(path) => {
                println!("  ⚡ Autonomy scope: {}", path.display());
                agent.settings().activate_scope(path);
            }
            Err(e) => eprintln!("  [Error] {e}"),
        },
        SlashCommand::AutoOff => {
            agent.settings().deactivate_scope();
            println!("  Autonomy scope off");
        }
        SlashCommand::Unknown(line) => eprintln!("  Unknown command: {line} (try /help)"),
    }
}

/// Print agent events as they happen. Streamed text goes to stdout; status
/// lines go to stderr.
fn install_printer(observers: &Observers, stream: bool) {
    observers.subscribe(move |event| match event {
        AgentEvent::Delta(text) if stream => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        AgentEvent::ToolStart(text)
        | AgentEvent::ToolResult(text)
        | AgentEvent::Info(text)
        | AgentEvent::Suggestion(text) => eprintln!("\n  {text}"),
        AgentEvent::ApprovalRequired(prompt) => println!("\n{prompt}"),
        _ => {}
    });
}

fn print_reply(reply: &str, streamed: bool) {
    if streamed {
        println!();
    } else {
        for line in reply.lines() {
            println!("  Bonza > {line}");
        }
    }
    println!();
}

async fn ask_approval() -> bool {
    print!("  Approve? [y/N] ");
    let _ = std::io::stdout().flush();
    match read_line().await {
        Ok(Some(answer)) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        _ => false,
    }
}

/// Read one line from stdin without blocking the runtime. `None` on EOF.
async fn read_line() -> std::io::Result<Option<String>> {
    tokio::task::spawn_blocking(|| -> std::io::Result<Option<String>> {
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        Ok((read > 0).then_some(line))
    })
    .await
    .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(SlashCommand::parse("hello /there"), None);
    }

    #[test]
    fn parses_session_commands() {
        assert_eq!(SlashCommand::parse("/exit"), Some(SlashCommand::Exit));
        assert_eq!(SlashCommand::parse("/quit"), Some(SlashCommand::Exit));
        assert_eq!(SlashCommand::parse(" /newchat "), Some(SlashCommand::NewChat));
        assert_eq!(SlashCommand::parse("/stats"), Some(SlashCommand::Stats));
        assert_eq!(SlashCommand::parse("/model"), Some(SlashCommand::Model(None)));
        assert_eq!(
            SlashCommand::parse("/model deepseek-chat"),
            Some(SlashCommand::Model(Some("deepseek-chat".into())))
        );
    }

    #[test]
    fn parses_trust_and_scope() {
        assert_eq!(
            SlashCommand::parse("/trust Autonomous"),
            Some(SlashCommand::Trust(Some(TrustLevel::Autonomous)))
        );
        assert_eq!(SlashCommand::parse("/trust"), Some(SlashCommand::Trust(None)));
        assert!(matches!(
            SlashCommand::parse("/trust reckless"),
            Some(SlashCommand::Unknown(_))
        ));
        assert_eq!(
            SlashCommand::parse("/auto ~/projects/app"),
            Some(SlashCommand::Auto("~/projects/app".into()))
        );
        assert_eq!(SlashCommand::parse("/auto OFF"), Some(SlashCommand::AutoOff));
        assert!(matches!(SlashCommand::parse("/auto"), Some(SlashCommand::Unknown(_))));
    }
}
