//! Bonza CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive or single-message chat
//! - `config`: Validate, show, locate or initialize the config file

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "bonza",
    about = "Bonza — a terminal AI assistant with gated tool execution",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Pin the model for this session
        #[arg(long, env = "BONZA_CHAT_MODEL")]
        model: Option<String>,

        /// Wait for complete replies instead of streaming them
        #[arg(long)]
        no_stream: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate the configuration
    Validate,
    /// Print the effective configuration with secrets redacted
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with streamed replies.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            model,
            no_stream,
        } => commands::chat::run(message, model, no_stream).await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_flags() {
        let cli = Cli::try_parse_from(["bonza", "-v", "chat", "-m", "hi", "--no-stream"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Chat {
                message, no_stream, ..
            } => {
                assert_eq!(message.as_deref(), Some("hi"));
                assert!(no_stream);
            }
            Commands::Config { .. } => panic!("expected chat"),
        }
    }

    #[test]
    fn parses_config_subcommands() {
        let cli = Cli::try_parse_from(["bonza", "config", "init"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init
            }
        ));
    }
}
