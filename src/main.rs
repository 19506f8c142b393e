#![warn(clippy::all, clippy::pedantic)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use swarmchat::agents::{create_registry, AgentRole};
use swarmchat::config::Config;
use swarmchat::persistence::create_persistence;
use swarmchat::providers::list_providers;
use swarmchat::security::redact;
use swarmchat::sessions::{create_session_manager, spawn_idle_sweeper, SessionManager};

/// `SwarmChat` - a moderator and a room full of specialists.
#[derive(Parser, Debug)]
#[command(name = "swarmchat")]
#[command(version)]
#[command(about = "Multi-agent chat with moderator/specialist handoff.", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat as a user
    #[command(long_about = "\
Chat as a user.

Resumes the user's live session or starts a new one with the moderator's \
greeting. Mention a directive such as /mencken to bring in a specialist and \
/transfer_back to return to the moderator.

Interactive commands: /history, /agent, /logout, /quit.

Examples:
  swarmchat chat --user alice
  swarmchat chat --user alice -m \"hello /mencken\"")]
    Chat {
        /// Username to chat as
        #[arg(short, long)]
        user: String,

        /// Single message mode (don't enter interactive mode)
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List agent personas and their directives
    Agents,

    /// Show configuration summary
    Status,

    /// Show persisted history for a user
    History {
        #[arg(short, long)]
        user: String,

        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("SWARMCHAT_CONFIG_DIR", config_dir);
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::load_or_init().await?;

    match cli.command {
        Commands::Chat { user, message } => run_chat(&config, &user, message).await,
        Commands::Agents => print_agents(&config),
        Commands::Status => {
            print_status(&config);
            Ok(())
        }
        Commands::History { user, limit } => print_history(&config, &user, limit).await,
    }
}

async fn run_chat(config: &Config, user: &str, message: Option<String>) -> Result<()> {
    let user = user.trim();
    if user.is_empty() {
        bail!("--user cannot be empty");
    }

    let manager = create_session_manager(config)?;
    let sweeper = config.sessions.idle_timeout().map(|max_idle| {
        spawn_idle_sweeper(manager.clone(), config.sessions.sweep_interval(), max_idle)
    });

    let start = manager.resume_or_create(user).await;

    if let Some(message) = message {
        let reply = manager.process_turn(&start.token, &message).await?;
        let agent = manager.active_agent(&start.token).await?;
        println!("{agent}: {reply}");
        return Ok(());
    }

    let moderator = manager.registry().moderator().name.clone();
    println!("{moderator}: {}", start.greeting);
    let result = chat_loop(&manager, &start.token).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    result
}

async fn chat_loop(manager: &SessionManager, token: &str) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/history" => {
                for message in manager.history(token).await? {
                    println!("[{}] {}", message.role.as_str(), message.content);
                }
            }
            "/agent" => println!("{}", manager.active_agent(token).await?),
            "/logout" => {
                manager.invalidate(token).await?;
                println!("Logged out.");
                return Ok(());
            }
            text => match manager.process_turn(token, text).await {
                Ok(reply) => {
                    let agent = manager.active_agent(token).await?;
                    println!("{agent}: {reply}");
                }
                Err(e) if e.is_retryable() => eprintln!("⚠️  {e} (send again to retry)"),
                Err(e) => return Err(e.into()),
            },
        }
        prompt()?;
    }

    Ok(())
}

fn prompt() -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "> ")?;
    stdout.flush()?;
    Ok(())
}

fn print_agents(config: &Config) -> Result<()> {
    let registry = create_registry(&config.agents)?;
    println!("Agents ({} total):\n", registry.len());
    println!("  {:<26} {:<11} {:<28} MODEL", "NAME", "ROLE", "DIRECTIVES");
    for (_, agent) in registry.iter() {
        let role = match agent.role {
            AgentRole::Moderator => "moderator",
            AgentRole::Specialist => "specialist",
        };
        println!(
            "  {:<26} {:<11} {:<28} {}",
            agent.name,
            role,
            agent.directives.join(", "),
            agent.model
        );
    }
    Ok(())
}

fn print_status(config: &Config) {
    println!("SwarmChat Status");
    println!();
    println!("Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("Config:      {}", config.config_path.display());
    println!();

    let active = config.provider.name.trim().to_ascii_lowercase();
    let provider = list_providers()
        .into_iter()
        .find(|p| p.name == active)
        .map(|p| p.display_name)
        .unwrap_or("unknown");
    println!("Provider:    {} ({provider})", config.provider.name);
    println!(
        "  API URL:   {}",
        config.provider.api_url.as_deref().unwrap_or("(default)")
    );
    println!(
        "  API key:   {}",
        config
            .provider
            .api_key
            .as_deref()
            .map(redact)
            .unwrap_or_else(|| "(from environment)".to_string())
    );
    println!("  Model:     {}", config.agents.model);
    println!();

    println!("Sessions:");
    println!("  Logout policy:      {}", config.sessions.logout_policy);
    println!("  Directive matching: {:?}", config.sessions.directive_matching);
    println!(
        "  Auto handoff:       {}",
        if config.sessions.auto_handoff { "on" } else { "off" }
    );
    println!(
        "  Idle timeout:       {}",
        config
            .sessions
            .idle_timeout_secs
            .map_or_else(|| "never".to_string(), |s| format!("{s}s"))
    );
    println!();

    println!("Persistence: {}", config.persistence.backend);
    if config.persistence.backend.eq_ignore_ascii_case("sqlite") {
        println!("  Database:  {}", config.database_path().display());
    }
}

async fn print_history(config: &Config, user: &str, limit: usize) -> Result<()> {
    let persistence = create_persistence(&config.persistence, &config.database_path())?;
    let history = persistence
        .load_history(user.trim(), limit)
        .await
        .with_context(|| format!("Failed to load history for {user}"))?;

    if history.is_empty() {
        println!("No history for {user}.");
        return Ok(());
    }
    for message in history {
        println!("[{}] {}", message.role.as_str(), message.content);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_cli_parses_user_and_message() {
        let cli = Cli::try_parse_from(["swarmchat", "chat", "--user", "alice", "-m", "hi /mencken"])
            .expect("chat invocation should parse");
        match cli.command {
            Commands::Chat { user, message } => {
                assert_eq!(user, "alice");
                assert_eq!(message.as_deref(), Some("hi /mencken"));
            }
            other => panic!("expected chat command, got {other:?}"),
        }
    }

    #[test]
    fn history_limit_defaults_to_twenty() {
        let cli = Cli::try_parse_from(["swarmchat", "history", "-u", "bob"]).unwrap();
        match cli.command {
            Commands::History { user, limit } => {
                assert_eq!(user, "bob");
                assert_eq!(limit, 20);
            }
            other => panic!("expected history command, got {other:?}"),
        }
    }

    #[test]
    fn config_dir_is_global() {
        let cli = Cli::try_parse_from(["swarmchat", "status", "--config-dir", "/tmp/sc"]).unwrap();
        assert_eq!(cli.config_dir.as_deref(), Some("/tmp/sc"));
        assert!(matches!(cli.command, Commands::Status));
    }
}
