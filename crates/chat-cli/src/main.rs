use std::path::PathBuf;

use anyhow::Result;
use chat_agent::Config;
use clap::{Parser, Subcommand};

mod commands;
mod logging;
mod render;

use commands::ask::handle_ask;
use commands::models::handle_models;
use commands::session::handle_session;
use commands::tools::handle_tools;
use logging::setup_logging;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "Path to the config file",
        long_help = "Path to the YAML config file. Defaults to ~/.config/chat-agent/config.yaml."
    )]
    config: Option<PathBuf>,

    /// Model to use (overrides config)
    #[arg(
        short,
        long,
        global = true,
        help = "Model to use (e.g., 'openai/gpt-4o-mini', 'qwen2.5-7b-instruct')"
    )]
    model: Option<String>,

    /// Host to use (overrides config)
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "OpenAI-compatible API base URL (e.g., 'http://localhost:8000/v1')"
    )]
    host: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a single question, using the configured tool servers
    #[command(about = "Answer a single question, using the configured tool servers")]
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// Start an interactive chat
    #[command(about = "Start an interactive chat", alias = "s")]
    Session,

    /// Connect to the tool servers and list what they offer
    #[command(about = "Connect to the tool servers and list what they offer")]
    Tools,

    /// List the models available on the host
    #[command(about = "List the models available on the host")]
    Models {
        /// Only check that the host answers on /health
        #[arg(long)]
        health: bool,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.provider.model = model.clone();
    }
    if let Some(host) = &cli.host {
        config.provider.host = host.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let config = load_config(&cli)?;

    match cli.command {
        Command::Ask { prompt } => handle_ask(&config, prompt.join(" ")).await,
        Command::Session => handle_session(&config).await,
        Command::Tools => handle_tools(&config).await,
        Command::Models { health } => handle_models(&config, health).await,
    }
}
