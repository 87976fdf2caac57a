//! parley - terminal client for streaming conversations
//!
//! ## Usage
//!
//! ```bash
//! # Start a new conversation and stream the reply
//! parley send "Where is my order?"
//!
//! # Continue an existing one, with an uploaded file
//! parley send --conversation c-42 --attach upload.json "And this invoice?"
//!
//! # Hand the conversation to a human
//! parley handoff request c-42 --reason "billing dispute"
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "parley", version, about = "Streaming conversation client")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message and stream the reply to stdout
    Send {
        /// Existing conversation; a new one is started when omitted
        #[arg(long)]
        conversation: Option<String>,

        /// JSON file holding one attachment record or an array of them
        #[arg(long = "attach", value_name = "FILE")]
        attachments: Vec<PathBuf>,

        /// Let the server assign the conversation id from the stream
        #[arg(long)]
        deferred: bool,

        message: String,
    },
    /// Print the stored messages of a conversation
    History { conversation: String },
    /// Human handoff
    #[command(subcommand)]
    Handoff(HandoffCommand),
    /// Store a session token
    Login { token: String },
    /// Forget the stored session token
    Logout,
}

#[derive(Subcommand)]
enum HandoffCommand {
    Request {
        conversation: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Resolve {
        conversation: String,
    },
    Status {
        conversation: String,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let config = parley_core::ConsoleConfig::load(cli.config.as_deref())?;
    let session = commands::Session::new(config);

    match cli.command {
        Command::Send {
            conversation,
            attachments,
            deferred,
            message,
        } => {
            session
                .send(conversation.as_deref(), &message, &attachments, deferred)
                .await
        }
        Command::History { conversation } => session.history(&conversation).await,
        Command::Handoff(HandoffCommand::Request {
            conversation,
            reason,
        }) => {
            session
                .request_handoff(&conversation, reason.as_deref())
                .await
        }
        Command::Handoff(HandoffCommand::Resolve { conversation }) => {
            session.resolve_handoff(&conversation).await
        }
        Command::Handoff(HandoffCommand::Status { conversation }) => {
            session.handoff_status(&conversation).await
        }
        Command::Login { token } => session.login(&token).await,
        Command::Logout => session.logout().await,
    }
}
