use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use guild_chat::{ChatSession, MemoryTransport};
use tracing::info;
use tracing_subscriber::prelude::*;

mod config;
mod script;

#[derive(Parser)]
#[command(name = "guild-chat")]
#[command(about = "Drive the guild chat state engine from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML); GUILD_CHAT_* env vars override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON-lines script against an in-memory transport
    Simulate(SimulateArgs),
    /// Print the resolved configuration
    Config,
}

#[derive(clap::Args)]
struct SimulateArgs {
    /// Script file, one step per line
    script: PathBuf,

    /// Only print the snapshot after the last step
    #[arg(long)]
    final_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging (stderr, so snapshots on stdout stay machine-readable)
    let default_directive = if cli.debug {
        "guild_chat=debug,guild_chat_cli=debug,info"
    } else {
        "guild_chat=info,guild_chat_cli=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let chat_config = config::resolve(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Config => {
            let rendered =
                toml::to_string_pretty(&chat_config).context("Failed to render config")?;
            print!("{rendered}");
            Ok(())
        }
        Commands::Simulate(args) => {
            let steps = script::load(&args.script)?;
            info!(steps = steps.len(), "running script");

            let transport = MemoryTransport::new();
            let session = ChatSession::start(&chat_config, transport.clone());
            let chat = session.handle();

            let subscription = (!args.final_only).then(|| {
                chat.subscribe(|snapshot| {
                    if let Err(e) = script::print_snapshot(&snapshot) {
                        tracing::warn!("failed to print snapshot: {}", e);
                    }
                })
            });

            let outcome = script::run(steps, &chat, &transport).await;
            drop(subscription);
            if args.final_only {
                script::print_snapshot(&chat.snapshot())?;
            }
            session.shutdown().await;
            outcome
        }
    }
}
