use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabiwa_assistant::config::{Config, WebSearchVariant};
use tabiwa_assistant::transport::cli as commands;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tabiwa")]
#[command(author, version = concat!(env!("CARGO_PKG_VERSION"), env!("TABIWA_VERSION_SUFFIX")), about = "Tabiwa - travel pass chat assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP chat server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Model provider (gemini, scripted)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Interactive chat in the terminal
    Chat {
        /// Server to talk to, e.g. http://127.0.0.1:8787 (default: in-process agent)
        #[arg(short, long)]
        url: Option<String>,

        /// Model provider for the in-process agent (gemini, scripted)
        #[arg(long)]
        provider: Option<String>,

        /// Write the conversation as HTML on exit
        #[arg(short, long)]
        transcript: Option<PathBuf>,
    },

    /// Search the travel pass catalog
    Search {
        /// Substring to look for; empty lists every pass
        #[arg(default_value = "")]
        query: String,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Run the web search tool once
    WebSearch {
        query: String,

        /// Override the configured page variant
        #[arg(long, value_enum)]
        variant: Option<WebSearchVariant>,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "tabiwa_assistant=debug,tabiwa=debug,tower_http=debug"
    } else {
        "tabiwa_assistant=info,tabiwa=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            provider,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(provider) = provider {
                config.llm.provider = provider;
            }
            commands::run_serve(config).await?;
        }
        Commands::Chat {
            url,
            provider,
            transcript,
        } => {
            if let Some(provider) = provider {
                config.llm.provider = provider;
            }
            commands::run_chat(config, url, transcript).await?;
        }
        Commands::Search { query, format } => {
            commands::run_search(&config, &query, &format)?;
        }
        Commands::WebSearch { query, variant } => {
            commands::run_web_search(&config, &query, variant).await?;
        }
        Commands::Config => {
            commands::run_show_config(&config, &config_path)?;
        }
    }

    Ok(())
}
