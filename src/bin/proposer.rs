//! Proposer binary

use clap::{Parser, Subcommand};
use minicas::common::{config::Config, parse_duration};
use minicas::ProposerServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minicas-proposer")]
#[command(about = "minicas CASPaxos proposer")]
#[command(version = minicas::BUILD_INFO)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start proposer server
    Serve {
        /// Ballot tie-breaker (random when omitted)
        #[arg(long)]
        id: Option<u64>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Preparer endpoints (comma-separated)
        #[arg(long, value_delimiter = ',')]
        preparers: Vec<String>,

        /// Accepter endpoints (comma-separated)
        #[arg(long, value_delimiter = ',')]
        accepters: Vec<String>,

        /// Phase deadline, e.g. 500ms or 2s
        #[arg(long, value_parser = parse_duration)]
        round_timeout: Option<Duration>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve {
            id,
            bind,
            preparers,
            accepters,
            round_timeout,
        } => {
            // CLI arguments win over file and environment
            let mut proposer = config.proposer;
            if id.is_some() {
                proposer.proposer_id = id;
            }
            if let Some(bind) = bind {
                proposer.bind_addr = bind;
            }
            if !preparers.is_empty() {
                proposer.preparers = preparers;
            }
            if !accepters.is_empty() {
                proposer.accepters = accepters;
            }
            if let Some(timeout) = round_timeout {
                proposer.round_timeout_ms = timeout.as_millis() as u64;
            }
            proposer.validate()?;

            ProposerServer::new(proposer).serve().await?;
        }
    }

    Ok(())
}
