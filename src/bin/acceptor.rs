//! Acceptor binary

use clap::{Parser, Subcommand};
use minicas::{common::config::Config, AcceptorServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "minicas-acceptor")]
#[command(about = "minicas in-memory acceptor")]
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
    /// Start acceptor server
    Serve {
        /// Acceptor ID
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,
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
        Commands::Serve { id, bind } => {
            let mut acceptor = config.acceptor;
            if let Some(id) = id {
                acceptor.acceptor_id = id;
            }
            if let Some(bind) = bind {
                acceptor.bind_addr = bind;
            }

            AcceptorServer::new(acceptor).serve().await?;
        }
    }

    Ok(())
}
