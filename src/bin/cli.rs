//! CLI for talking to a proposer

use clap::{Parser, Subcommand};
use minicas::{Ballot, ProposerClient};
use std::io::Write;

#[derive(Parser)]
#[command(name = "minicas")]
#[command(about = "minicas CASPaxos register CLI")]
#[command(version = minicas::BUILD_INFO)]
struct Cli {
    /// Proposer URL
    #[arg(long, default_value = "http://localhost:8080")]
    proposer: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a key through a full round
    Get {
        /// Key
        key: String,
    },

    /// Compare-and-set a key
    Cas {
        /// Key
        key: String,

        /// Expected current value (empty for an unset key)
        #[arg(long, default_value = "")]
        expect: String,

        /// New value
        #[arg(long)]
        set: String,
    },

    /// Delete a key if it holds the expected value
    Del {
        /// Key
        key: String,

        /// Expected current value
        #[arg(long)]
        expect: String,
    },

    /// Read a key with the prepare phase only
    Read {
        /// Key
        key: String,
    },

    /// Re-install a key's value above a tombstone ballot
    FastForward {
        /// Key
        key: String,

        /// Tombstone ballot as counter/id
        #[arg(long, default_value = "0/0")]
        tombstone: Ballot,
    },

    /// Add a preparer endpoint
    AddPreparer { endpoint: String },

    /// Add an accepter endpoint
    AddAccepter { endpoint: String },

    /// Remove a preparer endpoint
    RemovePreparer { endpoint: String },

    /// Remove an accepter endpoint
    RemoveAccepter { endpoint: String },

    /// Show the proposer's replica sets
    Members,
}

fn print_value(value: &[u8]) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    out.write_all(value)?;
    out.write_all(b"\n")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = ProposerClient::new(cli.proposer);

    match cli.command {
        Commands::Get { key } => {
            let v = client.get(&key).await?;
            eprintln!("ballot: {}", v.ballot);
            print_value(&v.value)?;
        }

        Commands::Cas { key, expect, set } => {
            let v = client.cas(&key, expect.as_bytes(), set.as_bytes()).await?;
            if v.value.as_ref() != set.as_bytes() {
                eprintln!("not applied: current value differs from --expect");
            }
            eprintln!("ballot: {}", v.ballot);
            print_value(&v.value)?;
        }

        Commands::Del { key, expect } => {
            let v = client.delete(&key, expect.as_bytes()).await?;
            println!("deleted {} at {}", key, v.ballot);
        }

        Commands::Read { key } => {
            let value = client.full_identity_read(&key).await?;
            print_value(&value)?;
        }

        Commands::FastForward { key, tombstone } => {
            let age = client.fast_forward_increment(&key, tombstone).await?;
            println!("age: {}", age);
        }

        Commands::AddPreparer { endpoint } => {
            client.add_preparer(&endpoint).await?;
            println!("preparer added: {}", endpoint);
        }

        Commands::AddAccepter { endpoint } => {
            client.add_accepter(&endpoint).await?;
            println!("accepter added: {}", endpoint);
        }

        Commands::RemovePreparer { endpoint } => {
            client.remove_preparer(&endpoint).await?;
            println!("preparer removed: {}", endpoint);
        }

        Commands::RemoveAccepter { endpoint } => {
            client.remove_accepter(&endpoint).await?;
            println!("accepter removed: {}", endpoint);
        }

        Commands::Members => {
            let members = client.members().await?;
            println!("Proposer {}:", members.proposer_id);
            println!("  Preparers ({}):", members.preparers.len());
            for p in &members.preparers {
                println!("    {}", p);
            }
            println!("  Accepters ({}):", members.accepters.len());
            for a in &members.accepters {
                println!("    {}", a);
            }
        }
    }

    Ok(())
}
