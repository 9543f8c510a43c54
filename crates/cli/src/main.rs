// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! kvr - replicated key-value store CLI

mod client;
mod console;
mod error;

use std::io::Write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use crate::client::{ClientError, NodeClient};
use crate::console::{execute, Line};
use crate::error::KvrError;

#[derive(Parser)]
#[command(
    name = "kvr",
    version,
    about = "Client for a replicated key-value store"
)]
struct Cli {
    /// Node address (host:port)
    #[arg(long, global = true, default_value = "127.0.0.1:50051")]
    addr: String,

    /// Without a command, start an interactive console
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value of a key
    Get { key: String },
    /// Set a key (leader only)
    Set { key: String, value: String },
    /// Delete a key (leader only)
    Del { key: String },
    /// List all keys
    Keys,
    /// Show node status
    Status,
}

impl From<Commands> for Line {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Get { key } => Line::Get(key),
            Commands::Set { key, value } => Line::Set(key, value),
            Commands::Del { key } => Line::Del(key),
            Commands::Keys => Line::Keys,
            Commands::Status => Line::Status,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = NodeClient::new(cli.addr);

    let Some(command) = cli.command else {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = std::io::stdout();
        console::run(&client, stdin, &mut stdout).await?;
        return Ok(());
    };

    let mut stdout = std::io::stdout();
    let result = match command {
        // Missing keys are an error outside the console
        Commands::Get { key } => client
            .get(&key)
            .await
            .and_then(|value| writeln!(stdout, "{}", value).map_err(ClientError::from)),
        Commands::Del { key } => client
            .delete(&key)
            .await
            .and_then(|()| writeln!(stdout, "OK").map_err(ClientError::from)),
        command => execute(&client, command.into(), &mut stdout)
            .await
            .map(|_| ()),
    };

    if let Err(e) = result {
        let _ = stdout.flush();
        eprint!("{}", KvrError::from_client(e, client.addr()));
        std::process::exit(1);
    }
    Ok(())
}
