mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, GraphCommands, ModelCommands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hivectl=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Analyze {
            query,
            agents,
            detailed,
        } => commands::analyze::run(query, *agents, *detailed, &cli.output).await,
        Commands::Graph { command } => match command {
            GraphCommands::Ingest {
                text,
                session,
                source,
            } => commands::graph::ingest(text, session, source, &cli.output).await,
            GraphCommands::Query {
                query,
                session,
                query_type,
            } => commands::graph::query(query, session, query_type, &cli.output).await,
            GraphCommands::Export { session } => {
                commands::graph::export(session, &cli.output).await
            }
        },
        Commands::Models { command } => match command {
            ModelCommands::List { provider } => {
                commands::models::list(provider.as_deref(), &cli.output).await
            }
        },
    }
}
