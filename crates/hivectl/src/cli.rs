use clap::{Parser, Subcommand};

/// Hive CLI - drive the workforce runtime from the terminal
#[derive(Parser, Debug)]
#[command(name = "hivectl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    pub output: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a heavy analysis over a query
    Analyze {
        /// The query to analyze
        query: String,

        /// Number of parallel agents (2-8)
        #[arg(short = 'n', long, default_value_t = 4)]
        agents: usize,

        /// Include per-agent results in the output
        #[arg(long)]
        detailed: bool,
    },

    /// Memory graph operations
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },

    /// Model registry operations
    Models {
        #[command(subcommand)]
        command: ModelCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// Ingest a text fragment into a session's graph
    Ingest {
        /// Text to ingest
        text: String,

        /// Session the graph belongs to
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Source tag recorded on created nodes and edges
        #[arg(long, default_value = "hivectl")]
        source: String,
    },

    /// Query a session's graph
    Query {
        /// The question to answer
        query: String,

        /// Session the graph belongs to
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Query type (auto, blocking_analysis, missing_envvars,
        /// impact_analysis, related_incidents)
        #[arg(short = 't', long, default_value = "auto")]
        query_type: String,
    },

    /// Export a session's graph as JSON
    Export {
        /// Session the graph belongs to
        #[arg(short, long, default_value = "default")]
        session: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ModelCommands {
    /// List registered models
    List {
        /// Only models from this provider
        #[arg(short, long)]
        provider: Option<String>,
    },
}
