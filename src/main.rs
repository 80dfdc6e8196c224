use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "cassandra-data-api")]
#[command(version = "0.1.0")]
#[command(about = "Serve Cassandra keyspaces as live GraphQL and REST APIs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration
    Init {
        /// Database contact points, comma-separated
        #[arg(long, value_delimiter = ',', default_value = "127.0.0.1:9042")]
        hosts: Vec<String>,

        /// Serve only this keyspace
        #[arg(long)]
        keyspace: Option<String>,

        /// Output config file path (if not specified, outputs to stdout)
        #[arg(long)]
        output: Option<String>,
    },

    /// Start the API server
    Serve {
        /// Config file path
        #[arg(long, default_value = "data-api.toml")]
        config: String,

        /// Server port (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { hosts, keyspace, output } => {
            cli::init::run(hosts, keyspace, output)?;
        }
        Commands::Serve { config, port } => {
            cli::serve::run(config, port).await?;
        }
    }

    Ok(())
}
