//! edgestore: graph data service over an event-sourced core.

use clap::{Parser, Subcommand};

use edgestore::server::{init_tracing, serve};
use edgestore::{version, Config};

const DESCRIPTION: &str = "Edgestore: Distributed Graph Data Store";

#[derive(Parser)]
#[command(name = "edgestore", about = DESCRIPTION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Print the version and exit
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = Config::load()?;
            init_tracing(&config.server.logger_level, &config.server.logger_format);
            serve(config).await?;
        }
        Commands::Version => {
            version::print(DESCRIPTION);
        }
    }

    Ok(())
}
