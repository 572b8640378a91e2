//! Quadstore server and command-line client

use anyhow::Context;
use clap::{Parser, Subcommand};
use quadstore::http::SparqlServer;
use quadstore::store::{connect, create, LoadSource, SparqlClient};
use quadstore::StoreConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quadstore", version, about = "RDF quad store with a SPARQL endpoint")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "QUADSTORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a store over HTTP
    Serve {
        /// Port (default: the configured one)
        #[arg(long)]
        port: Option<u16>,

        /// Files loaded before serving, as MEDIA_TYPE=PATH
        #[arg(long = "load")]
        preload: Vec<String>,
    },
    /// Run a query or update, remotely when a server is reachable
    Query {
        /// SPARQL text
        sparql: String,

        /// Server endpoint (default: the configured host and port)
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Report the status of a store
    Status {
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => StoreConfig::from_yaml_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => StoreConfig::default(),
    };

    match cli.command {
        Commands::Serve { port, preload } => serve(config, port, preload).await,
        Commands::Query { sparql, endpoint } => {
            let connection = connect(endpoint.as_deref(), config).await?;
            let outcome = connection.execute(&sparql).await?;
            let encoded = outcome.encode()?;
            println!("{}", String::from_utf8_lossy(&encoded.body));
            Ok(())
        }
        Commands::Status { endpoint } => {
            let connection = connect(endpoint.as_deref(), config).await?;
            let status = connection.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

async fn serve(config: StoreConfig, port: Option<u16>, preload: Vec<String>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.port);
    let store = create(config).await?;

    for entry in preload {
        let (media_type, path) = entry
            .split_once('=')
            .with_context(|| format!("expected MEDIA_TYPE=PATH, got {}", entry))?;
        let loaded = store
            .load(LoadSource::file(media_type, path), None)
            .await?;
        println!("Loaded {} quads from {}", loaded, path);
    }

    println!("Quadstore v{}", quadstore::version());
    SparqlServer::new(store.clone(), port)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("server failed: {}", e))?;
    store.close().await?;
    Ok(())
}
