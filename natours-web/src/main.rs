//! Natours Web Server
//!
//! Serves the credential API of Natours.

use anyhow::Context;
use clap::Parser;
use natours_core::{init_logging, NatoursConfig};
use natours_web::NatoursServerBuilder;
use std::path::PathBuf;

/// Natours credential and access-control API server
#[derive(Parser)]
#[command(name = "natours-web")]
#[command(about = "HTTP API for Natours accounts")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database URL (in-memory store when omitted)
    #[arg(long)]
    database_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Production mode: secure-only cookies
    #[arg(long)]
    production: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let mut config = match &args.config {
        Some(path) => NatoursConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => NatoursConfig::default(),
    };
    config
        .apply_env()
        .context("reading environment overrides")?;

    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("initialising logging: {}", e))?;

    let mut builder = NatoursServerBuilder::from_config(config);
    if let Some(host) = args.host {
        builder = builder.host(host);
    }
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    if let Some(url) = args.database_url {
        builder = builder.database_url(url);
    }
    if args.production {
        builder = builder.production(true);
    }

    let server = builder.build().await.context("building server")?;
    server.start().await.context("running server")?;
    Ok(())
}
