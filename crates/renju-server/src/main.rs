//! Renju server binary.
//!
//! # Usage
//!
//! ```bash
//! # Ephemeral run (in-memory storage, development key exchange)
//! renju-server --bind 0.0.0.0:8080
//!
//! # Durable accounts and game records
//! renju-server --bind 0.0.0.0:8080 --db renju.redb
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use renju_core::{DevKeyExchange, ObjectStore, PersistenceGateway};
use renju_server::{
    storage::{MemoryGateway, RedbGateway},
    DriverConfig, Server, ServerRuntimeConfig, SystemEnv,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Renju game server
#[derive(Parser, Debug)]
#[command(name = "renju-server")]
#[command(about = "Online five-in-a-row game server")]
#[command(version)]
struct Args {
    /// Address to bind to (use [::]:8080 for IPv6)
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Database file for accounts and game records; omitted = in-memory
    #[arg(long)]
    db: Option<PathBuf>,

    /// Seconds of silence before a session is evicted
    #[arg(long, default_value = "30")]
    session_timeout: u64,

    /// Board size for new rooms
    #[arg(long, default_value = "15")]
    board_size: u32,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("renju server starting");

    let gateway: Arc<dyn PersistenceGateway> = match &args.db {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening database");
            Arc::new(RedbGateway::open(path)?)
        },
        None => {
            tracing::warn!("no --db given: accounts will not survive a restart");
            Arc::new(MemoryGateway::new())
        },
    };

    let store = Arc::new(ObjectStore::new(gateway));
    let loaded = store.load_users()?;
    tracing::info!(loaded, "users loaded");

    // The built-in key exchange derives the session key from public values
    // only. Fine for development; deployments plug a real Diffie-Hellman
    // module behind the SessionCrypto trait.
    tracing::warn!("using development key exchange - not suitable for production!");
    let crypto = Arc::new(DevKeyExchange::new(&SystemEnv::new()));

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        driver: DriverConfig {
            session_timeout: Duration::from_secs(args.session_timeout),
            max_connections: args.max_connections,
            default_board_size: args.board_size,
            ..DriverConfig::default()
        },
    };

    let server = Server::bind(config, store, crypto).await?;
    tracing::info!("listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
