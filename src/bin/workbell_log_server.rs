//! Activity-log HTTP service.
//!
//! Usage: `workbell-log-server [CONFIG]`. Reads the `[server]` section.

use std::path::PathBuf;
use std::sync::Arc;
use workbell::BellConfig;
use workbell::activity::server::{ActivityServer, open_store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(BellConfig::default_config_path);
    let config = if path.exists() {
        BellConfig::from_file(&path)?
    } else {
        BellConfig::default()
    };

    if config.server.database.is_none() {
        tracing::warn!("no database configured; activity is kept in memory only");
    }
    let store = Arc::new(open_store(&config.server)?);
    let server = ActivityServer::start(store, &config.server).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down activity log server on {}", server.addr());
    server.shutdown();
    Ok(())
}
