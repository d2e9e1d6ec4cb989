//! Standalone worker process: connects to Postgres, ensures the schema
//! exists, and drains the change log forever.
//!
//! Everything outside of wiring `Config`/`PgStorage`/`worker::run` together
//! — a CLI front end, graceful shutdown beyond `ctrl_c`, connection pool
//! tuning — is an external-collaborator concern per the crate's scope.

use std::sync::Arc;

use relgraph::storage::Storage;
use relgraph::{queue, worker, Config, PgStorage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL must be set to a Postgres connection string")?;
    let config = Config::from_env();

    let storage = PgStorage::connect(&database_url).await?;
    storage.ensure_schema().await?;
    let storage: Arc<dyn Storage> = Arc::new(storage);

    let (_wake, wake_rx) = queue::channel(config.wake_channel_capacity);

    tracing::info!(?config, "starting relgraph worker");

    tokio::select! {
        () = worker::run(storage, wake_rx, config) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
