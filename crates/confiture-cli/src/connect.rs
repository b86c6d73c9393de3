//! Shared PostgreSQL connection helper.
//!
//! Every subcommand needs exactly one connection per invocation (spec §5:
//! "single-threaded, synchronous, blocking I/O against one PostgreSQL
//! connection per logical operation"); this is the one place that opens
//! one.

use tokio_postgres::{Client, NoTls};

use confiture::Result;

/// Connect to `database_url`, spawning the driver's connection future onto
/// the current runtime so `Client` stays usable for the caller's lifetime.
pub async fn connect(database_url: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .map_err(confiture::Error::from)?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "postgres connection terminated with an error");
        }
    });

    Ok(client)
}
