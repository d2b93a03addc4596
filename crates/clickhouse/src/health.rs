//! ClickHouse health checks and schema bootstrap.

use crate::client::ClickHouseClient;
use crate::schema::{create_database, create_stats_table};
use pipeline_core::{Error, Result};
use tracing::{debug, error};

/// Check ClickHouse connection health.
pub async fn check_connection(client: &ClickHouseClient) -> bool {
    match client.inner().query("SELECT 1").fetch_one::<u8>().await {
        Ok(_) => {
            debug!("ClickHouse connection healthy");
            true
        }
        Err(e) => {
            error!("ClickHouse health check failed: {}", e);
            false
        }
    }
}

/// Create the database and statistics table if missing.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let config = client.config();

    // The configured database may not exist yet
    client
        .inner()
        .clone()
        .with_database("default")
        .query(&create_database(&config.database))
        .execute()
        .await
        .map_err(|e| Error::sink(format!("Failed to create database: {}", e)))?;

    client
        .inner()
        .query(&create_stats_table(&config.qualified_table()))
        .execute()
        .await
        .map_err(|e| Error::sink(format!("Failed to execute DDL: {}", e)))?;

    debug!(table = %config.qualified_table(), "ClickHouse schema initialized");
    Ok(())
}
