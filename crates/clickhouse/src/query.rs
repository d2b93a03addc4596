//! Read-back of the statistics table.

use crate::client::ClickHouseClient;
use pipeline_core::{Error, Result};

/// Highest offset already written, if any.
///
/// The stream worker compares it with its checkpoint at startup.
pub async fn last_written_offset(client: &ClickHouseClient) -> Result<Option<i64>> {
    let sql = format!(
        "SELECT max(batch_end_offset) FROM {} HAVING count() > 0",
        client.config().qualified_table()
    );
    client
        .inner()
        .query(&sql)
        .fetch_optional::<i64>()
        .await
        .map_err(|e| Error::sink(format!("Query error: {}", e)))
}
