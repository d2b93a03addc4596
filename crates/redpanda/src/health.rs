//! Redpanda health checks.

use crate::client::connect;
use crate::config::RedpandaConfig;
use tracing::{debug, error};

/// Check that the brokers answer and the topic exists.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    let client = match connect(config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Redpanda health check failed: {}", e);
            return false;
        }
    };

    match client.list_topics().await {
        Ok(topics) => {
            let found = topics.iter().any(|t| t.name == config.topic);
            if found {
                debug!(topic = %config.topic, "Redpanda connection healthy");
            } else {
                error!(topic = %config.topic, "Redpanda topic is missing");
            }
            found
        }
        Err(e) => {
            error!("Failed to list Redpanda topics: {}", e);
            false
        }
    }
}
