//! Shared connection setup for producer, consumer and health checks.

use crate::config::RedpandaConfig;
use pipeline_core::{Error, Result};
use rskafka::client::{
    partition::{Compression, PartitionClient, UnknownTopicHandling},
    Client, ClientBuilder, Credentials, SaslConfig,
};
use std::sync::Arc;

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Builds a cluster client, with TLS and SASL when credentials are set.
pub async fn connect(config: &RedpandaConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new(vec![config.broker_string()]);

    if let Some((username, password)) = config.credentials() {
        builder = builder
            .tls_config(create_tls_config())
            .sasl_config(SaslConfig::ScramSha256(Credentials::new(
                username.to_string(),
                password.to_string(),
            )));
    }

    builder
        .build()
        .await
        .map_err(|e| Error::transport(format!("Failed to connect to Redpanda: {}", e)))
}

/// Opens the configured topic partition.
pub async fn partition_client(config: &RedpandaConfig) -> Result<Arc<PartitionClient>> {
    let client = connect(config).await?;
    let partition = client
        .partition_client(
            config.topic.clone(),
            config.partition,
            UnknownTopicHandling::Error,
        )
        .await
        .map_err(|e| Error::transport(format!("Failed to get partition client: {}", e)))?;
    Ok(Arc::new(partition))
}

/// Maps the configured compression name.
pub fn compression(name: &str) -> Compression {
    match name {
        "gzip" => Compression::Gzip,
        "snappy" => Compression::Snappy,
        "lz4" => Compression::Lz4,
        "zstd" => Compression::Zstd,
        _ => Compression::NoCompression,
    }
}
