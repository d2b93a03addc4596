//! RappelConso recall pipeline
//!
//! - Incremental harvester: source API → translate/normalize → Redpanda
//! - Streaming aggregator: Redpanda → monthly stats + trend join → ClickHouse
//! - Operational HTTP surface for health and metrics

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::AppState;
use clickhouse_client::{ClickHouseClient, ClickHouseConfig};
use redpanda::{Consumer, Producer, RedpandaConfig};
use telemetry::{health, init_tracing_from_env};
use worker::{
    build_translator, CheckpointConfig, ClickHouseSink, Enricher, FileCheckpointStore,
    IngestLoop, IngestSettings, PipelineScheduler, RecordTransformer, SourceClient, SourceConfig,
    StreamConfig, StreamSettings, StreamWorker, TranslationConfig,
};

/// Which loops this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RunMode {
    All,
    Ingest,
    Stream,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    #[serde(default = "default_mode")]
    mode: RunMode,

    #[serde(default)]
    http: HttpConfig,

    #[serde(default)]
    source: SourceConfig,

    #[serde(default)]
    checkpoint: CheckpointConfig,

    #[serde(default)]
    translation: TranslationConfig,

    #[serde(default)]
    stream: StreamConfig,

    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    clickhouse: ClickHouseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HttpConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_mode() -> RunMode {
    RunMode::All
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            http: HttpConfig::default(),
            source: SourceConfig::default(),
            checkpoint: CheckpointConfig::default(),
            translation: TranslationConfig::default(),
            stream: StreamConfig::default(),
            redpanda: RedpandaConfig::default(),
            clickhouse: ClickHouseConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires an explicit crypto provider before any TLS use
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing_from_env();

    info!("Starting recall pipeline v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        mode = ?config.mode,
        endpoint = %config.source.endpoint,
        limit = config.source.limit,
        brokers = ?config.redpanda.brokers,
        topic = %config.redpanda.topic,
        clickhouse = %config.clickhouse.url,
        translation = config.translation.enabled,
        "Loaded configuration"
    );

    let clickhouse = Arc::new(ClickHouseClient::new(config.clickhouse.clone()));

    if config.mode != RunMode::Ingest {
        if let Err(e) = clickhouse_client::health::init_schema(&clickhouse).await {
            error!("Failed to initialize ClickHouse schema: {}", e);
            // Continue anyway - the table may already exist
        }
    }

    check_health(&config, &clickhouse).await;

    let scheduler = build_scheduler(&config, clickhouse.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested, finishing in-flight work");
        let _ = shutdown_tx.send(true);
    });

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port)
        .parse()
        .context("Invalid HTTP address")?;
    let state = AppState::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    let http_shutdown = shutdown_rx.clone();
    let http = tokio::spawn(async move {
        if let Err(e) = api::serve(addr, state, http_shutdown).await {
            error!("HTTP surface error: {}", e);
        }
    });

    let handles = scheduler.start(shutdown_rx);
    let outcome = worker::join_all(handles).await;

    http.abort();

    match outcome {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => Err(anyhow!(e).context("Pipeline halted; operator intervention required")),
    }
}

/// Wires the collaborators for the configured mode.
fn build_scheduler(
    config: &Config,
    clickhouse: Arc<ClickHouseClient>,
) -> Result<PipelineScheduler> {
    let ingest = if config.mode != RunMode::Stream {
        let source_config = config
            .source
            .clone()
            .validated()
            .context("Invalid source configuration")?;
        let source = Arc::new(
            SourceClient::new(&source_config).context("Failed to build source client")?,
        );

        let translator =
            build_translator(&config.translation).context("Failed to build translator")?;
        let transformer =
            RecordTransformer::new(Enricher::new(translator, &config.translation));

        let publisher = Arc::new(Producer::new(config.redpanda.clone()));
        let checkpoint = Arc::new(FileCheckpointStore::new(&config.checkpoint.ingest_path));

        Some(Arc::new(IngestLoop::new(
            source,
            transformer,
            publisher,
            checkpoint,
            IngestSettings::new(&source_config, &config.checkpoint),
        )))
    } else {
        None
    };

    let stream = if config.mode != RunMode::Ingest {
        let consumer = Arc::new(Consumer::new(config.redpanda.clone()));
        let sink = Arc::new(ClickHouseSink::new(clickhouse));
        let checkpoint = Arc::new(FileCheckpointStore::new(&config.checkpoint.sink_path));

        Some(Arc::new(StreamWorker::new(
            consumer,
            sink,
            checkpoint,
            StreamSettings::new(&config.stream, &config.checkpoint),
        )))
    } else {
        None
    };

    Ok(match (ingest, stream) {
        (Some(ingest), Some(stream)) => PipelineScheduler::new(ingest, stream),
        (Some(ingest), None) => PipelineScheduler::ingest_only(ingest),
        (None, Some(stream)) => PipelineScheduler::stream_only(stream),
        (None, None) => return Err(anyhow!("No workers configured")),
    })
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("RECALL")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat overrides; nested parsing is unreliable for underscored field names
    if let Ok(endpoint) = std::env::var("RECALL_SOURCE_ENDPOINT") {
        config.source.endpoint = endpoint;
    }
    if let Ok(limit) = std::env::var("RECALL_SOURCE_LIMIT") {
        config.source.limit = limit
            .parse()
            .context("RECALL_SOURCE_LIMIT must be an integer")?;
    }
    if let Ok(path) = std::env::var("RECALL_CHECKPOINT_PATH") {
        config.checkpoint.ingest_path = path.into();
    }
    if let Ok(path) = std::env::var("RECALL_SINK_CHECKPOINT_PATH") {
        config.checkpoint.sink_path = path.into();
    }
    if let Ok(target) = std::env::var("RECALL_TARGET_LANGUAGE") {
        config.translation.target_language = target;
    }
    if let Ok(project) = std::env::var("RECALL_TRANSLATION_PROJECT_ID") {
        config.translation.project_id = project;
        config.translation.enabled = true;
    }
    if let Ok(token) = std::env::var("RECALL_TRANSLATION_ACCESS_TOKEN") {
        config.translation.access_token = Some(token);
    }

    if let Ok(brokers) = std::env::var("RECALL_REDPANDA_BROKERS") {
        config.redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(username) = std::env::var("RECALL_REDPANDA_SASL_USERNAME") {
        config.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("RECALL_REDPANDA_SASL_PASSWORD") {
        config.redpanda.sasl_password = Some(password);
    }
    if let Ok(topic) = std::env::var("RECALL_REDPANDA_TOPIC") {
        config.redpanda.topic = topic;
    }

    if let Ok(url) = std::env::var("RECALL_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("RECALL_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("RECALL_CLICKHOUSE_USERNAME") {
        config.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("RECALL_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = Some(password);
    }

    Ok(config)
}

/// Check component health on startup.
async fn check_health(config: &Config, clickhouse: &ClickHouseClient) {
    let redpanda_healthy = redpanda::health::check_connection(&config.redpanda).await;
    if redpanda_healthy {
        health().redpanda.set_healthy();
        info!("Redpanda connection: healthy");
    } else {
        health().redpanda.set_unhealthy("Connection failed");
        error!("Redpanda connection: unhealthy");
    }

    if config.mode == RunMode::Ingest {
        return;
    }

    let ch_healthy = clickhouse_client::health::check_connection(clickhouse).await;
    if ch_healthy {
        health().clickhouse.set_healthy();
        info!("ClickHouse connection: healthy");
    } else {
        health().clickhouse.set_unhealthy("Connection failed");
        error!("ClickHouse connection: unhealthy");
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
