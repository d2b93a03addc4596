//! Paginated source API client.

use crate::config::SourceConfig;
use crate::retry::BackoffPolicy;
use async_trait::async_trait;
use pipeline_core::{Error, RawRecord, Result, SourcePage};
use reqwest::StatusCode;
use std::time::Instant;
use telemetry::{health, metrics};
use tracing::{debug, warn};
use url::Url;

/// A paginated feed of raw records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetches up to `limit` records starting at `offset`. An empty page
    /// means nothing new yet.
    async fn fetch_page(&self, offset: u64, limit: u32) -> Result<Vec<RawRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

/// HTTP client for `GET <endpoint>?limit=L&offset=O`.
pub struct SourceClient {
    client: reqwest::Client,
    endpoint: Url,
    backoff: BackoffPolicy,
}

impl SourceClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| Error::config(format!("source endpoint {}: {}", config.endpoint, e)))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            backoff: config.backoff(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn fetch_once(&self, offset: u64, limit: u32) -> std::result::Result<SourcePage, Attempt> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("limit", limit as u64), ("offset", offset)])
            .send()
            .await
            .map_err(|e| Attempt {
                disposition: classify_reqwest_error(&e),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Attempt {
                disposition: classify_status(status),
                message: format!("HTTP {}", status),
            });
        }

        response.json::<SourcePage>().await.map_err(|e| Attempt {
            disposition: RetryDisposition::NonRetryable,
            message: format!("malformed page: {}", e),
        })
    }
}

struct Attempt {
    disposition: RetryDisposition,
    message: String,
}

#[async_trait]
impl RecordSource for SourceClient {
    async fn fetch_page(&self, offset: u64, limit: u32) -> Result<Vec<RawRecord>> {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            match self.fetch_once(offset, limit).await {
                Ok(page) => {
                    metrics()
                        .fetch_latency_ms
                        .observe(start.elapsed().as_millis() as u64);
                    health().source.set_healthy();
                    debug!(
                        offset = offset,
                        returned = page.results.len(),
                        total_count = ?page.total_count,
                        "Fetched source page"
                    );
                    return Ok(page.results);
                }
                Err(failure)
                    if failure.disposition == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries =>
                {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    attempt += 1;
                    warn!(
                        offset = offset,
                        attempt = attempt,
                        error = %failure.message,
                        "Source fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => {
                    health().source.set_unhealthy(failure.message.clone());
                    return Err(Error::source_fetch(format!(
                        "offset {}: {}",
                        offset, failure.message
                    )));
                }
            }
        }
    }
}
