//! Best-effort translation of French source text.
//!
//! The collaborator may fail or stall at any time; `Enricher` turns every
//! such failure into `None` so a record is never lost to translation.

use crate::config::TranslationConfig;
use async_trait::async_trait;
use moka::future::Cache;
use pipeline_core::{clean, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tracing::warn;

/// External translation service.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String>;
}

/// Returns the input unchanged. Used when translation is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

#[async_trait]
impl Translator for IdentityTranslator {
    async fn translate(&self, text: &str, _source_lang: &str, _target_lang: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateTextRequest<'a> {
    contents: [&'a str; 1],
    mime_type: &'static str,
    source_language_code: &'a str,
    target_language_code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateTextResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

/// Cloud Translation v3 `translateText` over REST.
pub struct CloudTranslator {
    client: reqwest::Client,
    url: String,
    access_token: Option<String>,
}

impl CloudTranslator {
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        if config.project_id.is_empty() {
            return Err(Error::config("translation.project_id is required"));
        }

        let url = format!(
            "{}/v3/projects/{}/locations/{}:translateText",
            config.endpoint.trim_end_matches('/'),
            config.project_id,
            config.location
        );
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            url,
            access_token: config.access_token.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Translator for CloudTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        let body = TranslateTextRequest {
            contents: [text],
            mime_type: "text/plain",
            source_language_code: source_lang,
            target_language_code: target_lang,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::translation(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::translation(format!("HTTP {}: {}", status, body)));
        }

        let parsed: TranslateTextResponse = response
            .json()
            .await
            .map_err(|e| Error::translation(format!("invalid response: {}", e)))?;

        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| Error::translation("response carried no translations"))
    }
}

/// Builds the translator selected by configuration.
pub fn build_translator(config: &TranslationConfig) -> Result<Arc<dyn Translator>> {
    if config.enabled {
        Ok(Arc::new(CloudTranslator::new(config)?))
    } else {
        Ok(Arc::new(IdentityTranslator))
    }
}

/// Caching, time-bounded wrapper around a `Translator`.
#[derive(Clone)]
pub struct Enricher {
    translator: Arc<dyn Translator>,
    source_lang: String,
    target_lang: String,
    timeout: Duration,
    /// Cleaned source text -> cleaned translation
    cache: Cache<String, String>,
}

impl Enricher {
    pub fn new(translator: Arc<dyn Translator>, config: &TranslationConfig) -> Self {
        Self {
            translator,
            source_lang: config.source_language.clone(),
            target_lang: config.target_language.clone(),
            timeout: config.timeout(),
            cache: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(config.cache_ttl())
                .build(),
        }
    }

    pub fn target_lang(&self) -> &str {
        &self.target_lang
    }

    /// Translates `text`, or returns `None` if there is nothing to
    /// translate or the collaborator failed.
    pub async fn enrich(&self, text: Option<String>) -> Option<String> {
        let text = text?;

        if let Some(cached) = self.cache.get(&text).await {
            return Some(cached);
        }

        let call = self
            .translator
            .translate(&text, &self.source_lang, &self.target_lang);
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::translation(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(translated) => {
                let translated = clean(Some(translated.as_str()))?;
                self.cache.insert(text, translated.clone()).await;
                Some(translated)
            }
            Err(e) => {
                metrics().translation_failures.inc();
                warn!(error = %e, chars = text.len(), "Translation failed, field set to null");
                None
            }
        }
    }
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("source_lang", &self.source_lang)
            .field("target_lang", &self.target_lang)
            .field("timeout", &self.timeout)
            .finish()
    }
}
