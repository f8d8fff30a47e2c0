// src/translate.rs
//
// Post-ingestion enrichment: backfill translations for stored articles
// that have none yet. Runs only from its own trigger, never inside an
// ingestion run, so a slow or broken translator cannot stall refreshes.

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use reqwest::Client;
use serde::Deserialize;

use crate::config::TranslateConfig;
use crate::store::Store;

/// Client for a LibreTranslate-compatible endpoint.
pub struct Translator {
    endpoint: String,
    target_lang: String,
    chunk_chars: usize,
    client: Client,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl Translator {
    /// Returns `None` when no endpoint is configured; the backfill trigger
    /// then reports the feature as unavailable.
    pub fn from_config(cfg: &TranslateConfig) -> Result<Option<Self>> {
        let Some(endpoint) = cfg.endpoint.clone() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building translate http client")?;
        Ok(Some(Self {
            endpoint,
            target_lang: cfg.target_lang.clone(),
            chunk_chars: cfg.chunk_chars.max(1),
            client,
        }))
    }

    /// Backfill up to `limit` untranslated articles, newest first.
    ///
    /// An article whose title cannot be translated is skipped without being
    /// written, which leaves it eligible for the next pass. Failures on the
    /// optional fields downgrade to an untranslated field rather than
    /// skipping the article. Returns how many articles were written.
    pub async fn translate_missing(&self, store: &Store, limit: u32) -> Result<usize> {
        let pending = store.articles_missing_translation(limit)?;
        if pending.is_empty() {
            tracing::debug!("no articles awaiting translation");
            return Ok(0);
        }
        let mut translated = 0usize;
        for stored in &pending {
            let article = &stored.article;
            let title = self.field(Some(article.title.as_str())).await;
            if title.is_none() {
                tracing::warn!(id = stored.id, "title translation failed, article left for next pass");
                continue;
            }
            let summary = self.field(article.summary.as_deref()).await;
            let body = self.field(article.body.as_deref()).await;
            store.apply_translation(stored.id, title.as_deref(), summary.as_deref(), body.as_deref())?;
            translated += 1;
        }
        counter!("translate_backfilled_total").increment(translated as u64);
        tracing::info!(
            pending = pending.len(),
            translated,
            lang = %self.target_lang,
            "translation backfill complete"
        );
        Ok(translated)
    }

    /// Translate one optional field, absorbing failures into `None`.
    async fn field(&self, text: Option<&str>) -> Option<String> {
        let text = text?;
        match self.translate_text(text).await {
            Ok(out) => out,
            Err(e) => {
                tracing::debug!(error = %e, "translation request failed");
                None
            }
        }
    }

    /// Split at the upstream per-request character limit and rejoin.
    async fn translate_text(&self, text: &str) -> Result<Option<String>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let chars: Vec<char> = trimmed.chars().collect();
        let mut out = String::with_capacity(trimmed.len());
        for chunk in chars.chunks(self.chunk_chars) {
            let piece: String = chunk.iter().collect();
            out.push_str(&self.translate_chunk(&piece).await?);
        }
        Ok(Some(out))
    }

    async fn translate_chunk(&self, text: &str) -> Result<String> {
        let t0 = std::time::Instant::now();
        let body = serde_json::json!({
            "q": text,
            "source": "auto",
            "target": self.target_lang,
            "format": "text",
        });
        let resp: TranslateResponse = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("translate post")?
            .error_for_status()
            .context("translate non-2xx")?
            .json()
            .await
            .context("decoding translate response")?;
        histogram!("translate_request_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(resp.translated_text)
    }
}
