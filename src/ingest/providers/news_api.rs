// src/ingest/providers/news_api.rs
use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;

use crate::config::NewsSourceConfig;
use crate::ingest::types::{FetchOutcome, RawRecord, SourceAdapter};

/// Adapter for JSON news APIs (CryptoCompare and friends). The article array
/// sits behind a configurable dot-path, `Data` by default; item fields are
/// passed through untouched and resolved by the normalizer.
pub struct NewsApiAdapter {
    name: String,
    url: String,
    response_path: String,
    retry_count: u32,
    client: reqwest::Client,
}

impl NewsApiAdapter {
    pub fn from_config(cfg: &NewsSourceConfig, retry_count: u32) -> Result<Self> {
        Ok(Self {
            name: cfg.name.clone(),
            url: cfg.url.clone(),
            response_path: cfg.response_path.clone(),
            retry_count,
            client: super::build_client(cfg.timeout_secs)?,
        })
    }

    pub fn parse_payload(name: &str, response_path: &str, body: &Value) -> Vec<RawRecord> {
        let t0 = std::time::Instant::now();

        let mut cursor = Some(body);
        for key in response_path.split('.').filter(|k| !k.is_empty()) {
            cursor = cursor.and_then(|v| v.get(key));
        }
        let items = cursor.and_then(Value::as_array);

        let mut out = Vec::new();
        if let Some(items) = items {
            for item in items {
                if let Some(obj) = item.as_object() {
                    out.push(RawRecord::new(name, obj.clone()));
                }
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_records_total", "source" => name.to_string())
            .increment(out.len() as u64);
        out
    }
}

#[async_trait]
impl SourceAdapter for NewsApiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> FetchOutcome {
        match super::get_json(&self.client, &self.url, self.retry_count).await {
            Ok(body) => FetchOutcome::ok(Self::parse_payload(&self.name, &self.response_path, &body)),
            Err(e) => {
                tracing::warn!(error = ?e, source = %self.name, "news api fetch failed");
                FetchOutcome::failed(format!("{e:#}"))
            }
        }
    }
}
