// src/ingest/providers/mod.rs
pub mod exchange_rest;
pub mod news_api;
pub mod news_rss;

pub use exchange_rest::ExchangeRestAdapter;
pub use news_api::NewsApiAdapter;
pub use news_rss::NewsRssAdapter;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;

const RETRY_DELAY: Duration = Duration::from_secs(1);

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("building http client")
}

/// GET with retries. Transport errors back off linearly, 5xx retries
/// immediately, 4xx fails fast.
pub(crate) async fn get_response(
    client: &Client,
    url: &str,
    retry_count: u32,
) -> Result<reqwest::Response> {
    let attempts = retry_count.max(1);
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 0..attempts {
        tracing::debug!(url, attempt = attempt + 1, "GET");
        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }
                let err = anyhow!("GET {url} returned {status}");
                if status.is_client_error() {
                    return Err(err);
                }
                last_err = Some(err);
            }
            Err(e) => {
                last_err = Some(anyhow::Error::new(e).context(format!("GET {url}")));
                if attempt + 1 < attempts {
                    tokio::time::sleep(RETRY_DELAY * (attempt + 1)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("GET {url} failed")))
}

pub(crate) async fn get_json(
    client: &Client,
    url: &str,
    retry_count: u32,
) -> Result<serde_json::Value> {
    let resp = get_response(client, url, retry_count).await?;
    resp.json()
        .await
        .with_context(|| format!("decoding json body from {url}"))
}

pub(crate) async fn get_text(client: &Client, url: &str, retry_count: u32) -> Result<String> {
    let resp = get_response(client, url, retry_count).await?;
    resp.text()
        .await
        .with_context(|| format!("reading body from {url}"))
}
