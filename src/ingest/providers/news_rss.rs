// src/ingest/providers/news_rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use serde_json::Value;

use crate::config::NewsSourceConfig;
use crate::ingest::types::{FetchOutcome, RawRecord, SourceAdapter};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    // quick-xml's serde deserializer strips namespace prefixes, so
    // `<content:encoded>` arrives under the local name `encoded`.
    #[serde(rename = "encoded")]
    content: Option<String>,
}

// Atom elements routinely carry a `type` attribute, so their text sits
// behind `$text` instead of deserializing straight into a String.
#[derive(Debug, Default, Deserialize)]
struct TextValue {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}
#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextValue>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<TextValue>,
    content: Option<TextValue>,
}
#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Feed adapter covering RSS 2.0 and Atom, one page per fetch.
pub struct NewsRssAdapter {
    name: String,
    url: String,
    retry_count: u32,
    client: reqwest::Client,
}

impl NewsRssAdapter {
    pub fn from_config(cfg: &NewsSourceConfig, retry_count: u32) -> Result<Self> {
        Ok(Self {
            name: cfg.name.clone(),
            url: cfg.url.clone(),
            retry_count,
            client: super::build_client(cfg.timeout_secs)?,
        })
    }

    pub fn parse_feed(name: &str, xml: &str) -> Result<Vec<RawRecord>> {
        let t0 = std::time::Instant::now();
        let clean = scrub_html_entities_for_xml(xml);

        let out = if let Ok(rss) = from_str::<Rss>(&clean) {
            rss.channel.item.into_iter().map(|it| rss_record(name, it)).collect()
        } else {
            let feed: AtomFeed =
                from_str(&clean).context("parsing feed xml (neither rss nor atom)")?;
            feed.entry.into_iter().map(|e| atom_record(name, e)).collect::<Vec<_>>()
        };

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_records_total", "source" => name.to_string())
            .increment(out.len() as u64);
        Ok(out)
    }
}

fn rss_record(name: &str, item: Item) -> RawRecord {
    let mut fields = serde_json::Map::new();
    put(&mut fields, "title", item.title);
    put(&mut fields, "link", item.link);
    put(&mut fields, "description", item.description);
    put(&mut fields, "content", item.content);
    put(&mut fields, "pubDate", item.pub_date);
    RawRecord::new(name, fields)
}

fn atom_record(name: &str, entry: AtomEntry) -> RawRecord {
    // prefer rel="alternate" (or no rel), fall back to the first link
    let href = entry
        .link
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.link.first())
        .and_then(|l| l.href.clone());

    let mut fields = serde_json::Map::new();
    put(&mut fields, "title", entry.title.and_then(|t| t.value));
    put(&mut fields, "link", href);
    put(&mut fields, "summary", entry.summary.and_then(|t| t.value));
    put(&mut fields, "content", entry.content.and_then(|t| t.value));
    put(&mut fields, "published", entry.published);
    put(&mut fields, "updated", entry.updated);
    RawRecord::new(name, fields)
}

fn put(fields: &mut serde_json::Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(v) = value {
        fields.insert(key.to_string(), Value::String(v));
    }
}

// Feeds love HTML entities that XML parsers reject.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[async_trait]
impl SourceAdapter for NewsRssAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> FetchOutcome {
        let body = match super::get_text(&self.client, &self.url, self.retry_count).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = ?e, source = %self.name, "feed fetch failed");
                return FetchOutcome::failed(format!("{e:#}"));
            }
        };
        match Self::parse_feed(&self.name, &body) {
            Ok(records) => FetchOutcome::ok(records),
            Err(e) => {
                tracing::warn!(error = ?e, source = %self.name, "feed parse failed");
                FetchOutcome::failed(format!("{e:#}"))
            }
        }
    }
}
