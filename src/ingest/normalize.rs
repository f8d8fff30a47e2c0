// src/ingest/normalize.rs
//
// RawRecord -> Entity conversion. Rejections never fail a batch; the
// coordinator counts them and moves on. Numeric coercion failures degrade the
// field to None. Natural-key fields are the only hard requirements.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::ingest::types::{Article, MarketPair, PairKind, RawRecord};

/// Longest stored summary, in characters.
pub const SUMMARY_MAX_CHARS: usize = 2_000;
/// Longest stored article body, in characters.
pub const BODY_MAX_CHARS: usize = 50_000;

/// Why a record was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unsupported market kind `{0}`")]
    UnknownKind(String),
}

/// Build a [`MarketPair`] from one `exchangeInfo`-style symbol object.
///
/// Expected fields follow the Binance/Toobit dialect: `symbol`, `baseAsset`,
/// `quoteAsset`, `status` (contract endpoints may use `contractStatus`), a
/// `filters` array with `PRICE_FILTER` / `LOT_SIZE` entries, and precision
/// fields that differ between spot and contract payloads. The adapter injects
/// `type` because only it knows which section of the response it is reading.
pub fn normalize_pair(record: &RawRecord) -> Result<MarketPair, Rejection> {
    let symbol = record
        .str_field("symbol")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(Rejection::MissingField("symbol"))?
        .to_string();

    let kind_raw = record
        .str_field("type")
        .ok_or(Rejection::MissingField("type"))?;
    let kind =
        PairKind::parse(kind_raw).ok_or_else(|| Rejection::UnknownKind(kind_raw.to_string()))?;

    let status = record
        .str_field("contractStatus")
        .or_else(|| record.str_field("status"))
        .unwrap_or_default()
        .trim()
        .to_string();

    let base_precision = text_field(record, &["baseAssetPrecision", "pricePrecision"]);
    let quote_precision = text_field(
        record,
        &["quotePrecision", "quoteAssetPrecision", "quantityPrecision"],
    );

    let filters = FilterBounds::from_fields(record);

    Ok(MarketPair {
        provider: record.provider.clone(),
        symbol,
        base_asset: record.str_field("baseAsset").unwrap_or_default().to_string(),
        quote_asset: record
            .str_field("quoteAsset")
            .unwrap_or_default()
            .to_string(),
        status,
        kind,
        base_precision,
        quote_precision,
        min_price: filters.min_price,
        max_price: filters.max_price,
        tick_size: filters.tick_size,
        min_qty: filters.min_qty,
        max_qty: filters.max_qty,
        step_size: filters.step_size,
        raw_payload: Some(Value::Object(record.fields.clone()).to_string()),
    })
}

/// Build an [`Article`] from one news item, API or feed dialect.
///
/// Title and URL are mandatory; everything else degrades gracefully. Titles
/// and summaries are de-HTML-ified and whitespace-collapsed; bodies keep
/// their markup and are only capped.
pub fn normalize_article(record: &RawRecord) -> Result<Article, Rejection> {
    let title_raw = first_str(record, &["title", "headline"]).ok_or(Rejection::MissingField("title"))?;
    let title = clean_text(title_raw);
    if title.is_empty() {
        return Err(Rejection::MissingField("title"));
    }

    let url = first_str(record, &["url", "link"])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(Rejection::MissingField("url"))?
        .to_string();

    let summary = first_str(record, &["summary", "body", "description"])
        .map(clean_text)
        .map(|s| truncate_chars(&s, SUMMARY_MAX_CHARS))
        .filter(|s| !s.is_empty());

    let body = first_str(record, &["content", "body", "summary", "description"])
        .map(|s| truncate_chars(s.trim(), BODY_MAX_CHARS))
        .filter(|s| !s.is_empty());

    let published_at = ["published_on", "published", "pubDate", "created_at", "updated"]
        .iter()
        .find_map(|k| record.fields.get(*k))
        .and_then(parse_published);

    Ok(Article {
        source: record.provider.clone(),
        url,
        title,
        summary,
        body,
        title_translated: None,
        summary_translated: None,
        body_translated: None,
        published_at,
        fetched_at: record.fetched_at,
        raw_payload: Some(Value::Object(record.fields.clone()).to_string()),
    })
}

#[derive(Debug, Default)]
struct FilterBounds {
    min_price: Option<f64>,
    max_price: Option<f64>,
    tick_size: Option<f64>,
    min_qty: Option<f64>,
    max_qty: Option<f64>,
    step_size: Option<f64>,
}

impl FilterBounds {
    /// Scan the `filters` array for `PRICE_FILTER` and `LOT_SIZE` entries.
    fn from_fields(record: &RawRecord) -> Self {
        let mut bounds = Self::default();
        let Some(filters) = record.fields.get("filters").and_then(Value::as_array) else {
            return bounds;
        };
        for f in filters {
            match f.get("filterType").and_then(Value::as_str) {
                Some("PRICE_FILTER") => {
                    bounds.min_price = f.get("minPrice").and_then(lenient_f64);
                    bounds.max_price = f.get("maxPrice").and_then(lenient_f64);
                    bounds.tick_size = f.get("tickSize").and_then(lenient_f64);
                }
                Some("LOT_SIZE") => {
                    bounds.min_qty = f.get("minQty").and_then(lenient_f64);
                    bounds.max_qty = f.get("maxQty").and_then(lenient_f64);
                    bounds.step_size = f.get("stepSize").and_then(lenient_f64);
                }
                _ => {}
            }
        }
        bounds
    }
}

/// Providers send numeric limits as either numbers or quoted strings.
fn lenient_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First non-empty string among aliases.
fn first_str<'a>(record: &'a RawRecord, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| record.str_field(k).map(str::trim).filter(|s| !s.is_empty()))
}

/// Precision fields arrive as numbers ("8") on spot and strings on some
/// contract payloads; store them textually either way.
fn text_field(record: &RawRecord, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match record.fields.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Published timestamps come as unix seconds (number or digit string),
/// RFC 3339, RFC 2822, or a bare `%Y-%m-%d %H:%M:%S`.
fn parse_published(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => DateTime::from_timestamp(n.as_f64()? as i64, 0),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if s.chars().all(|c| c.is_ascii_digit()) {
                return DateTime::from_timestamp(s.parse().ok()?, 0);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Some(dt) = parse_rfc2822(s) {
                return Some(dt);
            }
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|n| n.and_utc())
        }
        _ => None,
    }
}

fn parse_rfc2822(s: &str) -> Option<DateTime<Utc>> {
    use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};
    OffsetDateTime::parse(s, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Decode HTML entities, strip tags, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
