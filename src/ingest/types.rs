// src/ingest/types.rs
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record as returned by a provider, before normalization. The `fields`
/// mapping keeps the provider's own field names; adapters only add what the
/// wire format implies (e.g. the market kind of an `exchangeInfo` section).
/// Ephemeral: lives for a single ingestion pass.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RawRecord {
    pub fn new(provider: &str, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            provider: provider.to_string(),
            fetched_at: Utc::now(),
            fields,
        }
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

/// Market kind of a trading pair. Part of the pair's natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairKind {
    Spot,
    Contract,
}

impl PairKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairKind::Spot => "spot",
            PairKind::Contract => "contract",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spot" => Some(PairKind::Spot),
            "contract" => Some(PairKind::Contract),
            _ => None,
        }
    }
}

impl fmt::Display for PairKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized trading-pair description. Natural key: `(provider, symbol, kind)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPair {
    pub provider: String,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: PairKind,
    /// Precisions stay textual: providers report either digit counts ("8")
    /// or step sizes ("0.0001").
    pub base_precision: Option<String>,
    pub quote_precision: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub tick_size: Option<f64>,
    pub min_qty: Option<f64>,
    pub max_qty: Option<f64>,
    pub step_size: Option<f64>,
    /// Serialized provider payload kept alongside the row for audit/debug.
    pub raw_payload: Option<String>,
}

/// Normalized news article. Natural key: `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Display name of the feed the article came from.
    pub source: String,
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub body: Option<String>,
    pub title_translated: Option<String>,
    pub summary_translated: Option<String>,
    pub body_translated: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub raw_payload: Option<String>,
}

/// Canonical entity produced by the normalizer and consumed by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Pair(MarketPair),
    Article(Article),
}

/// Business key used for upsert matching and in-batch deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    Pair {
        provider: String,
        symbol: String,
        kind: PairKind,
    },
    Article {
        url: String,
    },
}

impl Entity {
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            Entity::Pair(p) => NaturalKey::Pair {
                provider: p.provider.clone(),
                symbol: p.symbol.clone(),
                kind: p.kind,
            },
            Entity::Article(a) => NaturalKey::Article { url: a.url.clone() },
        }
    }
}

/// Unit of freshness and ingestion granularity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One provider's pairs, optionally narrowed to a market kind.
    Pairs {
        provider: String,
        kind: Option<PairKind>,
    },
    /// All configured news sources as a single unit.
    News,
}

impl Scope {
    pub fn pairs(provider: &str, kind: Option<PairKind>) -> Self {
        Scope::Pairs {
            provider: provider.to_lowercase(),
            kind,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Pairs { provider, kind } => match kind {
                Some(k) => write!(f, "pairs:{provider}:{k}"),
                None => write!(f, "pairs:{provider}"),
            },
            Scope::News => f.write_str("news:all"),
        }
    }
}

/// What one adapter produced: as many records as it could obtain, plus a
/// descriptive error if the call ultimately failed. Partial degradation is
/// records AND an error together.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn ok(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            error: None,
        }
    }

    pub fn failed(err: impl fmt::Display) -> Self {
        Self {
            records: Vec::new(),
            error: Some(err.to_string()),
        }
    }

    pub fn partial(records: Vec<RawRecord>, err: impl fmt::Display) -> Self {
        Self {
            records,
            error: Some(err.to_string()),
        }
    }
}

/// A polymorphic capability over one external provider. Each variant knows its
/// own wire format and maps it into provider-agnostic [`RawRecord`]s. Adapters
/// handle their own transport retries and never write to storage.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> FetchOutcome;
}

/// One source's failure inside an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub source: String,
    pub message: String,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Outcome of one ingestion run, shared by the leader and every joined waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub scope: Scope,
    /// Raw records obtained across all sources.
    pub records: usize,
    /// Entities durably upserted.
    pub written: usize,
    /// Records dropped by the normalizer.
    pub rejected: usize,
    /// Records dropped as in-batch duplicates of an already-seen natural key.
    pub deduped: usize,
    /// Entities whose individual upsert failed.
    pub store_failures: usize,
    /// Sources that completed without error.
    pub sources_ok: usize,
    pub source_errors: Vec<SourceError>,
}

impl IngestReport {
    pub fn empty(scope: Scope) -> Self {
        Self {
            scope,
            records: 0,
            written: 0,
            rejected: 0,
            deduped: 0,
            store_failures: 0,
            sources_ok: 0,
            source_errors: Vec::new(),
        }
    }
}

/// Errors surfaced to ingestion callers. Per-source and per-record problems
/// are absorbed into the [`IngestReport`]; only these reach the trigger.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IngestError {
    /// Every adapter in the scope failed and nothing was obtained. The scope
    /// watermark is untouched, so the next gated read retries.
    #[error("all sources failed for {scope}: {}", format_source_errors(.errors))]
    AllSourcesFailed {
        scope: Scope,
        errors: Vec<SourceError>,
    },
    /// The leading run was dropped before publishing (process teardown).
    #[error("ingestion run for {scope} was cancelled")]
    Cancelled { scope: Scope },
    /// The scope cannot be ingested as configured (e.g. unknown provider).
    #[error("no sources configured for {0}")]
    UnknownScope(String),
    /// The batch transaction itself failed. Carried as text so the error
    /// stays cloneable for every waiter of the run.
    #[error("persisting batch for {scope}: {message}")]
    Store { scope: Scope, message: String },
}

fn format_source_errors(errors: &[SourceError]) -> String {
    let mut by_source: BTreeMap<&str, &str> = BTreeMap::new();
    for e in errors {
        by_source.entry(e.source.as_str()).or_insert(&e.message);
    }
    by_source
        .iter()
        .map(|(s, m)| format!("{s} ({m})"))
        .collect::<Vec<_>>()
        .join("; ")
}
