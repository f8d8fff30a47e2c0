// src/ingest/coordinator.rs
//
// One ingestion run per scope at a time. The first caller for a stale scope
// leads the run; concurrent callers for the same scope await the leader's
// outcome over a watch channel instead of stacking upstream fetches.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::{AppConfig, CacheConfig, NewsSourceKind};
use crate::freshness::is_fresh;
use crate::ingest::normalize::{normalize_article, normalize_pair};
use crate::ingest::providers::{ExchangeRestAdapter, NewsApiAdapter, NewsRssAdapter};
use crate::ingest::types::{
    Entity, FetchOutcome, IngestError, IngestReport, RawRecord, Scope, SourceAdapter, SourceError,
};
use crate::store::Store;

type RunResult = Result<IngestReport, IngestError>;

/// Resolves a scope to the adapters that feed it.
///
/// A trait seam so tests can substitute scripted sources for real HTTP.
pub trait AdapterFactory: Send + Sync {
    fn adapters_for(&self, scope: &Scope) -> Result<Vec<Arc<dyn SourceAdapter>>, IngestError>;
}

/// Production factory: adapters built once from configuration, shared
/// across runs so HTTP connection pools are reused.
pub struct ConfigAdapterFactory {
    exchanges: HashMap<String, Arc<ExchangeRestAdapter>>,
    news: Vec<Arc<dyn SourceAdapter>>,
}

// News upstreams get a single attempt per run, like the exchange path
// before retries were made configurable. A missed run is recovered by the
// next refresh.
const NEWS_RETRY_COUNT: u32 = 1;

impl ConfigAdapterFactory {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let mut exchanges = HashMap::new();
        for ex in &config.exchanges {
            exchanges.insert(ex.name.clone(), Arc::new(ExchangeRestAdapter::from_config(ex)?));
        }
        let mut news: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        for src in &config.news.sources {
            let adapter: Arc<dyn SourceAdapter> = match src.kind {
                NewsSourceKind::Api => Arc::new(NewsApiAdapter::from_config(src, NEWS_RETRY_COUNT)?),
                NewsSourceKind::Rss => Arc::new(NewsRssAdapter::from_config(src, NEWS_RETRY_COUNT)?),
            };
            news.push(adapter);
        }
        Ok(Self { exchanges, news })
    }
}

impl AdapterFactory for ConfigAdapterFactory {
    fn adapters_for(&self, scope: &Scope) -> Result<Vec<Arc<dyn SourceAdapter>>, IngestError> {
        match scope {
            Scope::Pairs { provider, .. } => match self.exchanges.get(provider) {
                Some(adapter) => Ok(vec![adapter.clone() as Arc<dyn SourceAdapter>]),
                None => Err(IngestError::UnknownScope(provider.clone())),
            },
            Scope::News => Ok(self.news.clone()),
        }
    }
}

/// Outcome of a gated read: either the stored data was already fresh, or a
/// run happened (ours or one we joined) and this is its report.
#[derive(Debug)]
pub enum Freshness {
    Fresh,
    Refreshed(IngestReport),
}

pub struct Coordinator {
    store: Arc<Store>,
    factory: Arc<dyn AdapterFactory>,
    cache: CacheConfig,
    inflight: Mutex<HashMap<Scope, watch::Receiver<Option<RunResult>>>>,
}

impl Coordinator {
    pub fn new(store: Arc<Store>, factory: Arc<dyn AdapterFactory>, cache: CacheConfig) -> Self {
        crate::ingest::ensure_metrics_described();
        Self {
            store,
            factory,
            cache,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn ttl_secs(&self, scope: &Scope) -> u64 {
        match scope {
            Scope::Pairs { .. } => self.cache.pairs_ttl_secs,
            Scope::News => self.cache.news_ttl_secs,
        }
    }

    /// Freshness-gated entry point for reads: runs (or joins) an ingestion
    /// only when the scope watermark is older than the scope's TTL.
    pub async fn ensure_fresh(&self, scope: Scope) -> Result<Freshness, IngestError> {
        let watermark = self
            .store
            .watermark(&scope)
            .map_err(|e| IngestError::Store {
                scope: scope.clone(),
                message: e.to_string(),
            })?;
        if is_fresh(watermark, self.ttl_secs(&scope), Utc::now()) {
            tracing::debug!(%scope, "scope fresh, serving stored data");
            counter!("freshness_fresh_total", "scope" => scope.to_string()).increment(1);
            return Ok(Freshness::Fresh);
        }
        counter!("freshness_stale_total", "scope" => scope.to_string()).increment(1);
        let report = self.join_or_run(scope).await?;
        Ok(Freshness::Refreshed(report))
    }

    /// Unconditional ingestion, used by the manual triggers and the startup
    /// hook. Still single-flight: a concurrent trigger joins the running
    /// ingestion instead of racing it.
    pub async fn refresh(&self, scope: Scope) -> RunResult {
        self.join_or_run(scope).await
    }

    async fn join_or_run(&self, scope: Scope) -> RunResult {
        enum Role {
            Leader(watch::Sender<Option<RunResult>>),
            Waiter(watch::Receiver<Option<RunResult>>),
        }

        let role = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&scope) {
                Some(rx) => Role::Waiter(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(scope.clone(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Leader(tx) => {
                // Guard keeps the inflight table clean even if the run
                // panics or the leading task is dropped mid-await.
                let guard = InflightGuard {
                    inflight: &self.inflight,
                    scope: &scope,
                };
                let result = self.run_ingest(&scope).await;
                drop(guard);
                let _ = tx.send(Some(result.clone()));
                result
            }
            Role::Waiter(mut rx) => {
                counter!("ingest_joined_total", "scope" => scope.to_string()).increment(1);
                tracing::debug!(%scope, "joining in-flight ingestion");
                loop {
                    {
                        let published = rx.borrow_and_update();
                        if let Some(result) = published.as_ref() {
                            return result.clone();
                        }
                    }
                    if rx.changed().await.is_err() {
                        // Sender gone. Either it published right before
                        // dropping, or the run was torn down.
                        let last = rx.borrow();
                        return match last.as_ref() {
                            Some(result) => result.clone(),
                            None => Err(IngestError::Cancelled { scope }),
                        };
                    }
                }
            }
        }
    }

    async fn run_ingest(&self, scope: &Scope) -> RunResult {
        let t0 = std::time::Instant::now();
        let adapters = self.factory.adapters_for(scope)?;
        let mut report = IngestReport::empty(scope.clone());
        if adapters.is_empty() {
            tracing::info!(%scope, "no sources configured, nothing to ingest");
            return Ok(report);
        }

        let mut raw: Vec<RawRecord> = Vec::new();
        for adapter in &adapters {
            let FetchOutcome { records, error } = adapter.fetch().await;
            match error {
                None => report.sources_ok += 1,
                Some(message) => {
                    tracing::warn!(source = adapter.name(), error = %message, "source degraded");
                    counter!("ingest_provider_errors_total", "source" => adapter.name().to_string())
                        .increment(1);
                    report.source_errors.push(SourceError {
                        source: adapter.name().to_string(),
                        message,
                    });
                }
            }
            raw.extend(records);
        }
        report.records = raw.len();

        // Partial degradation still persists whatever arrived; only a run
        // with nothing at all to show fails outright.
        if report.sources_ok == 0 && raw.is_empty() {
            counter!("ingest_runs_total", "scope" => scope.to_string(), "outcome" => "all_failed")
                .increment(1);
            return Err(IngestError::AllSourcesFailed {
                scope: scope.clone(),
                errors: report.source_errors.clone(),
            });
        }

        let mut seen = HashSet::with_capacity(raw.len());
        let mut entities = Vec::with_capacity(raw.len());
        for record in &raw {
            let normalized = match scope {
                Scope::Pairs { .. } => normalize_pair(record).map(Entity::Pair),
                Scope::News => normalize_article(record).map(Entity::Article),
            };
            match normalized {
                Ok(entity) => {
                    if seen.insert(entity.natural_key()) {
                        entities.push(entity);
                    } else {
                        report.deduped += 1;
                    }
                }
                Err(reason) => {
                    tracing::debug!(source = %record.provider, error = %reason, "record rejected");
                    report.rejected += 1;
                }
            }
        }
        counter!("ingest_rejected_total").increment(report.rejected as u64);
        counter!("ingest_dedup_total").increment(report.deduped as u64);

        match self.store.upsert_batch(&entities) {
            Ok(batch) => {
                report.written = batch.written;
                report.store_failures = batch.failed;
            }
            Err(e) => {
                tracing::error!(%scope, error = %e, "persisting ingest batch failed");
                counter!("ingest_runs_total", "scope" => scope.to_string(), "outcome" => "store_error")
                    .increment(1);
                return Err(IngestError::Store {
                    scope: scope.clone(),
                    message: e.to_string(),
                });
            }
        }

        counter!("ingest_written_total").increment(report.written as u64);
        counter!("ingest_store_failures_total").increment(report.store_failures as u64);
        counter!("ingest_runs_total", "scope" => scope.to_string(), "outcome" => "ok").increment(1);
        gauge!("ingest_last_run_ts", "scope" => scope.to_string()).set(Utc::now().timestamp() as f64);
        histogram!("ingest_run_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        tracing::info!(
            %scope,
            records = report.records,
            written = report.written,
            rejected = report.rejected,
            deduped = report.deduped,
            sources_failed = report.source_errors.len(),
            "ingest run complete"
        );
        Ok(report)
    }
}

struct InflightGuard<'a> {
    inflight: &'a Mutex<HashMap<Scope, watch::Receiver<Option<RunResult>>>>,
    scope: &'a Scope,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.lock().remove(self.scope);
    }
}
