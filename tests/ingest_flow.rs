// tests/ingest_flow.rs
//
// Coordinator behavior over scripted sources and an in-memory store.
//
// Covered:
// - partial source degradation still persists and advances the watermark
// - total source failure reports AllSourcesFailed and leaves the watermark
// - rejection and in-batch dedup counting
// - empty adapter set is an empty success
// - unknown scope resolution
// - the freshness gate skips the fetch while the scope is fresh

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use exchange_gateway::config::CacheConfig;
use exchange_gateway::ingest::coordinator::{AdapterFactory, Coordinator, Freshness};
use exchange_gateway::ingest::types::{
    FetchOutcome, IngestError, PairKind, RawRecord, Scope, SourceAdapter,
};
use exchange_gateway::store::Store;

fn one_hour_ttls() -> CacheConfig {
    CacheConfig {
        pairs_ttl_secs: 3_600,
        news_ttl_secs: 3_600,
    }
}

fn pair_record(provider: &str, symbol: &str) -> RawRecord {
    let fields = json!({
        "symbol": symbol,
        "baseAsset": "BTC",
        "quoteAsset": "USDT",
        "status": "TRADING",
        "type": "spot",
    });
    let serde_json::Value::Object(map) = fields else {
        unreachable!()
    };
    RawRecord::new(provider, map)
}

/// Record without a symbol: the normalizer must reject it.
fn broken_record(provider: &str) -> RawRecord {
    let fields = json!({ "type": "spot", "baseAsset": "BTC" });
    let serde_json::Value::Object(map) = fields else {
        unreachable!()
    };
    RawRecord::new(provider, map)
}

enum Script {
    Symbols(Vec<&'static str>),
    Fail(&'static str),
    Broken,
}

struct ScriptedAdapter {
    name: &'static str,
    script: Script,
    fetches: AtomicUsize,
}

impl ScriptedAdapter {
    fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self) -> FetchOutcome {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Symbols(symbols) => FetchOutcome::ok(
                symbols
                    .iter()
                    .map(|s| pair_record(self.name, s))
                    .collect(),
            ),
            Script::Fail(msg) => FetchOutcome::failed(msg),
            Script::Broken => FetchOutcome::ok(vec![broken_record(self.name)]),
        }
    }
}

struct FixedFactory {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl FixedFactory {
    fn new(adapters: Vec<Arc<dyn SourceAdapter>>) -> Arc<Self> {
        Arc::new(Self { adapters })
    }
}

impl AdapterFactory for FixedFactory {
    fn adapters_for(&self, _scope: &Scope) -> Result<Vec<Arc<dyn SourceAdapter>>, IngestError> {
        Ok(self.adapters.clone())
    }
}

fn coordinator_with(adapters: Vec<Arc<dyn SourceAdapter>>) -> (Coordinator, Arc<Store>) {
    let store = Arc::new(Store::open_in_memory().expect("in-memory store"));
    let coordinator = Coordinator::new(store.clone(), FixedFactory::new(adapters), one_hour_ttls());
    (coordinator, store)
}

#[tokio::test]
async fn partial_failure_persists_and_advances_watermark() {
    let good = ScriptedAdapter::new(
        "acme",
        Script::Symbols(vec!["BTCUSDT", "ETHUSDT", "SOLUSDT", "DOGEUSDT", "XRPUSDT"]),
    );
    let bad = ScriptedAdapter::new("acme-mirror", Script::Fail("503 from upstream"));
    let (coordinator, store) = coordinator_with(vec![good.clone(), bad]);

    let scope = Scope::pairs("acme", Some(PairKind::Spot));
    let report = coordinator.refresh(scope.clone()).await.expect("run ok");

    assert_eq!(report.written, 5);
    assert_eq!(report.sources_ok, 1);
    assert_eq!(report.source_errors.len(), 1);
    assert_eq!(report.source_errors[0].source, "acme-mirror");
    assert!(
        store.watermark(&scope).expect("watermark query").is_some(),
        "watermark must advance after a partially degraded run"
    );
}

#[tokio::test]
async fn all_sources_failed_leaves_watermark_untouched() {
    let a = ScriptedAdapter::new("feed-a", Script::Fail("timeout"));
    let b = ScriptedAdapter::new("feed-b", Script::Fail("connection refused"));
    let (coordinator, store) = coordinator_with(vec![a, b]);

    let scope = Scope::pairs("acme", None);
    let err = coordinator
        .refresh(scope.clone())
        .await
        .expect_err("run must fail");

    match err {
        IngestError::AllSourcesFailed { errors, .. } => assert_eq!(errors.len(), 2),
        other => panic!("expected AllSourcesFailed, got {other:?}"),
    }
    assert_eq!(store.watermark(&scope).expect("watermark query"), None);
}

#[tokio::test]
async fn rejects_and_duplicates_are_counted_not_fatal() {
    let noisy = ScriptedAdapter::new(
        "acme",
        Script::Symbols(vec!["BTCUSDT", "BTCUSDT", "ETHUSDT"]),
    );
    let broken = ScriptedAdapter::new("acme-alt", Script::Broken);
    let (coordinator, _store) = coordinator_with(vec![noisy, broken]);

    let report = coordinator
        .refresh(Scope::pairs("acme", None))
        .await
        .expect("run ok");

    assert_eq!(report.records, 4);
    assert_eq!(report.written, 2, "BTCUSDT and ETHUSDT");
    assert_eq!(report.deduped, 1);
    assert_eq!(report.rejected, 1);
    assert!(report.source_errors.is_empty());
}

#[tokio::test]
async fn empty_adapter_set_is_an_empty_success() {
    let (coordinator, _store) = coordinator_with(vec![]);
    let report = coordinator
        .refresh(Scope::News)
        .await
        .expect("empty run ok");
    assert_eq!(report.written, 0);
    assert!(report.source_errors.is_empty());
}

#[tokio::test]
async fn unknown_scope_surfaces_configuration_error() {
    struct StrictFactory;
    impl AdapterFactory for StrictFactory {
        fn adapters_for(
            &self,
            scope: &Scope,
        ) -> Result<Vec<Arc<dyn SourceAdapter>>, IngestError> {
            match scope {
                Scope::Pairs { provider, .. } => Err(IngestError::UnknownScope(provider.clone())),
                Scope::News => Ok(vec![]),
            }
        }
    }

    let store = Arc::new(Store::open_in_memory().expect("in-memory store"));
    let coordinator = Coordinator::new(store, Arc::new(StrictFactory), one_hour_ttls());
    let err = coordinator
        .refresh(Scope::pairs("nope", None))
        .await
        .expect_err("must fail");
    assert!(matches!(err, IngestError::UnknownScope(name) if name == "nope"));
}

#[tokio::test]
async fn fresh_scope_serves_without_fetching() {
    let adapter = ScriptedAdapter::new("acme", Script::Symbols(vec!["BTCUSDT"]));
    let (coordinator, _store) = coordinator_with(vec![adapter.clone()]);
    let scope = Scope::pairs("acme", Some(PairKind::Spot));

    // First gated read is stale and must fetch.
    match coordinator.ensure_fresh(scope.clone()).await.expect("gate") {
        Freshness::Refreshed(report) => assert_eq!(report.written, 1),
        Freshness::Fresh => panic!("empty store cannot be fresh"),
    }
    assert_eq!(adapter.fetches.load(Ordering::SeqCst), 1);

    // Second gated read inside the TTL window serves stored data.
    match coordinator.ensure_fresh(scope).await.expect("gate") {
        Freshness::Fresh => {}
        Freshness::Refreshed(_) => panic!("fresh scope must not refetch"),
    }
    assert_eq!(adapter.fetches.load(Ordering::SeqCst), 1);
}
