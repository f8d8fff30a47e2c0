// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod freshness;
pub mod ingest;
pub mod metrics;
pub mod store;
pub mod translate;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::config::AppConfig;
pub use crate::ingest::coordinator::{
    AdapterFactory, ConfigAdapterFactory, Coordinator, Freshness,
};
pub use crate::ingest::types::{
    Article, Entity, IngestError, IngestReport, MarketPair, PairKind, RawRecord, Scope,
    SourceAdapter,
};
pub use crate::store::Store;
pub use crate::translate::Translator;
