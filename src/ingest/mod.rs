// src/ingest/mod.rs
pub mod coordinator;
pub mod normalize;
pub mod providers;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_records_total",
            "Raw records parsed out of source payloads."
        );
        describe_counter!("ingest_written_total", "Entities upserted into the store.");
        describe_counter!(
            "ingest_rejected_total",
            "Records dropped by normalization (missing key fields)."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Records collapsed onto an earlier natural key in the same run."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Source fetch/parse errors."
        );
        describe_counter!(
            "ingest_store_failures_total",
            "Rows whose individual upsert failed inside a batch."
        );
        describe_counter!(
            "ingest_joined_total",
            "Callers that joined an already running ingestion."
        );
        describe_counter!(
            "ingest_runs_total",
            "Ingestion runs by scope and outcome."
        );
        describe_counter!("freshness_fresh_total", "Gated reads served from fresh data.");
        describe_counter!(
            "freshness_stale_total",
            "Gated reads that found the scope stale."
        );
        describe_histogram!("ingest_parse_ms", "Source payload parse time in milliseconds.");
        describe_histogram!("ingest_run_ms", "End-to-end ingestion run time in milliseconds.");
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts of the last completed run per scope."
        );
    });
}
