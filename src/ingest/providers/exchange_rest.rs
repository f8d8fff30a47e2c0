// src/ingest/providers/exchange_rest.rs
use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;

use crate::config::ExchangeConfig;
use crate::ingest::types::{FetchOutcome, PairKind, RawRecord, SourceAdapter};

/// REST adapter for `exchangeInfo`-style endpoints (Binance dialect).
/// One instance per configured exchange.
pub struct ExchangeRestAdapter {
    name: String,
    url: String,
    symbols_kind: PairKind,
    retry_count: u32,
    client: reqwest::Client,
}

impl ExchangeRestAdapter {
    pub fn from_config(cfg: &ExchangeConfig) -> Result<Self> {
        Ok(Self {
            name: cfg.name.clone(),
            url: format!("{}{}", cfg.base_url.trim_end_matches('/'), cfg.info_path),
            symbols_kind: cfg.symbols_kind,
            retry_count: cfg.retry_count,
            client: super::build_client(cfg.timeout_secs)?,
        })
    }

    /// Flatten an `exchangeInfo` body into raw records. The `symbols` array
    /// carries `symbols_kind` markets; a `contracts` array (Toobit) is always
    /// contract-kind. Non-TRADING rows and internal `TBV` contracts are
    /// dropped here, not in the normalizer: only the adapter knows this
    /// dialect.
    pub fn parse_payload(name: &str, symbols_kind: PairKind, body: &Value) -> Vec<RawRecord> {
        let t0 = std::time::Instant::now();
        let mut out = Vec::new();
        collect_section(name, body.get("symbols"), symbols_kind, &mut out);
        collect_section(name, body.get("contracts"), PairKind::Contract, &mut out);

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_records_total", "source" => name.to_string())
            .increment(out.len() as u64);
        out
    }
}

fn collect_section(name: &str, section: Option<&Value>, kind: PairKind, out: &mut Vec<RawRecord>) {
    let Some(items) = section.and_then(Value::as_array) else {
        return;
    };
    for item in items {
        let Some(obj) = item.as_object() else { continue };
        let status = obj
            .get("contractStatus")
            .or_else(|| obj.get("status"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !status.eq_ignore_ascii_case("TRADING") {
            continue;
        }
        if kind == PairKind::Contract {
            let symbol = obj.get("symbol").and_then(Value::as_str).unwrap_or_default();
            if symbol.starts_with("TBV_") || symbol.starts_with("TBV-") {
                continue;
            }
        }
        let mut fields = obj.clone();
        fields.insert(
            "type".to_string(),
            Value::String(kind.as_str().to_string()),
        );
        out.push(RawRecord::new(name, fields));
    }
}

#[async_trait]
impl SourceAdapter for ExchangeRestAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> FetchOutcome {
        match super::get_json(&self.client, &self.url, self.retry_count).await {
            Ok(body) => {
                FetchOutcome::ok(Self::parse_payload(&self.name, self.symbols_kind, &body))
            }
            Err(e) => {
                tracing::warn!(error = ?e, source = %self.name, "exchange fetch failed");
                FetchOutcome::failed(format!("{e:#}"))
            }
        }
    }
}
