// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::types::PairKind;

pub const ENV_CONFIG_PATH: &str = "GATEWAY_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/gateway.toml";

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_db_path() -> String {
    "data/gateway.db".to_string()
}
fn default_ttl_secs() -> u64 {
    3_600
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_retry_count() -> u32 {
    3
}
fn default_news_timeout_secs() -> u64 {
    15
}
fn default_response_path() -> String {
    "Data".to_string()
}
fn default_target_lang() -> String {
    "zh-CN".to_string()
}
fn default_chunk_chars() -> usize {
    4_500
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path; `:memory:` keeps everything in-process.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Freshness windows, one per cache domain. Zero disables caching for
/// that domain: every gated read refetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub pairs_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub news_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pairs_ttl_secs: default_ttl_secs(),
            news_ttl_secs: default_ttl_secs(),
        }
    }
}

/// One `exchangeInfo`-style upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    pub base_url: String,
    /// Path of the exchange-information endpoint.
    pub info_path: String,
    /// Market kind of the response's `symbols` array. Futures endpoints list
    /// contracts there; a `contracts` array is always contract-kind.
    #[serde(default = "default_symbols_kind")]
    pub symbols_kind: PairKind,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsSourceKind {
    Api,
    Rss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSourceConfig {
    pub name: String,
    pub kind: NewsSourceKind,
    pub url: String,
    /// Dot-separated path to the article array in an API response body.
    #[serde(default = "default_response_path")]
    pub response_path: String,
    #[serde(default = "default_news_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Translation endpoint. Optional: the backfill trigger answers 503
    /// while this is unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    /// Upstreams reject very long inputs; longer texts are split into chunks
    /// of at most this many characters.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            target_lang: default_target_lang(),
            chunk_chars: default_chunk_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    #[serde(default = "default_news_sources")]
    pub sources: Vec<NewsSourceConfig>,
    /// Kick off one news ingestion in the background at startup.
    #[serde(default = "default_true")]
    pub refresh_on_startup: bool,
    /// Re-check news freshness on this period and ingest when stale.
    /// Zero leaves re-ingestion entirely to the manual trigger.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub translate: TranslateConfig,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            sources: default_news_sources(),
            refresh_on_startup: true,
            refresh_interval_secs: 0,
            translate: TranslateConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default = "default_exchanges")]
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub news: NewsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            exchanges: default_exchanges(),
            news: NewsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration:
    /// 1) $GATEWAY_CONFIG_PATH (error if set but missing)
    /// 2) config/gateway.toml
    /// 3) built-in defaults
    /// Environment overrides are applied on top either way.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from_file(&default)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.normalize();
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config at {}", path.display()))?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GATEWAY_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("GATEWAY_DB_PATH") {
            self.database.path = v;
        }
        if let Ok(v) = std::env::var("GATEWAY_CACHE_TTL_SECS") {
            if let Ok(ttl) = v.parse::<u64>() {
                // deployment-wide override, both domains
                self.cache.pairs_ttl_secs = ttl;
                self.cache.news_ttl_secs = ttl;
            }
        }
        if let Ok(v) = std::env::var("GATEWAY_TRANSLATE_URL") {
            self.news.translate.endpoint = Some(v);
        }
    }

    fn normalize(&mut self) {
        for ex in &mut self.exchanges {
            ex.name = ex.name.trim().to_lowercase();
        }
        self.exchanges.retain(|ex| !ex.name.is_empty());
        self.news.sources.retain(|s| !s.url.trim().is_empty());
        if let Some(endpoint) = &self.news.translate.endpoint {
            if endpoint.trim().is_empty() {
                self.news.translate.endpoint = None;
            }
        }
    }

    pub fn exchange(&self, name: &str) -> Option<&ExchangeConfig> {
        let wanted = name.trim().to_lowercase();
        self.exchanges.iter().find(|ex| ex.name == wanted)
    }
}

fn default_symbols_kind() -> PairKind {
    PairKind::Spot
}

fn default_exchanges() -> Vec<ExchangeConfig> {
    let mk = |name: &str, base_url: &str, info_path: &str, kind: PairKind| ExchangeConfig {
        name: name.to_string(),
        base_url: base_url.to_string(),
        info_path: info_path.to_string(),
        symbols_kind: kind,
        timeout_secs: default_timeout_secs(),
        retry_count: default_retry_count(),
    };
    vec![
        mk(
            "toobit",
            "https://api.toobit.com",
            "/api/v1/exchangeInfo",
            PairKind::Spot,
        ),
        mk(
            "binance",
            "https://api.binance.com",
            "/api/v3/exchangeInfo",
            PairKind::Spot,
        ),
        mk(
            "binance_usdm",
            "https://fapi.binance.com",
            "/fapi/v1/exchangeInfo",
            PairKind::Contract,
        ),
        mk(
            "binance_coinm",
            "https://dapi.binance.com",
            "/dapi/v1/exchangeInfo",
            PairKind::Contract,
        ),
    ]
}

fn default_news_sources() -> Vec<NewsSourceConfig> {
    vec![
        NewsSourceConfig {
            name: "CryptoCompare".to_string(),
            kind: NewsSourceKind::Api,
            url: "https://min-api.cryptocompare.com/data/v2/news/?lang=EN".to_string(),
            response_path: default_response_path(),
            timeout_secs: default_news_timeout_secs(),
        },
        NewsSourceConfig {
            name: "CoinDesk".to_string(),
            kind: NewsSourceKind::Rss,
            url: "https://www.coindesk.com/arc/outboundfeeds/rss/".to_string(),
            response_path: default_response_path(),
            timeout_secs: default_news_timeout_secs(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.cache.pairs_ttl_secs, 3_600);
        assert_eq!(cfg.cache.news_ttl_secs, 3_600);
        assert_eq!(cfg.exchanges.len(), 4);
        assert_eq!(cfg.news.sources.len(), 2);
        assert!(cfg.news.refresh_on_startup);
        assert_eq!(cfg.news.refresh_interval_secs, 0);
        assert!(cfg.news.translate.endpoint.is_none());
        assert_eq!(cfg.news.translate.target_lang, "zh-CN");
        assert_eq!(cfg.news.translate.chunk_chars, 4_500);
    }

    #[test]
    fn exchange_lookup_is_case_insensitive() {
        let mut cfg = AppConfig::default();
        cfg.normalize();
        assert!(cfg.exchange("Toobit").is_some());
        assert!(cfg.exchange(" BINANCE_USDM ").is_some());
        assert!(cfg.exchange("kraken").is_none());
        assert_eq!(
            cfg.exchange("binance_usdm").unwrap().symbols_kind,
            PairKind::Contract
        );
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [cache]
            pairs_ttl_secs = 60

            [news]
            refresh_interval_secs = 900

            [[exchanges]]
            name = "Demo"
            base_url = "http://127.0.0.1:9999"
            info_path = "/api/v1/exchangeInfo"

            [news.translate]
            endpoint = "http://127.0.0.1:5000/translate"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.cache.pairs_ttl_secs, 60);
        assert_eq!(cfg.cache.news_ttl_secs, 3_600);
        assert_eq!(cfg.news.refresh_interval_secs, 900);
        assert_eq!(cfg.exchanges.len(), 1);
        assert_eq!(cfg.exchanges[0].symbols_kind, PairKind::Spot);
        assert_eq!(cfg.exchanges[0].retry_count, 3);
        assert_eq!(
            cfg.news.translate.endpoint.as_deref(),
            Some("http://127.0.0.1:5000/translate")
        );
        assert_eq!(cfg.news.translate.chunk_chars, 4_500);
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_beat_file_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gateway.toml");
        fs::write(&path, "[server]\nport = 9000\n").unwrap();

        std::env::set_var(ENV_CONFIG_PATH, path.display().to_string());
        std::env::set_var("GATEWAY_PORT", "9100");
        std::env::set_var("GATEWAY_CACHE_TTL_SECS", "120");
        let cfg = AppConfig::load().unwrap();
        std::env::remove_var(ENV_CONFIG_PATH);
        std::env::remove_var("GATEWAY_PORT");
        std::env::remove_var("GATEWAY_CACHE_TTL_SECS");

        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.cache.pairs_ttl_secs, 120);
        assert_eq!(cfg.cache.news_ttl_secs, 120);
    }

    #[serial_test::serial]
    #[test]
    fn missing_env_path_is_an_error() {
        std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
        let err = AppConfig::load();
        std::env::remove_var(ENV_CONFIG_PATH);
        assert!(err.is_err());
    }
}
