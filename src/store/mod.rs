// src/store/mod.rs
//
// SQLite persistence for normalized entities. The store owns every persisted
// row; callers go through upsert/list/watermark and never touch SQL.
//
// Upserts are keyed on the natural key, not the rowid: `ON CONFLICT DO
// UPDATE` keeps `created_at` and the row id stable across re-ingestion.
// Timestamps are unix microseconds stored as INTEGER.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::ingest::types::{Article, Entity, MarketPair, PairKind, Scope};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// Article as persisted, with its surrogate id and row timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredArticle {
    pub id: i64,
    pub article: Article,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Counters from one `upsert_batch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub written: usize,
    pub failed: usize,
}

/// Thread-safe handle over one SQLite database.
///
/// Interior mutability (Mutex) because handlers share the store behind an
/// `Arc`. Access is short-lived; contention is not a concern at this rate.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:")
    }

    /// Upsert a batch of entities in one transaction. A single failing row is
    /// logged and counted, not fatal; the rest of the batch still commits.
    /// Every row in the batch carries the same `updated_at` stamp, so the
    /// scope watermark becomes visible atomically with the data.
    pub fn upsert_batch(&self, entities: &[Entity]) -> Result<BatchResult, StoreError> {
        if entities.is_empty() {
            return Ok(BatchResult::default());
        }
        let now = Utc::now().timestamp_micros();
        let mut result = BatchResult::default();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for entity in entities {
            let outcome = match entity {
                Entity::Pair(p) => upsert_pair(&tx, p, now),
                Entity::Article(a) => upsert_article(&tx, a, now),
            };
            match outcome {
                Ok(()) => result.written += 1,
                Err(e) => {
                    tracing::warn!(error = %e, key = ?entity.natural_key(), "upsert failed");
                    result.failed += 1;
                }
            }
        }
        tx.commit()?;
        Ok(result)
    }

    /// Most recent `updated_at` among the scope's rows. `None` means the
    /// scope has never been ingested.
    pub fn watermark(&self, scope: &Scope) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn.lock();
        let micros: Option<i64> = match scope {
            Scope::Pairs {
                provider,
                kind: Some(kind),
            } => conn.query_row(
                "SELECT MAX(updated_at) FROM exchange_symbols WHERE exchange = ?1 AND type = ?2",
                params![provider, kind.as_str()],
                |row| row.get(0),
            )?,
            Scope::Pairs {
                provider,
                kind: None,
            } => conn.query_row(
                "SELECT MAX(updated_at) FROM exchange_symbols WHERE exchange = ?1",
                params![provider],
                |row| row.get(0),
            )?,
            Scope::News => conn.query_row(
                "SELECT MAX(updated_at) FROM news_articles",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(micros.and_then(DateTime::from_timestamp_micros))
    }

    pub fn list_pairs(
        &self,
        provider: &str,
        kind: Option<PairKind>,
    ) -> Result<Vec<MarketPair>, StoreError> {
        let conn = self.conn.lock();
        let mut out = Vec::new();
        match kind {
            Some(k) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {PAIR_COLS} FROM exchange_symbols \
                     WHERE exchange = ?1 AND type = ?2 ORDER BY symbol"
                ))?;
                let rows = stmt.query_map(params![provider, k.as_str()], pair_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {PAIR_COLS} FROM exchange_symbols \
                     WHERE exchange = ?1 ORDER BY symbol"
                ))?;
                let rows = stmt.query_map(params![provider], pair_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    /// Newest first: by publication time, then by insertion time. SQLite
    /// sorts NULL last under DESC, so undated articles sink to the end.
    pub fn list_articles(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<StoredArticle>, u64), StoreError> {
        let conn = self.conn.lock();
        let total: u64 = conn.query_row("SELECT COUNT(*) FROM news_articles", [], |row| {
            row.get::<_, i64>(0)
        })? as u64;

        let offset = u64::from(page.saturating_sub(1)) * u64::from(page_size);
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ARTICLE_COLS} FROM news_articles \
             ORDER BY published_at DESC, created_at DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![page_size, offset as i64], article_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok((out, total))
    }

    pub fn get_article(&self, id: i64) -> Result<Option<StoredArticle>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ARTICLE_COLS} FROM news_articles WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], article_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Articles still lacking a translated title, newest rows first.
    pub fn articles_missing_translation(
        &self,
        limit: u32,
    ) -> Result<Vec<StoredArticle>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {ARTICLE_COLS} FROM news_articles \
             WHERE title_translated IS NULL ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], article_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Backfill translations for one article. Deliberately leaves
    /// `updated_at` alone: enrichment must not move the ingestion watermark.
    pub fn apply_translation(
        &self,
        id: i64,
        title: Option<&str>,
        summary: Option<&str>,
        body: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE news_articles \
             SET title_translated = ?2, summary_translated = ?3, body_translated = ?4 \
             WHERE id = ?1",
            params![id, title, summary, body],
        )?;
        Ok(())
    }
}

const PAIR_COLS: &str = "exchange, symbol, base_asset, quote_asset, status, type, \
     base_precision, quote_precision, min_price, max_price, tick_size, \
     min_qty, max_qty, step_size, raw_payload";

const ARTICLE_COLS: &str = "id, source, url, title, summary, body, title_translated, \
     summary_translated, body_translated, published_at, fetched_at, created_at, updated_at, \
     raw_payload";

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exchange_symbols (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            exchange TEXT NOT NULL,
            symbol TEXT NOT NULL,
            base_asset TEXT NOT NULL DEFAULT '',
            quote_asset TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            type TEXT NOT NULL DEFAULT 'spot',
            base_precision TEXT,
            quote_precision TEXT,
            min_price REAL,
            max_price REAL,
            tick_size REAL,
            min_qty REAL,
            max_qty REAL,
            step_size REAL,
            raw_payload TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(exchange, symbol, type)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_symbols_exchange_type \
         ON exchange_symbols(exchange, type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_symbols_updated ON exchange_symbols(updated_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS news_articles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            url TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            summary TEXT,
            body TEXT,
            title_translated TEXT,
            summary_translated TEXT,
            body_translated TEXT,
            published_at INTEGER,
            fetched_at INTEGER NOT NULL,
            raw_payload TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_news_published ON news_articles(published_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_news_created ON news_articles(created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_news_updated ON news_articles(updated_at)",
        [],
    )?;
    Ok(())
}

fn upsert_pair(conn: &Connection, pair: &MarketPair, now: i64) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO exchange_symbols (
            exchange, symbol, type, base_asset, quote_asset, status,
            base_precision, quote_precision, min_price, max_price, tick_size,
            min_qty, max_qty, step_size, raw_payload, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        ON CONFLICT(exchange, symbol, type) DO UPDATE SET
            base_asset = excluded.base_asset,
            quote_asset = excluded.quote_asset,
            status = excluded.status,
            base_precision = excluded.base_precision,
            quote_precision = excluded.quote_precision,
            min_price = excluded.min_price,
            max_price = excluded.max_price,
            tick_size = excluded.tick_size,
            min_qty = excluded.min_qty,
            max_qty = excluded.max_qty,
            step_size = excluded.step_size,
            raw_payload = excluded.raw_payload,
            updated_at = excluded.updated_at",
    )?;
    stmt.execute(params![
        pair.provider,
        pair.symbol,
        pair.kind.as_str(),
        pair.base_asset,
        pair.quote_asset,
        pair.status,
        pair.base_precision,
        pair.quote_precision,
        pair.min_price,
        pair.max_price,
        pair.tick_size,
        pair.min_qty,
        pair.max_qty,
        pair.step_size,
        pair.raw_payload,
        now,
        now,
    ])?;
    Ok(())
}

fn upsert_article(conn: &Connection, article: &Article, now: i64) -> rusqlite::Result<()> {
    // COALESCE keeps previously backfilled translations when a re-ingested
    // article arrives untranslated.
    let mut stmt = conn.prepare_cached(
        "INSERT INTO news_articles (
            source, url, title, summary, body,
            title_translated, summary_translated, body_translated,
            published_at, fetched_at, raw_payload, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(url) DO UPDATE SET
            source = excluded.source,
            title = excluded.title,
            summary = excluded.summary,
            body = excluded.body,
            title_translated = COALESCE(excluded.title_translated, title_translated),
            summary_translated = COALESCE(excluded.summary_translated, summary_translated),
            body_translated = COALESCE(excluded.body_translated, body_translated),
            published_at = excluded.published_at,
            fetched_at = excluded.fetched_at,
            raw_payload = excluded.raw_payload,
            updated_at = excluded.updated_at",
    )?;
    stmt.execute(params![
        article.source,
        article.url,
        article.title,
        article.summary,
        article.body,
        article.title_translated,
        article.summary_translated,
        article.body_translated,
        article.published_at.map(|t| t.timestamp_micros()),
        article.fetched_at.timestamp_micros(),
        article.raw_payload,
        now,
        now,
    ])?;
    Ok(())
}

fn pair_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MarketPair> {
    let kind_raw: String = row.get(5)?;
    let kind = PairKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown market kind: {kind_raw}").into(),
        )
    })?;
    Ok(MarketPair {
        provider: row.get(0)?,
        symbol: row.get(1)?,
        base_asset: row.get(2)?,
        quote_asset: row.get(3)?,
        status: row.get(4)?,
        kind,
        base_precision: row.get(6)?,
        quote_precision: row.get(7)?,
        min_price: row.get(8)?,
        max_price: row.get(9)?,
        tick_size: row.get(10)?,
        min_qty: row.get(11)?,
        max_qty: row.get(12)?,
        step_size: row.get(13)?,
        raw_payload: row.get(14)?,
    })
}

fn article_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredArticle> {
    let published: Option<i64> = row.get(9)?;
    Ok(StoredArticle {
        id: row.get(0)?,
        article: Article {
            source: row.get(1)?,
            url: row.get(2)?,
            title: row.get(3)?,
            summary: row.get(4)?,
            body: row.get(5)?,
            title_translated: row.get(6)?,
            summary_translated: row.get(7)?,
            body_translated: row.get(8)?,
            published_at: published.and_then(DateTime::from_timestamp_micros),
            fetched_at: ts_from_micros(10, row.get(10)?)?,
            raw_payload: row.get(13)?,
        },
        created_at: ts_from_micros(11, row.get(11)?)?,
        updated_at: ts_from_micros(12, row.get(12)?)?,
    })
}

fn ts_from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {micros}").into(),
        )
    })
}
