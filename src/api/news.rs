use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::{AppError, AppResult};
use crate::api::{ApiResponse, AppState};
use crate::ingest::types::Scope;
use crate::store::StoredArticle;

const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_TRANSLATE_LIMIT: u32 = 50;
const MAX_TRANSLATE_LIMIT: u32 = 200;

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

fn default_lang() -> String {
    "en".into()
}

fn default_translate_limit() -> u32 {
    DEFAULT_TRANSLATE_LIMIT
}

/// Translated fields are chosen at response-formatting time; storage always
/// holds both languages.
fn wants_translated(lang: &str) -> bool {
    matches!(
        lang.trim().to_ascii_lowercase().as_str(),
        "zh" | "zh-cn" | "zh_cn"
    )
}

#[derive(Debug, Serialize)]
pub struct NewsListItem {
    pub id: i64,
    pub source_name: String,
    pub title: String,
    pub summary: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct NewsDetail {
    pub id: i64,
    pub source_name: String,
    pub title: String,
    pub summary: Option<String>,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedNews {
    pub items: Vec<NewsListItem>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// An untranslated article falls back to its original text, so `lang=zh`
/// is always safe to request.
fn list_item(stored: &StoredArticle, use_translated: bool) -> NewsListItem {
    let a = &stored.article;
    let title = if use_translated {
        a.title_translated.clone().unwrap_or_else(|| a.title.clone())
    } else {
        a.title.clone()
    };
    let summary = if use_translated {
        a.summary_translated.clone().or_else(|| a.summary.clone())
    } else {
        a.summary.clone()
    };
    NewsListItem {
        id: stored.id,
        source_name: a.source.clone(),
        title,
        summary,
        url: a.url.clone(),
        published_at: a.published_at,
        created_at: stored.created_at,
    }
}

fn detail_item(stored: &StoredArticle, use_translated: bool) -> NewsDetail {
    let item = list_item(stored, use_translated);
    let a = &stored.article;
    let content = if use_translated {
        a.body_translated.clone().or_else(|| a.body.clone())
    } else {
        a.body.clone()
    };
    NewsDetail {
        id: item.id,
        source_name: item.source_name,
        title: item.title,
        summary: item.summary,
        url: item.url,
        published_at: item.published_at,
        created_at: item.created_at,
        content,
    }
}

#[derive(Debug, Deserialize)]
pub struct NewsListQuery {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_page_size")]
    page_size: u32,
    #[serde(default = "default_lang")]
    lang: String,
}

/// `GET /api/v1/news` - paginated articles, newest first. Read-only: never
/// triggers a fetch; refreshing is an explicit POST.
pub async fn list_articles(
    State(state): State<AppState>,
    Query(q): Query<NewsListQuery>,
) -> AppResult<Json<ApiResponse<PaginatedNews>>> {
    if q.page < 1 {
        return Err(AppError::BadRequest("page must be >= 1".into()));
    }
    if q.page_size < 1 || q.page_size > MAX_PAGE_SIZE {
        return Err(AppError::BadRequest(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    let use_translated = wants_translated(&q.lang);
    let (rows, total) = state.store.list_articles(q.page, q.page_size)?;
    let items = rows.iter().map(|r| list_item(r, use_translated)).collect();
    Ok(ApiResponse::success(PaginatedNews {
        items,
        total,
        page: q.page,
        page_size: q.page_size,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    #[serde(default = "default_lang")]
    lang: String,
}

/// `GET /api/v1/news/{id}` - one article with body text.
pub async fn article_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(q): Query<DetailQuery>,
) -> AppResult<Json<ApiResponse<NewsDetail>>> {
    let Some(stored) = state.store.get_article(id)? else {
        return Err(AppError::NotFound(format!("article {id} not found")));
    };
    Ok(ApiResponse::success(detail_item(
        &stored,
        wants_translated(&q.lang),
    )))
}

#[derive(Debug, Serialize)]
pub struct RefreshOut {
    pub count: usize,
}

/// `POST /api/v1/news/refresh` - pull every configured news source and
/// persist the results. Joins an in-flight run instead of duplicating it.
pub async fn refresh(State(state): State<AppState>) -> AppResult<Json<ApiResponse<RefreshOut>>> {
    let report = state.coordinator.refresh(Scope::News).await?;
    let message = format!("fetched and stored {} articles", report.written);
    Ok(ApiResponse::with_message(
        RefreshOut {
            count: report.written,
        },
        message,
    ))
}

pub async fn refresh_requires_post() -> AppError {
    AppError::MethodNotAllowed("use POST /api/v1/news/refresh to trigger a refresh".into())
}

#[derive(Debug, Deserialize)]
pub struct TranslateQuery {
    #[serde(default = "default_translate_limit")]
    limit: u32,
}

#[derive(Debug, Serialize)]
pub struct TranslateOut {
    pub translated: usize,
}

/// `POST /api/v1/news/translate` - backfill translations for up to `limit`
/// untranslated articles (default 50, cap 200).
pub async fn translate(
    State(state): State<AppState>,
    Query(q): Query<TranslateQuery>,
) -> AppResult<Json<ApiResponse<TranslateOut>>> {
    if q.limit < 1 || q.limit > MAX_TRANSLATE_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_TRANSLATE_LIMIT}"
        )));
    }
    let Some(translator) = state.translator.as_ref() else {
        return Err(AppError::Unavailable(
            "translation endpoint not configured".into(),
        ));
    };
    let translated = translator
        .translate_missing(&state.store, q.limit)
        .await
        .map_err(|e| AppError::Internal(format!("translation backfill failed: {e:#}")))?;
    let message = format!("backfilled {translated} translations");
    Ok(ApiResponse::with_message(TranslateOut { translated }, message))
}

pub async fn translate_requires_post() -> AppError {
    AppError::MethodNotAllowed("use POST /api/v1/news/translate to trigger a backfill".into())
}
