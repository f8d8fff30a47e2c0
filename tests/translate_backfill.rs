// tests/translate_backfill.rs
//
// Runs the backfill against a tiny LibreTranslate-shaped server bound to a
// loopback port. The server prefixes every chunk with "[zh] ", which makes
// chunk boundaries visible in the output, and fails any request whose text
// contains "boom".
//
// Covered:
// - pending articles get title/summary/body translations written
// - a second pass finds nothing left to translate
// - long texts are split into chunks and re-joined in request order
// - a failed title skips the article and leaves it pending
// - failures on summary/body degrade to None without skipping the row

use axum::http::StatusCode;
use axum::{routing::post, Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use exchange_gateway::config::TranslateConfig;
use exchange_gateway::{Article, Entity, Store, Translator};

async fn translate_handler(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    let q = body["q"].as_str().unwrap_or_default();
    if q.contains("boom") {
        return Err(StatusCode::BAD_GATEWAY);
    }
    Ok(Json(json!({ "translatedText": format!("[zh] {q}") })))
}

async fn spawn_echo_server() -> String {
    let app = Router::new().route("/translate", post(translate_handler));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}/translate")
}

fn translator_for(endpoint: &str, chunk_chars: usize) -> Translator {
    let cfg = TranslateConfig {
        endpoint: Some(endpoint.to_string()),
        target_lang: "zh-CN".into(),
        chunk_chars,
        timeout_secs: 5,
    };
    Translator::from_config(&cfg)
        .expect("build translator")
        .expect("endpoint configured")
}

fn article(url: &str, title: &str, summary: Option<&str>, body: Option<&str>) -> Article {
    Article {
        source: "CryptoCompare".into(),
        url: url.into(),
        title: title.into(),
        summary: summary.map(Into::into),
        body: body.map(Into::into),
        title_translated: None,
        summary_translated: None,
        body_translated: None,
        published_at: Some(Utc::now()),
        fetched_at: Utc::now(),
        raw_payload: None,
    }
}

#[tokio::test]
async fn backfill_translates_pending_then_has_nothing_left() {
    let endpoint = spawn_echo_server().await;
    let translator = translator_for(&endpoint, 4_500);
    let store = Store::open_in_memory().expect("store");
    store
        .upsert_batch(&[
            Entity::Article(article(
                "https://example.test/full",
                "BTC climbs",
                Some("short take"),
                Some("the full story"),
            )),
            Entity::Article(article("https://example.test/bare", "ETH dips", None, None)),
        ])
        .expect("seed articles");

    let first = translator
        .translate_missing(&store, 50)
        .await
        .expect("first pass");
    assert_eq!(first, 2);

    let (rows, _) = store.list_articles(1, 10).expect("list");
    let full = rows
        .iter()
        .find(|r| r.article.url == "https://example.test/full")
        .expect("full row");
    assert_eq!(full.article.title_translated.as_deref(), Some("[zh] BTC climbs"));
    assert_eq!(
        full.article.summary_translated.as_deref(),
        Some("[zh] short take")
    );
    assert_eq!(
        full.article.body_translated.as_deref(),
        Some("[zh] the full story")
    );

    let bare = rows
        .iter()
        .find(|r| r.article.url == "https://example.test/bare")
        .expect("bare row");
    assert_eq!(bare.article.title_translated.as_deref(), Some("[zh] ETH dips"));
    assert_eq!(bare.article.summary_translated, None);
    assert_eq!(bare.article.body_translated, None);

    // everything already carries a translated title
    let second = translator
        .translate_missing(&store, 50)
        .await
        .expect("second pass");
    assert_eq!(second, 0);
}

#[tokio::test]
async fn long_text_is_chunked_and_rejoined_in_order() {
    let endpoint = spawn_echo_server().await;
    // 4-char chunks: "abcdefgh" becomes "abcd" + "efgh"
    let translator = translator_for(&endpoint, 4);
    let store = Store::open_in_memory().expect("store");
    store
        .upsert_batch(&[Entity::Article(article(
            "https://example.test/chunked",
            "abcdefgh",
            None,
            None,
        ))])
        .expect("seed");

    let n = translator.translate_missing(&store, 50).await.expect("pass");
    assert_eq!(n, 1);

    let (rows, _) = store.list_articles(1, 10).expect("list");
    assert_eq!(
        rows[0].article.title_translated.as_deref(),
        Some("[zh] abcd[zh] efgh")
    );
}

#[tokio::test]
async fn failed_title_leaves_article_pending() {
    let endpoint = spawn_echo_server().await;
    let translator = translator_for(&endpoint, 4_500);
    let store = Store::open_in_memory().expect("store");
    store
        .upsert_batch(&[
            Entity::Article(article(
                "https://example.test/ok",
                "calm headline",
                None,
                None,
            )),
            Entity::Article(article(
                "https://example.test/poison",
                "boom headline",
                None,
                None,
            )),
        ])
        .expect("seed");

    let n = translator.translate_missing(&store, 50).await.expect("pass");
    assert_eq!(n, 1, "only the healthy article is written");

    let pending = store.articles_missing_translation(10).expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].article.url, "https://example.test/poison");

    // the poisoned title keeps failing on the next pass too
    let again = translator.translate_missing(&store, 50).await.expect("pass");
    assert_eq!(again, 0);
}

#[tokio::test]
async fn failed_summary_degrades_without_skipping_the_row() {
    let endpoint = spawn_echo_server().await;
    let translator = translator_for(&endpoint, 4_500);
    let store = Store::open_in_memory().expect("store");
    store
        .upsert_batch(&[Entity::Article(article(
            "https://example.test/partial",
            "fine title",
            Some("boom in the summary"),
            Some("fine body"),
        ))])
        .expect("seed");

    let n = translator.translate_missing(&store, 50).await.expect("pass");
    assert_eq!(n, 1);

    let (rows, _) = store.list_articles(1, 10).expect("list");
    assert_eq!(
        rows[0].article.title_translated.as_deref(),
        Some("[zh] fine title")
    );
    assert_eq!(rows[0].article.summary_translated, None);
    assert_eq!(
        rows[0].article.body_translated.as_deref(),
        Some("[zh] fine body")
    );
}
