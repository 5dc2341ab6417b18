use axum::http::{header, HeaderMap};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use sitesearch_core::{SiteStatus, SledStore, Store};
use sitesearch_crawler::{ContentKind, CrawlerConfig, Fetcher, HttpFetcher, Orchestrator, SiteConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn test_site() -> Router {
    Router::new()
        .route(
            "/",
            get(|| async {
                Html(r#"<html><head><title>Cat shelter</title></head><body><p>Cats sleep on mats.</p><a href="/about">About</a><a href="/cat.png">photo</a></body></html>"#)
            }),
        )
        .route("/about", get(|| async { Html("<html><body><p>The shelter feeds every cat.</p></body></html>") }))
        .route("/cat.png", get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![0u8; 16]) }))
        .route("/big", get(|| async { Html("cat ".repeat(1000)) }))
        .route(
            "/whoami",
            get(|headers: HeaderMap| async move {
                let ua = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
                let referer = headers.get(header::REFERER).and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
                Html(format!("{ua}|{referer}"))
            }),
        )
}

fn fetcher() -> HttpFetcher {
    let config = CrawlerConfig { max_body_bytes: 1024, ..CrawlerConfig::default() };
    HttpFetcher::new(&config).unwrap()
}

#[tokio::test]
async fn fetches_html_with_body() {
    let addr = serve(test_site()).await;
    let page = fetcher().fetch(&Url::parse(&format!("http://{addr}/")).unwrap()).await.unwrap();
    assert_eq!(page.status, 200);
    assert_eq!(page.kind(), ContentKind::Html);
    assert!(page.body.unwrap().contains("Cats sleep on mats."));
}

#[tokio::test]
async fn sends_user_agent_and_referrer() {
    let addr = serve(test_site()).await;
    let page = fetcher().fetch(&Url::parse(&format!("http://{addr}/whoami")).unwrap()).await.unwrap();
    let defaults = CrawlerConfig::default();
    assert_eq!(page.body.unwrap(), format!("{}|{}", defaults.user_agent, defaults.referrer));
}

#[tokio::test]
async fn skips_body_for_binary_and_errors() {
    let addr = serve(test_site()).await;
    let image = fetcher().fetch(&Url::parse(&format!("http://{addr}/cat.png")).unwrap()).await.unwrap();
    assert_eq!(image.kind(), ContentKind::Binary);
    assert!(image.body.is_none());

    let missing = fetcher().fetch(&Url::parse(&format!("http://{addr}/missing")).unwrap()).await.unwrap();
    assert_eq!(missing.status, 404);
    assert!(!missing.is_success());
    assert!(missing.body.is_none());
}

#[tokio::test]
async fn oversized_body_is_an_error() {
    let addr = serve(test_site()).await;
    let err = fetcher().fetch(&Url::parse(&format!("http://{addr}/big")).unwrap()).await.unwrap_err();
    assert_eq!(err.status(), 0);
}

#[tokio::test]
async fn transport_failure_has_no_status() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = fetcher().fetch(&Url::parse(&format!("http://{addr}/")).unwrap()).await.unwrap_err();
    assert_eq!(err.status(), 0);
}

#[tokio::test]
async fn crawls_a_live_site() {
    let addr = serve(test_site()).await;
    let config = CrawlerConfig {
        sites: vec![SiteConfig::new("Shelter", format!("http://{addr}"))],
        min_delay_ms: 0,
        max_delay_ms: 1,
        ..CrawlerConfig::default()
    };
    let store: Arc<dyn Store> = Arc::new(SledStore::temporary().unwrap());
    let orchestrator = Orchestrator::with_http(config, Arc::clone(&store)).unwrap();

    orchestrator.start().unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        while orchestrator.is_indexing_in_progress() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let site = store.find_site_by_url(&format!("http://{addr}")).unwrap().unwrap();
    assert_eq!(site.status, SiteStatus::Indexed);
    assert!(store.page_exists(site.id, "/about").unwrap());
    assert!(store.page_exists(site.id, "/").unwrap());
    assert_eq!(store.count_pages(site.id).unwrap(), 2);
    assert_eq!(store.find_lemma(site.id, "cat").unwrap().unwrap().frequency, 2);
}
