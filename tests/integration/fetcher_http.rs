//! HTTP fetcher and full runs against a mock listing API

use crate::support::options;
use listing_harvest::cache::ResponseCache;
use listing_harvest::config::Config;
use listing_harvest::fetcher::{PageFetcher, RetryPolicy};
use listing_harvest::store::{FileStore, StorePaths};
use listing_harvest::{HttpFetcher, Orchestrator, PageResult, Phase};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PATH: &str = "/v1/RealEstate/LegendSearch";
const TOKEN: &str = "abc123";

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = format!("{}/", server.uri());
    config.api.api_url = format!("{}{}", server.uri(), SEARCH_PATH);
    config
}

fn fetcher_for(server: &MockServer, cache: Option<ResponseCache>) -> HttpFetcher {
    HttpFetcher::from_config(&test_config(server), cache)
        .unwrap()
        .with_retry_policy(RetryPolicy::immediate())
}

fn listing_body(ids: &[u64]) -> Value {
    let items: Vec<Value> = ids.iter().map(|id| json!({ "applicationId": id })).collect();
    json!({ "realStateItemModel": items })
}

async fn mount_auth(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("ss-session-token={}; Path=/", TOKEN).as_str())
                .set_body_string("<html></html>"),
        )
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, page: u32, body: Value) {
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({ "page": page })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_authenticate_reads_session_cookie() {
    let server = MockServer::start().await;
    mount_auth(&server).await;

    let mut fetcher = fetcher_for(&server, None);
    fetcher.authenticate().await.unwrap();

    assert!(fetcher.has_token());
}

#[tokio::test]
async fn test_authenticate_without_cookie_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server, None);

    assert!(fetcher.authenticate().await.is_err());
    assert!(!fetcher.has_token());
}

#[tokio::test]
async fn test_fetch_sends_filters_and_bearer_token() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .and(body_partial_json(json!({
            "realEstateType": 5,
            "realEstateDealType": 4,
            "cityIdList": [95],
            "currencyId": 1,
            "page": 3,
            "pageSize": 16
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(&[301, 302])))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server, None);
    fetcher.authenticate().await.unwrap();

    match fetcher.fetch(3, 3).await {
        PageResult::Items(listing) => {
            assert_eq!(listing.records.len(), 2);
            assert_eq!(listing.records[0].identity(), Some("301".to_string()));
        }
        other => panic!("expected items, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized_is_auth_expired_without_retry() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server, None);
    fetcher.authenticate().await.unwrap();

    assert_eq!(fetcher.fetch(5, 3).await, PageResult::AuthExpired);
    assert!(!fetcher.has_token());
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, 2, listing_body(&[20])).await;

    let mut fetcher = fetcher_for(&server, None);
    fetcher.authenticate().await.unwrap();

    assert!(matches!(fetcher.fetch(2, 3).await, PageResult::Items(_)));
}

#[tokio::test]
async fn test_malformed_body_exhausts_attempts() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(2)
        .mount(&server)
        .await;

    let mut fetcher = fetcher_for(&server, None);
    fetcher.authenticate().await.unwrap();

    assert_eq!(fetcher.fetch(1, 2).await, PageResult::Failure);
}

#[tokio::test]
async fn test_successful_response_is_cached() {
    let server = MockServer::start().await;
    let cache_dir = TempDir::new().unwrap();
    mount_auth(&server).await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(&[7])))
        .expect(1)
        .mount(&server)
        .await;

    let cache = ResponseCache::open(cache_dir.path()).unwrap();
    let mut fetcher = fetcher_for(&server, Some(cache));
    fetcher.authenticate().await.unwrap();

    let first = fetcher.fetch(7, 3).await;
    let second = fetcher.fetch(7, 3).await;

    assert!(matches!(first, PageResult::Items(_)));
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_run_reauthenticates_after_401() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("ss-session-token={}; Path=/", TOKEN).as_str()),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({ "page": 5 })))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    for page in 4..=6 {
        mount_page(&server, page, listing_body(&[u64::from(page) * 10])).await;
    }
    mount_page(&server, 7, listing_body(&[])).await;

    let store = FileStore::new(StorePaths::for_worker(dir.path(), 4, 9));
    let mut orchestrator = Orchestrator::new(fetcher_for(&server, None), store.clone(), options(4, 9));
    let records = orchestrator.run().await;

    assert_eq!(orchestrator.phase(), Phase::Done);
    assert_eq!(records.len(), 3);
    assert_eq!(store.load_checkpoint().unwrap(), 7);
    assert!(store.load_failed_pages().unwrap().is_empty());
}
