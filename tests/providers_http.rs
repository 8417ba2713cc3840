//! Provider clients against mock HTTP backends

mod common;

use common::dispatch_config;
use search_fusion::config::EngineConfig;
use search_fusion::search::providers::{
    BraveSearchProvider, DuckDuckGoSearchProvider, GoogleSearchProvider, JinaSearchProvider,
    SerperSearchProvider,
};
use search_fusion::search::{
    ConcurrencyGate, CooldownPolicy, Dispatcher, EngineRegistry, ErrorKind, FailureReason,
    SearchError, SearchProvider,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine(server: &MockServer, route: &str, key: Option<&str>) -> EngineConfig {
    EngineConfig {
        api_key: key.map(str::to_string),
        base_url: Some(format!("{}{route}", server.uri())),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_serper_parses_organic_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("X-API-KEY", "serper-key"))
        .and(body_json(json!({"q": "rust", "num": 2, "autocorrect": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "organic": [
                {"title": "Rust", "link": "https://rust-lang.org", "snippet": "A language"},
                {"title": "Book", "link": "https://doc.rust-lang.org/book", "snippet": "Learn"},
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = SerperSearchProvider::new(common::test_pool(), &engine(&server, "/search", Some("serper-key")));
    let items = provider.search("rust", 2).await.expect("serper answers");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].url, "https://rust-lang.org");
    assert_eq!(items[1].snippet, "Learn");
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let server = MockServer::start().await;
    Mock::given(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(path("/denied"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;
    Mock::given(path("/quota"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Daily quota exceeded"))
        .mount(&server)
        .await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let pool = common::test_pool();
    let kind = |route: &str| {
        let provider = SerperSearchProvider::new(pool.clone(), &engine(&server, route, Some("k")));
        async move { provider.search("q", 3).await.expect_err("non-2xx").kind() }
    };

    assert_eq!(kind("/limited").await, ErrorKind::RateLimit);
    assert_eq!(kind("/denied").await, ErrorKind::Auth);
    assert_eq!(kind("/quota").await, ErrorKind::RateLimit);
    assert_eq!(kind("/broken").await, ErrorKind::Network);
}

#[tokio::test]
async fn test_google_sends_key_and_engine_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch"))
        .and(query_param("key", "g-key"))
        .and(query_param("cx", "cse-1"))
        .and(query_param("q", "tokio"))
        .and(query_param("num", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"title": "Tokio", "link": "https://tokio.rs", "snippet": "Async runtime"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = EngineConfig {
        cse_id: Some("cse-1".into()),
        ..engine(&server, "/customsearch", Some("g-key"))
    };
    let provider = GoogleSearchProvider::new(common::test_pool(), &config);
    assert!(provider.is_available());

    let items = provider.search("tokio", 25).await.expect("google answers");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Tokio");
}

#[tokio::test]
async fn test_google_needs_engine_id() {
    let provider = GoogleSearchProvider::new(
        common::test_pool(),
        &EngineConfig {
            api_key: Some("g-key".into()),
            ..EngineConfig::default()
        },
    );
    assert!(!provider.is_available());
    assert!(matches!(
        provider.search("q", 3).await,
        Err(SearchError::InvalidApiKey)
    ));
}

#[tokio::test]
async fn test_brave_uses_subscription_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/brave"))
        .and(header("X-Subscription-Token", "b-key"))
        .and(query_param("count", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "web": {"results": [
                {"title": "One", "url": "https://one.example", "description": "first"},
                {"title": "Two", "url": "https://two.example", "description": "second"},
                {"title": "Three", "url": "https://three.example", "description": "third"},
            ]}
        })))
        .mount(&server)
        .await;

    let provider = BraveSearchProvider::new(common::test_pool(), &engine(&server, "/brave", Some("b-key")));
    let items = provider.search("q", 2).await.expect("brave answers");
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].url, "https://two.example");
}

#[tokio::test]
async fn test_jina_large_requests_use_keyed_api() {
    let server = MockServer::start().await;
    let hit = |n: usize| {
        (0..n)
            .map(|i| json!({"title": format!("R{i}"), "url": format!("https://r{i}.example"), "description": ""}))
            .collect::<Vec<_>>()
    };
    Mock::given(method("GET"))
        .and(path("/s/"))
        .and(query_param("q", "rust"))
        .and(header("Authorization", "Bearer j-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": hit(10)})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/search"))
        .and(header("Authorization", "Bearer j-key"))
        .and(body_json(json!({"query": "rust", "num": 25})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": hit(25)})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = JinaSearchProvider::new(common::test_pool(), &engine(&server, "/s/", Some("j-key")))
        .with_premium_url(format!("{}/v1/search", server.uri()));

    assert_eq!(provider.search("rust", 5).await.expect("basic").len(), 5);
    let many = provider.search("rust", 25).await.expect("keyed");
    assert_eq!(many.len(), 25);
    assert_eq!(many[24].url, "https://r24.example");
}

#[tokio::test]
async fn test_duckduckgo_anomaly_page_is_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/html/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<div class=\"anomaly-modal\">are you a robot?</div>"),
        )
        .mount(&server)
        .await;

    let provider = DuckDuckGoSearchProvider::new(common::test_pool(), &engine(&server, "/html/", None));
    assert!(!provider.requires_credential());
    assert!(matches!(
        provider.search("q", 3).await,
        Err(SearchError::RateLimitExceeded)
    ));
}

#[tokio::test]
async fn test_http_rate_limit_fails_over_to_next_engine() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/serper"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ddg/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div class="result web-result">
                 <a class="result__a" href="https://www.rust-lang.org/">Rust</a>
                 <div class="result__snippet">Fast and reliable</div>
               </div>"#,
        ))
        .mount(&server)
        .await;

    let pool = common::test_pool();
    let providers: Vec<Arc<dyn SearchProvider>> = vec![
        Arc::new(SerperSearchProvider::new(pool.clone(), &engine(&server, "/serper", Some("k")))),
        Arc::new(DuckDuckGoSearchProvider::new(pool.clone(), &engine(&server, "/ddg/", None))),
    ];
    let registry = EngineRegistry::new(providers, CooldownPolicy::default()).expect("registry");
    let dispatcher = Dispatcher::new(
        Arc::new(registry),
        Arc::new(ConcurrencyGate::new(4)),
        dispatch_config(60, 30, 10),
    );

    let result = dispatcher.search("rust", 5, "auto").await.expect("ddg answers");
    assert_eq!(result.provider, "duckduckgo");
    assert_eq!(result.items[0].url, "https://www.rust-lang.org/");
    assert!(dispatcher.registry().stats().is_cooling_down("serper"));

    let err = dispatcher.search("rust", 5, "serper").await.expect_err("still limited");
    assert_eq!(err.attempts()[0].reason, FailureReason::RateLimited);
    assert_eq!(pool.in_use(), 0, "connection slots returned");
}
