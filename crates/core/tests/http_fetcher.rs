use axum::{http::StatusCode, routing::get, Json, Router};
use blaze_core::domain::source::Source;
use blaze_core::fetch::error::FetchError;
use blaze_core::fetch::fetch_bounded;
use blaze_core::fetch::http::HttpJsonFetcher;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route(
            "/teams/:key/record",
            get(|| async { Json(json!({"wins": 81, "losses": 81})) }),
        )
        .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/garbage", get(|| async { "<html>maintenance</html>" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fetcher() -> HttpJsonFetcher {
    HttpJsonFetcher::new("blaze-test").unwrap()
}

#[tokio::test]
async fn fetches_json_with_key_placeholder() {
    let addr = serve().await;
    let source = Source::new("cardinals", format!("http://{addr}/teams/{{key}}/record"));

    let payload: Value = fetch_bounded(&fetcher(), &source).await.unwrap();
    assert_eq!(payload, json!({"wins": 81, "losses": 81}));
}

#[tokio::test]
async fn non_success_status_is_http_error() {
    let addr = serve().await;
    let source = Source::new("broken", format!("http://{addr}/broken"));

    let err = fetch_bounded(&fetcher(), &source).await.unwrap_err();
    assert_eq!(err, FetchError::Http(500));
    assert_eq!(err.kind(), "http");
}

#[tokio::test]
async fn invalid_json_is_parse_error() {
    let addr = serve().await;
    let source = Source::new("garbage", format!("http://{addr}/garbage"));

    let err = fetch_bounded(&fetcher(), &source).await.unwrap_err();
    match err {
        FetchError::Parse(detail) => assert!(detail.contains("maintenance")),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_source_times_out() {
    let addr = serve().await;
    let source = Source::new("slow", format!("http://{addr}/slow"))
        .with_timeout(Duration::from_millis(200));

    let started = std::time::Instant::now();
    let err = fetch_bounded(&fetcher(), &source).await.unwrap_err();
    assert_eq!(err, FetchError::Timeout { after_ms: 200 });
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn refused_connection_is_network_error() {
    // Bind then drop to get a port nobody is listening on.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let source = Source::new("offline", format!("http://{addr}/record"));

    let err = fetch_bounded(&fetcher(), &source).await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
}

#[tokio::test]
async fn client_timeouts_report_the_configured_connect_timeout() {
    let addr = serve().await;
    let fetcher = HttpJsonFetcher::with_connect_timeout("blaze-test", Duration::from_millis(250)).unwrap();
    assert_eq!(fetcher.connect_timeout(), Duration::from_millis(250));

    // Any client-side timeout surfaces through reqwest the same way.
    let err = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap()
        .get(format!("http://{addr}/slow"))
        .send()
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let mapped = FetchError::from_transport(err, fetcher.connect_timeout());
    assert_eq!(mapped, FetchError::Timeout { after_ms: 250 });
    assert_ne!(mapped, FetchError::Timeout { after_ms: 0 });
}
