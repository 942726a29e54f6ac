//! End-to-end failover against mock HTTP backends.

use ai_gateway_router::config::{MetricsConfig, RouterConfig, UpstreamErrorPolicy};
use ai_gateway_router::routing::{EXHAUSTED_MESSAGE, EXHAUSTED_STATUS};
use ai_gateway_router::{EndpointDescriptor, MetricsRegistry, RouteRequest, Router};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Nothing listens here, so connecting fails immediately.
const UNREACHABLE: &str = "http://127.0.0.1:1/openai/chat/completions";

fn router(cfg: RouterConfig) -> (Router, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new(MetricsConfig::default()).unwrap());
    let router = Router::with_http(&cfg, metrics.clone()).unwrap();
    (router, metrics)
}

fn payload() -> serde_json::Value {
    json!({
        "messages": [{"role": "user", "content": "Hello"}],
        "max_tokens": 64
    })
}

#[tokio::test]
async fn test_rate_limited_then_unreachable_then_success() {
    let mut server = Server::new_async().await;
    let completion = json!({
        "id": "chatcmpl-1",
        "choices": [{"message": {"role": "assistant", "content": "Hi!"}}],
        "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
    });

    let busy = server
        .mock("POST", "/busy")
        .match_header("api-key", "key-a")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(payload()))
        .with_status(429)
        .with_header("retry-after", "7")
        .with_body(r#"{"error":{"code":"429","message":"Rate limit exceeded"}}"#)
        .expect(1)
        .create_async()
        .await;
    let healthy = server
        .mock("POST", "/healthy")
        .match_header("api-key", "key-c")
        .match_body(Matcher::Json(payload()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion.to_string())
        .expect(1)
        .create_async()
        .await;

    let endpoints = vec![
        EndpointDescriptor::new(format!("{}/busy", server.url()), "key-a"),
        EndpointDescriptor::new(UNREACHABLE, "key-b"),
        EndpointDescriptor::new(format!("{}/healthy", server.url()), "key-c"),
    ];
    let (router, metrics) = router(RouterConfig::default());
    let request = RouteRequest::new("/lb/chat", endpoints.clone(), payload()).with_app_id("chat");
    let response = router.route(&request).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, completion);
    assert_eq!(response.served_by.as_deref(), Some(endpoints[2].uri.as_str()));
    busy.assert_async().await;
    healthy.assert_async().await;

    let a = metrics.snapshot(endpoints[0].metrics_key()).unwrap().unwrap();
    let b = metrics.snapshot(endpoints[1].metrics_key()).unwrap().unwrap();
    let c = metrics.get(endpoints[2].metrics_key()).unwrap().unwrap().live().unwrap();
    assert_eq!((a.failed_calls, a.total_calls), (1, 1));
    assert_eq!((b.failed_calls, b.total_calls), (1, 1));
    assert_eq!(c.successful_calls, 1);
    assert_eq!(c.total_tokens, 12);
}

#[tokio::test]
async fn test_all_endpoints_failing_returns_503() {
    let mut server = Server::new_async().await;
    let throttled = server
        .mock("POST", "/one")
        .with_status(429)
        .with_header("retry-after", "20")
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let broken = server
        .mock("POST", "/two")
        .with_status(500)
        .with_body("upstream exploded")
        .expect(1)
        .create_async()
        .await;
    let filtered = server
        .mock("POST", "/three")
        .with_status(400)
        .with_body(r#"{"error":{"code":"content_filter"}}"#)
        .expect(1)
        .create_async()
        .await;

    let endpoints: Vec<EndpointDescriptor> = ["/one", "/two", "/three"]
        .iter()
        .map(|p| EndpointDescriptor::new(format!("{}{}", server.url(), p), "key"))
        .collect();
    let (router, metrics) = router(RouterConfig::default());
    let response = router
        .route(&RouteRequest::new("/api/v1/dev/lb/chat", endpoints.clone(), payload()))
        .await;

    assert_eq!(response.status, EXHAUSTED_STATUS);
    assert_eq!(response.body["endpoint"], "/api/v1/dev/lb/chat");
    assert_eq!(response.body["err_msg"], EXHAUSTED_MESSAGE);
    assert_eq!(response.retry_after_secs, Some(20));
    throttled.assert_async().await;
    broken.assert_async().await;
    filtered.assert_async().await;

    for endpoint in &endpoints {
        let snap = metrics.snapshot(endpoint.metrics_key()).unwrap().unwrap();
        assert_eq!(snap.failed_calls, 1, "{}", endpoint.uri);
        assert_eq!(snap.successful_calls, 0);
    }
    let first = metrics.snapshot(endpoints[0].metrics_key()).unwrap().unwrap();
    assert_eq!(first.throttled_calls, 1);
    let last = metrics.snapshot(endpoints[2].metrics_key()).unwrap().unwrap();
    assert_eq!(last.filtered_calls, 1);
    assert_eq!(metrics.exhausted_requests(), 1);
}

#[tokio::test]
async fn test_surface_policy_stops_on_client_error() {
    let mut server = Server::new_async().await;
    let invalid = server
        .mock("POST", "/primary")
        .with_status(400)
        .with_body(r#"{"error":{"message":"bad request"}}"#)
        .expect(1)
        .create_async()
        .await;
    let secondary = server
        .mock("POST", "/secondary")
        .with_status(200)
        .with_body("{}")
        .expect(0)
        .create_async()
        .await;

    let endpoints = vec![
        EndpointDescriptor::new(format!("{}/primary", server.url()), "key"),
        EndpointDescriptor::new(format!("{}/secondary", server.url()), "key"),
    ];
    let cfg = RouterConfig::new().with_upstream_error_policy(UpstreamErrorPolicy::Surface);
    let (router, _metrics) = router(cfg);
    let response = router.route(&RouteRequest::new("/lb/chat", endpoints, payload())).await;

    assert_eq!(response.status, 400);
    assert_eq!(response.body, json!({"error": {"message": "bad request"}}));
    invalid.assert_async().await;
    secondary.assert_async().await;
}

#[tokio::test]
async fn test_non_json_success_body_is_returned_without_failover() {
    let mut server = Server::new_async().await;
    let plain = server
        .mock("POST", "/plain")
        .with_status(200)
        .with_body("plain text completion")
        .expect(1)
        .create_async()
        .await;
    let untouched = server
        .mock("POST", "/untouched")
        .with_status(200)
        .with_body(r#"{"ok":1}"#)
        .expect(0)
        .create_async()
        .await;

    let endpoints = vec![
        EndpointDescriptor::new(format!("{}/plain", server.url()), "key"),
        EndpointDescriptor::new(format!("{}/untouched", server.url()), "key"),
    ];
    let (router, metrics) = router(RouterConfig::default());
    let response = router.route(&RouteRequest::new("/lb/chat", endpoints.clone(), payload())).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!("plain text completion"));
    assert_eq!(response.served_by.as_deref(), Some(endpoints[0].uri.as_str()));
    plain.assert_async().await;
    untouched.assert_async().await;

    let first = metrics.snapshot(endpoints[0].metrics_key()).unwrap().unwrap();
    assert_eq!((first.successful_calls, first.failed_calls), (1, 0));
    assert!(metrics.snapshot(endpoints[1].metrics_key()).unwrap().is_none());
}

/// Accepts connections and never answers.
async fn silent_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}/openai/chat/completions", addr)
}

#[tokio::test]
async fn test_slow_endpoint_times_out_and_fails_over() {
    let mut server = Server::new_async().await;
    let fast = server
        .mock("POST", "/fast")
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;

    let endpoints = vec![
        EndpointDescriptor::new(silent_backend().await, "key"),
        EndpointDescriptor::new(format!("{}/fast", server.url()), "key"),
    ];
    let cfg = RouterConfig::new().with_attempt_timeout(Duration::from_millis(200));
    let (router, metrics) = router(cfg);
    let response = router.route(&RouteRequest::new("/lb/chat", endpoints.clone(), payload())).await;

    assert_eq!(response.body, json!({"ok": true}));
    fast.assert_async().await;
    let first = metrics.snapshot(endpoints[0].metrics_key()).unwrap().unwrap();
    assert_eq!(first.failed_calls, 1);
}

#[tokio::test]
async fn test_concurrent_routes_share_metrics() {
    let mut server = Server::new_async().await;
    let ok = server
        .mock("POST", "/ok")
        .with_status(200)
        .with_body(r#"{"usage":{"total_tokens":10}}"#)
        .expect(20)
        .create_async()
        .await;

    let endpoint = EndpointDescriptor::new(format!("{}/ok", server.url()), "key");
    let (router, metrics) = router(RouterConfig::default());
    let router = Arc::new(router);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let router = router.clone();
        let request = RouteRequest::new("/lb/chat", vec![endpoint.clone()], payload());
        handles.push(tokio::spawn(async move { router.route(&request).await }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap().status, 200);
    }

    ok.assert_async().await;
    let live = metrics.get(endpoint.metrics_key()).unwrap().unwrap().live().unwrap();
    assert_eq!(live.successful_calls, 20);
    assert_eq!(live.total_tokens, 200);
    assert_eq!(metrics.routed_requests(), 20);
}
