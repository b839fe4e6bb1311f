//! REST API endpoint tests (tower test utilities, no server needed).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use searchgate::protocol::create_router;
use searchgate::{Config, Gateway};

fn fixture_gateway() -> Arc<Gateway> {
    Arc::new(Gateway::new(Config::default()))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn bulk_then_search_round_trips_a_document() {
    let app = create_router(fixture_gateway());

    let ndjson = "{\"index\":{\"_index\":\"products\",\"_id\":\"1\"}}\n{\"name\":\"widget\",\"price\":9.99}\n";
    let req = Request::builder().method("POST").uri("/_bulk").header("content-type", "application/x-ndjson").body(Body::from(ndjson)).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["errors"], json!(false));

    let req = Request::builder().method("GET").uri("/products/_search").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["hits"]["total"]["value"], json!(1));
    assert_eq!(body["hits"]["hits"][0]["_id"], json!("1"));
}

#[tokio::test]
async fn single_doc_write_then_count() {
    let app = create_router(fixture_gateway());

    let req = json_request("PUT", "/products/_doc/1", json!({"name": "widget"}));
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = json_request("POST", "/products/_count", json!({}));
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["count"], json!(1));
}

#[tokio::test]
async fn scroll_create_continue_and_release_lifecycle() {
    let app = create_router(fixture_gateway());

    for i in 0..3 {
        let req = json_request("PUT", &format!("/products/_doc/{i}"), json!({"n": i}));
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = json_request("POST", "/products/_search?scroll=1m", json!({"size": 2}));
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let scroll_id = body["_scroll_id"].as_str().unwrap().to_string();
    assert_eq!(body["hits"]["hits"].as_array().unwrap().len(), 2);

    let req = json_request("POST", "/_search/scroll", json!({"scroll_id": scroll_id}));
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["hits"]["hits"].as_array().unwrap().len(), 1);

    let req = Request::builder()
        .method("DELETE")
        .uri("/_search/scroll")
        .header("content-type", "application/json")
        .body(Body::from(json!({"scroll_id": scroll_id}).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["num_freed"], json!(1));
}

#[tokio::test]
async fn scroll_continuation_keeps_aggs_and_source_filter_from_first_page() {
    let app = create_router(fixture_gateway());

    for i in 0..3 {
        let req = json_request("PUT", &format!("/products/_doc/{i}"), json!({"n": i, "extra": "noise"}));
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let body = json!({"size": 2, "_source": ["n"], "aggs": {"n_sum": {"sum": {"field": "n"}}}});
    let req = json_request("POST", "/products/_search?scroll=1m", body);
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let first_page = body_json(resp).await;
    let scroll_id = first_page["_scroll_id"].as_str().unwrap().to_string();
    assert!(first_page["aggregations"]["n_sum"]["value"].is_number());
    assert!(first_page["hits"]["hits"][0]["_source"].get("extra").is_none());

    let req = json_request("POST", "/_search/scroll", json!({"scroll_id": scroll_id}));
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let second_page = body_json(resp).await;
    assert!(second_page["aggregations"]["n_sum"]["value"].is_number(), "aggs should survive scroll continuation");
    assert!(second_page["hits"]["hits"][0]["_source"].get("extra").is_none(), "_source filter should survive scroll continuation");
}

#[tokio::test]
async fn delete_by_query_runs_as_a_pollable_task() {
    let app = create_router(fixture_gateway());

    for i in 0..5 {
        let req = json_request("PUT", &format!("/products/_doc/{i}"), json!({"n": i}));
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = json_request("POST", "/products/_delete_by_query", json!({}));
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let task_id = body["task_id"].as_str().unwrap().to_string();

    // give the spawned task a moment to finish against the tiny fixture
    for _ in 0..20 {
        let req = Request::builder().method("GET").uri(format!("/_tasks/{task_id}")).body(Body::empty()).unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let body = body_json(resp).await;
        if body["status"] == json!("completed") {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("delete_by_query task never completed");
}

#[tokio::test]
async fn search_on_unknown_index_is_not_found() {
    let app = create_router(fixture_gateway());
    let req = Request::builder().method("GET").uri("/missing/_search").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["type"], json!("not_found"));
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let app = create_router(fixture_gateway());
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
