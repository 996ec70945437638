// tests/api_http.rs

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use order_sync::ingest::scripted::ScriptedSource;
use order_sync::warehouse::SqliteWarehouse;
use order_sync::{router, AppState, JobOptions, SyncService};
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

fn order(id: i64, updated_at: &str) -> Value {
    json!({"id": id, "updated_at": updated_at, "total_price": "5.00", "line_items": []})
}

fn app_with(source: ScriptedSource) -> Router {
    let warehouse = SqliteWarehouse::open_in_memory().expect("in-memory warehouse");
    let service = SyncService::new(Arc::new(source), Arc::new(warehouse), JobOptions::default());
    router(AppState { service })
}

fn app() -> Router {
    app_with(ScriptedSource::new(vec![
        vec![
            order(1, "2021-09-01T10:00:00Z"),
            order(2, "2021-09-01T11:00:00Z"),
        ],
        vec![order(3, "2021-09-01T12:00:00Z")],
    ]))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request")
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

#[tokio::test]
async fn health_ok() {
    let resp = app().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn explicit_range_returns_summary() {
    let resp = app()
        .oneshot(post(
            "/sync/orders",
            r#"{"start": "2021-09-01", "end": "2021-09-02"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(
        body,
        json!({
            "table_name": "Orders",
            "start": "2021-09-01T00:00:00+00:00",
            "end": "2021-09-02T00:00:00+00:00",
            "num_input_records": 3,
            "output_rows": 3
        })
    );
}

#[tokio::test]
async fn status_reflects_loaded_rows() {
    let app = app();
    let resp = app
        .clone()
        .oneshot(post(
            "/sync/Orders",
            r#"{"start": "2021-09-01", "end": "2021-09-02"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/sync/orders/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["table_name"], "Orders");
    assert_eq!(body["rows"], 3);
    assert_eq!(body["watermark"], "2021-09-01T12:00:00+00:00");
}

#[tokio::test]
async fn status_of_empty_table() {
    let resp = app().oneshot(get("/sync/order-lines/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(
        body,
        json!({"table_name": "OrderLines", "rows": 0, "watermark": null})
    );
}

#[tokio::test]
async fn partial_range_is_bad_request() {
    let resp = app()
        .oneshot(post("/sync/orders", r#"{"start": "2021-09-01"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["type"], "invalid_range");
}

#[tokio::test]
async fn empty_body_on_empty_table_is_precondition_failed() {
    let resp = app().oneshot(post("/sync/orders", "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["type"], "empty_table");
}

#[tokio::test]
async fn unknown_entity_is_not_found() {
    let resp = app().oneshot(post("/sync/customers", "{}")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["type"], "unknown_entity");
}

#[tokio::test]
async fn source_failure_is_bad_gateway() {
    let app = app_with(ScriptedSource::new(vec![vec![order(1, "2021-09-01T10:00:00Z")]]).failing_on(0));
    let resp = app
        .oneshot(post(
            "/sync/orders",
            r#"{"start": "2021-09-01", "end": "2021-09-02"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(resp).await;
    assert_eq!(body["error"]["type"], "fetch");
}

#[tokio::test(start_paused = true)]
async fn concurrent_run_of_same_entity_conflicts() {
    let slow = ScriptedSource::new(vec![vec![order(1, "2021-09-01T10:00:00Z")]])
        .with_delay(Duration::from_secs(10));
    let app = app_with(slow);
    let range = r#"{"start": "2021-09-01", "end": "2021-09-02"}"#;

    let first = tokio::spawn(app.clone().oneshot(post("/sync/orders", range)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = app
        .clone()
        .oneshot(post("/sync/orders", range))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(second).await["error"]["type"], "already_running");

    // Other entities have their own lock.
    let other = app
        .clone()
        .oneshot(post("/sync/order_lines", range))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status(), StatusCode::OK);
}
