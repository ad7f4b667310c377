use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use backend::api::{router, AppState};
use mint::{MintEngine, MintStore};

const ADDRESS: &str = "addr-drop";

async fn app_with_items(count: i64) -> (Router, MintEngine) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    let store = MintStore::from_pool(pool);
    store.migrate().await.unwrap();
    store
        .insert_items((1..=count).map(|i| (i, format!("cid-{i}"))))
        .await
        .unwrap();

    let engine = MintEngine::new(store, ADDRESS.to_string());
    let app = router(AppState {
        engine: Arc::new(engine.clone()),
    });
    (app, engine)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn create_intent_then_poll_pending() {
    let (app, _engine) = app_with_items(5).await;

    let (status, body) = post_json(&app, "/create-payment-intent", json!({ "quantity": 2 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["amount"], json!("0.01000001"));
    assert_eq!(body["paymentAddress"], json!(ADDRESS));

    let session_id = body["sessionId"].as_str().unwrap();
    assert_eq!(session_id.len(), 32);

    let (status, body) = get_json(&app, &format!("/check-payment-status/{session_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "pending" }));
}

#[tokio::test]
async fn out_of_range_quantity_is_a_client_error() {
    let (app, _engine) = app_with_items(5).await;

    for quantity in [0, -3, 21] {
        let (status, body) =
            post_json(&app, "/create-payment-intent", json!({ "quantity": quantity })).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("success").is_none());
        assert_eq!(body["error"], json!("quantity must be between 1 and 20"));
    }
}

#[tokio::test]
async fn sold_out_drop_reports_insufficient_inventory() {
    let (app, _engine) = app_with_items(1).await;

    let (_, first) = post_json(&app, "/create-payment-intent", json!({ "quantity": 1 })).await;
    assert_eq!(first["success"], json!(true));

    let (status, body) = post_json(&app, "/create-payment-intent", json!({ "quantity": 1 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], json!("not enough unclaimed items left"));
}

#[tokio::test]
async fn unknown_session_keeps_http_200() {
    let (app, _engine) = app_with_items(1).await;

    let (status, body) = get_json(&app, "/check-payment-status/deadbeef").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "status": "error", "message": "Invalid session." })
    );
}

#[tokio::test]
async fn completed_session_lists_assigned_items() {
    let (app, engine) = app_with_items(1).await;

    let (_, created) = post_json(&app, "/create-payment-intent", json!({ "quantity": 1 })).await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    engine
        .assign_and_complete(&session_id, "tx-confirmed")
        .await
        .unwrap();

    let (status, body) = get_json(&app, &format!("/check-payment-status/{session_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("complete"));
    assert_eq!(body["quantity"], json!(1));
    assert_eq!(body["items"], json!([{ "cid": "cid-1" }]));
}

#[tokio::test]
async fn payment_pending_includes_txid() {
    let (app, engine) = app_with_items(1).await;

    let (_, created) = post_json(&app, "/create-payment-intent", json!({ "quantity": 1 })).await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    engine
        .mark_payment_pending(&session_id, "tx-mempool")
        .await
        .unwrap();

    let (_, body) = get_json(&app, &format!("/check-payment-status/{session_id}")).await;
    assert_eq!(body["status"], json!("payment_pending"));
    assert_eq!(body["txid"], json!("tx-mempool"));
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn overdue_pending_session_reads_as_expired() {
    let (app, engine) = app_with_items(1).await;

    let (_, created) = post_json(&app, "/create-payment-intent", json!({ "quantity": 1 })).await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    // Backdate the session past the payment window.
    sqlx::query("UPDATE sessions SET created_at_ms = created_at_ms - 11 * 60 * 1000")
        .execute(engine.store().pool())
        .await
        .unwrap();

    let (status, body) = get_json(&app, &format!("/check-payment-status/{session_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("expired"));
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn progress_tracks_reservations_and_claims() {
    let (app, engine) = app_with_items(4).await;

    let (_, created) = post_json(&app, "/create-payment-intent", json!({ "quantity": 1 })).await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();
    post_json(&app, "/create-payment-intent", json!({ "quantity": 2 })).await;

    engine
        .assign_and_complete(&session_id, "tx-confirmed")
        .await
        .unwrap();

    let (status, body) = get_json(&app, "/mint-progress").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(4));
    assert_eq!(body["minted"], json!(1));
    assert_eq!(body["reserved"], json!(2));
    assert_eq!(body["available"], json!(1));
    assert_eq!(body["percentage"], json!(25.0));
}

#[tokio::test]
async fn health_reports_store_reachability() {
    let (app, _engine) = app_with_items(1).await;

    let (status, body) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert!(body["timestamp"].is_u64());
}
