//! Integration tests for the campaign composer API.
//!
//! Tests cover contact import, selection, removal with undo, the dispatch
//! guards, dispatch success and failure, reconciliation of results against
//! a changing recipient list, and session reset.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::StatusCode;
use common::{
    body_json, delete, dispatch, get, post, post_file, post_json, previewing_app, put_json,
    row_id, view, FakeGateway, SAMPLE_CSV, TEST_PIN,
};
use serde_json::json;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_session_is_empty() {
    let app = common::build_test_app();
    let view = view(&app).await;

    assert_eq!(view["phase"], "empty");
    assert_eq!(view["counts"]["imported"], 0);
    assert_eq!(view["rows"].as_array().unwrap().len(), 0);
    assert_eq!(view["can_undo"], false);
}

#[tokio::test]
async fn import_classifies_rows_and_includes_ready_ones() {
    let app = common::build_test_app();
    let response = post_file(
        app.clone(),
        "/api/v1/campaign/import",
        "contacts.csv",
        SAMPLE_CSV.as_bytes(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["total_count"], 4);
    assert_eq!(json["data"]["valid_count"], 3);
    assert_eq!(json["data"]["invalid_count"], 1);
    assert_eq!(json["data"]["counts"]["ready"], 3);
    assert_eq!(json["data"]["counts"]["excluded"], 1);
    assert_eq!(json["data"]["counts"]["included"], 3);

    let view = view(&app).await;
    assert_eq!(view["phase"], "previewing");

    // Rows come back in source order, the bad one in its original position.
    let rows = view["rows"].as_array().unwrap();
    let indices: Vec<u64> = rows.iter().map(|r| r["row_index"].as_u64().unwrap()).collect();
    assert_eq!(indices, vec![2, 3, 4, 5]);
    assert_eq!(rows[0]["phone"], "+15550000001");
    assert_eq!(rows[2]["status"], "excluded");
    assert_eq!(rows[2]["name"], "-");
    assert_eq!(rows[2]["included"], false);
    assert!(rows[2]["errors"][0].as_str().unwrap().starts_with("Row 4:"));
}

#[tokio::test]
async fn non_csv_upload_is_rejected_and_surfaced() {
    let app = common::build_test_app();
    let response = post_file(
        app.clone(),
        "/api/v1/campaign/import",
        "contacts.xlsx",
        b"Alice,5550000001",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "Please upload a CSV file");

    let view = view(&app).await;
    assert_eq!(view["phase"], "empty");
    assert_eq!(view["error"], "Please upload a CSV file");
}

#[tokio::test]
async fn empty_csv_is_rejected() {
    let app = common::build_test_app();
    let response = post_file(app.clone(), "/api/v1/campaign/import", "empty.csv", b"").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "CSV file is empty");
}

#[tokio::test]
async fn header_only_csv_yields_no_contacts() {
    let app = common::build_test_app();
    let response = post_file(
        app.clone(),
        "/api/v1/campaign/import",
        "header.csv",
        b"Name,Phone\n",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "No contacts found in import");
}

#[tokio::test]
async fn multipart_without_file_is_bad_request() {
    let app = common::build_test_app();
    let response = post(app, "/api/v1/campaign/import").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Draft, estimate, preview
// ---------------------------------------------------------------------------

#[tokio::test]
async fn draft_returns_live_estimate_for_included_rows() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    let response = put_json(
        app.clone(),
        "/api/v1/campaign/draft",
        json!({ "message": "Sale today" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["segments"], 1);
    assert_eq!(json["data"]["encoding"], "gsm7");
    assert_eq!(json["data"]["recipient_count"], 3);
    assert_eq!(json["data"]["total_segments"], 3);
}

#[tokio::test]
async fn overlong_draft_is_rejected() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    let response = put_json(
        app.clone(),
        "/api/v1/campaign/draft",
        json!({ "message": "a".repeat(1601) }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    // The previous draft is kept.
    assert_eq!(view(&app).await["draft"]["message"], "Hi [name], 20% off today!");
}

#[tokio::test]
async fn stateless_estimate_counts_segments() {
    let app = common::build_test_app();

    let response = post_json(
        app.clone(),
        "/api/v1/campaign/estimate",
        json!({ "message": "a".repeat(161), "recipient_count": 10 }),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["segments"], 2);
    assert_eq!(json["data"]["total_segments"], 20);

    let response = post_json(
        app,
        "/api/v1/campaign/estimate",
        json!({ "message": "Hello 👋" }),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["encoding"], "ucs2");
    assert_eq!(json["data"]["recipient_count"], 1);
}

#[tokio::test]
async fn preview_personalizes_for_one_row() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    let alice = row_id(&view(&app).await, "Alice");

    let response = get(app, &format!("/api/v1/campaign/rows/{alice}/preview")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["message"], "Hi Alice, 20% off today!");
}

#[tokio::test]
async fn preview_of_unknown_row_is_not_found() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    let response = get(app, "/api/v1/campaign/rows/9999/preview").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn toggle_and_bulk_selection() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    let bob = row_id(&view(&app).await, "Bob");

    let json = body_json(post(app.clone(), &format!("/api/v1/campaign/rows/{bob}/toggle")).await).await;
    assert_eq!(json["data"]["included"], false);
    assert_eq!(json["data"]["changed"], true);
    assert_eq!(view(&app).await["counts"]["included"], 2);

    let json = body_json(post(app.clone(), "/api/v1/campaign/selection/none").await).await;
    assert_eq!(json["data"]["counts"]["included"], 0);

    let json = body_json(post(app.clone(), "/api/v1/campaign/selection/all").await).await;
    assert_eq!(json["data"]["counts"]["included"], 3);
}

#[tokio::test]
async fn toggling_excluded_or_unknown_row_changes_nothing() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    let excluded = view(&app).await["rows"][2]["id"].as_u64().unwrap();

    for id in [excluded, 9999] {
        let response = post(app.clone(), &format!("/api/v1/campaign/rows/{id}/toggle")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["changed"], false);
        assert_eq!(json["data"]["included"], false);
    }
    assert_eq!(view(&app).await["counts"]["included"], 3);
}

// ---------------------------------------------------------------------------
// Removal & undo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn remove_then_undo_restores_row_and_inclusion() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    let bob = row_id(&view(&app).await, "Bob");

    let json = body_json(delete(app.clone(), &format!("/api/v1/campaign/rows/{bob}")).await).await;
    let data = &json["data"];
    assert_eq!(data["counts"]["imported"], 3);
    assert_eq!(data["counts"]["included"], 2);
    assert_eq!(data["notice"]["message"], "Removed 1 recipient");
    assert_eq!(data["can_undo"], true);

    let json = body_json(post(app.clone(), "/api/v1/campaign/undo").await).await;
    let data = &json["data"];
    assert_eq!(data["counts"]["imported"], 4);
    assert_eq!(data["counts"]["included"], 3);
    assert_eq!(data["rows"][1]["name"], "Bob");
    assert_eq!(data["rows"][1]["included"], true);
    assert!(data["notice"].is_null());
    assert_eq!(data["can_undo"], false);
}

#[tokio::test]
async fn remove_included_keeps_excluded_rows() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;

    let json = body_json(post(app.clone(), "/api/v1/campaign/selection/remove").await).await;
    let data = &json["data"];
    assert_eq!(data["counts"]["imported"], 1);
    assert_eq!(data["counts"]["excluded"], 1);
    assert_eq!(data["notice"]["message"], "Removed 3 recipients");

    let json = body_json(post(app.clone(), "/api/v1/campaign/undo").await).await;
    assert_eq!(json["data"]["counts"]["imported"], 4);
    assert_eq!(json["data"]["counts"]["included"], 3);
}

#[tokio::test]
async fn dismissing_notice_forfeits_undo() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    let bob = row_id(&view(&app).await, "Bob");
    delete(app.clone(), &format!("/api/v1/campaign/rows/{bob}")).await;

    let json = body_json(post(app.clone(), "/api/v1/campaign/notice/dismiss").await).await;
    assert!(json["data"]["notice"].is_null());
    assert_eq!(json["data"]["can_undo"], false);

    let json = body_json(post(app.clone(), "/api/v1/campaign/undo").await).await;
    assert_eq!(json["data"]["counts"]["imported"], 3);
}

#[tokio::test]
async fn removing_unknown_row_is_silent() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    let response = delete(app.clone(), "/api/v1/campaign/rows/9999").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["counts"]["imported"], 4);
    assert!(json["data"]["notice"].is_null());
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatch_sends_to_included_rows_and_reports_results() {
    let gateway = Arc::new(FakeGateway::new());
    let app = previewing_app(Arc::clone(&gateway)).await;
    let bob = row_id(&view(&app).await, "Bob");
    post(app.clone(), &format!("/api/v1/campaign/rows/{bob}/toggle")).await;

    let response = dispatch(app.clone(), Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let summary = &json["data"]["summary"];
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["sent"], 1);
    assert_eq!(summary["failed"], 1);
    assert_eq!(summary["unmatched"], 0);

    let results = json["data"]["results"].as_array().unwrap();
    assert_eq!(results[0]["name"], "Alice");
    assert_eq!(results[0]["status"], "sent");
    assert_eq!(results[1]["name"], "Dan");
    assert_eq!(results[1]["status"], "failed");
    assert_eq!(results[1]["error"], "Invalid phone number");

    // Only the included rows went out, with the raw template.
    let requests = gateway.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].recipients.len(), 2);
    assert_eq!(requests[0].message, "Hi [name], 20% off today!");

    let view = view(&app).await;
    assert_eq!(view["phase"], "results");
    assert_eq!(view["draft"]["message"], "");
}

#[tokio::test]
async fn dispatch_requires_credential_header() {
    let gateway = Arc::new(FakeGateway::new());
    let app = previewing_app(Arc::clone(&gateway)).await;

    let response = dispatch(app.clone(), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(gateway.request_count(), 0);
    assert_eq!(view(&app).await["phase"], "previewing");
}

#[tokio::test]
async fn dispatch_with_blank_draft_is_rejected() {
    let gateway = Arc::new(FakeGateway::new());
    let app = previewing_app(Arc::clone(&gateway)).await;
    put_json(app.clone(), "/api/v1/campaign/draft", json!({ "message": "  " })).await;

    let response = dispatch(app.clone(), Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Message cannot be empty");
    assert_eq!(gateway.request_count(), 0);

    let view = view(&app).await;
    assert_eq!(view["phase"], "previewing");
    assert_eq!(view["error"], "Message cannot be empty");
}

#[tokio::test]
async fn dispatch_with_nothing_included_is_rejected() {
    let gateway = Arc::new(FakeGateway::new());
    let app = previewing_app(Arc::clone(&gateway)).await;
    post(app.clone(), "/api/v1/campaign/selection/none").await;

    let response = dispatch(app.clone(), Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Select at least one recipient");
    assert_eq!(gateway.request_count(), 0);
}

#[tokio::test]
async fn dispatch_before_import_is_conflict() {
    let app = common::build_test_app();
    let response = dispatch(app, Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn transport_failure_reverts_to_previewing() {
    let gateway = Arc::new(FakeGateway::new());
    gateway.unreachable.store(true, Ordering::SeqCst);
    let app = previewing_app(Arc::clone(&gateway)).await;

    let response = dispatch(app.clone(), Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "TRANSPORT_ERROR");

    let view = view(&app).await;
    assert_eq!(view["phase"], "previewing");
    assert_eq!(view["counts"]["included"], 3);
    assert_eq!(view["draft"]["message"], "Hi [name], 20% off today!");
    assert_eq!(view["error"], "Could not reach the SMS service. Please try again.");

    // Retry succeeds and clears the error.
    gateway.unreachable.store(false, Ordering::SeqCst);
    let response = dispatch(app.clone(), Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(self::view(&app).await["error"].is_null());
}

#[tokio::test]
async fn panicking_dispatch_task_returns_500_and_reverts() {
    let gateway = Arc::new(FakeGateway::new());
    gateway.panics.store(true, Ordering::SeqCst);
    let app = previewing_app(Arc::clone(&gateway)).await;

    let response = dispatch(app.clone(), Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");

    let view = view(&app).await;
    assert_eq!(view["phase"], "previewing");
    assert!(!view["error"].is_null());

    gateway.panics.store(false, Ordering::SeqCst);
    let response = dispatch(app.clone(), Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_pin_is_unauthorized_and_reverts() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;

    let response = dispatch(app.clone(), Some("0000")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(view(&app).await["phase"], "previewing");
}

#[tokio::test]
async fn reordered_echo_is_reconciled_by_phone() {
    let gateway = Arc::new(FakeGateway::new());
    gateway.reverse_echo.store(true, Ordering::SeqCst);
    let app = previewing_app(Arc::clone(&gateway)).await;
    let before = view(&app).await;

    let json = body_json(dispatch(app.clone(), Some(TEST_PIN)).await).await;
    let results = json["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    for result in results {
        let name = result["name"].as_str().unwrap();
        assert_eq!(result["row_id"], row_id(&before, name));
    }
}

#[tokio::test]
async fn mutations_during_send_are_reconciled_by_row_id() {
    let release = Arc::new(Notify::new());
    let gateway = Arc::new(FakeGateway::held(Arc::clone(&release)));
    let app = previewing_app(Arc::clone(&gateway)).await;
    let alice = row_id(&view(&app).await, "Alice");

    let in_flight = tokio::spawn(dispatch(app.clone(), Some(TEST_PIN)));
    while gateway.request_count() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(view(&app).await["phase"], "sending");

    // A second dispatch is refused without touching the gateway.
    let response = dispatch(app.clone(), Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(gateway.request_count(), 1);

    // Remove a dispatched row while the send is in flight.
    delete(app.clone(), &format!("/api/v1/campaign/rows/{alice}")).await;

    release.notify_one();
    let response = in_flight.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    // The summary counts every result; the rendered list skips Alice.
    assert_eq!(json["data"]["summary"]["total"], 3);
    let names: Vec<&str> = json["data"]["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Bob", "Dan"]);
}

#[tokio::test]
async fn results_phase_refuses_second_dispatch() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    dispatch(app.clone(), Some(TEST_PIN)).await;

    let response = dispatch(app.clone(), Some(TEST_PIN)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(view(&app).await["phase"], "results");
}

// ---------------------------------------------------------------------------
// Credential check & reset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verify_pin_reports_validity() {
    let app = common::build_test_app();

    let json = body_json(
        post_json(app.clone(), "/api/v1/campaign/verify-pin", json!({ "pin": TEST_PIN })).await,
    )
    .await;
    assert_eq!(json["data"]["valid"], true);

    let json = body_json(
        post_json(app, "/api/v1/campaign/verify-pin", json!({ "pin": "9999" })).await,
    )
    .await;
    assert_eq!(json["data"]["valid"], false);
}

#[tokio::test]
async fn new_broadcast_clears_everything() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    dispatch(app.clone(), Some(TEST_PIN)).await;

    let json = body_json(post(app.clone(), "/api/v1/campaign/new").await).await;
    let data = &json["data"];
    assert_eq!(data["phase"], "empty");
    assert_eq!(data["counts"]["imported"], 0);
    assert_eq!(data["results"].as_array().unwrap().len(), 0);
    assert!(data["summary"].is_null());
}

#[tokio::test]
async fn reimport_after_results_starts_fresh_preview() {
    let app = previewing_app(Arc::new(FakeGateway::new())).await;
    dispatch(app.clone(), Some(TEST_PIN)).await;

    let response = post_file(
        app.clone(),
        "/api/v1/campaign/import",
        "more.csv",
        b"Eve,555-000-0003\n",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let view = view(&app).await;
    assert_eq!(view["phase"], "previewing");
    assert_eq!(view["counts"]["imported"], 1);
    assert!(view["summary"].is_null());
}
