//! Order lifecycle through the HTTP API.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use serde_json::json;

use koi_farm_api::db::{OrderStore, RepositoryError};
use koi_farm_core::{OrderId, Role};
use koi_farm_integration_tests::TestApp;

// ============================================================================
// Line editing
// ============================================================================

#[tokio::test]
async fn test_order_seven_add_then_remove_line() {
    let app = TestApp::new().await;
    let (_, other) = app.create_user("hiro", Role::Customer).await;
    let (_, token) = app.create_user("aiko", Role::Customer).await;

    for _ in 0..6 {
        app.create_order(&other).await;
    }
    let order_id = app.create_order(&token).await;
    assert_eq!(order_id, 7);

    let empty = app.get("/api/orders/7", Some(&token)).await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.body["orderLines"], json!([]));

    let added = app
        .post(
            "/api/orders/7/orderlines",
            Some(&token),
            Some(json!({"fishId": 3, "quantity": 2})),
        )
        .await;
    assert_eq!(added.status, StatusCode::OK, "{:?}", added.body);

    let fetched = app.get("/api/orders/7", Some(&token)).await;
    let lines = fetched.body["orderLines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["fishId"], 3);
    assert_eq!(lines[0]["quantity"], 2);
    assert_eq!(lines[0]["unitPrice"], "950.00");
    assert_eq!(fetched.body["total"], "1900.00");

    let removed = app.delete("/api/orders/7/orderlines/3", Some(&token)).await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);

    let after = app.get("/api/orders/7", Some(&token)).await;
    assert_eq!(after.body["orderLines"], json!([]));
    assert_eq!(after.body["total"], "0.00");
}

#[tokio::test]
async fn test_adding_same_fish_merges_quantities() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("aiko", Role::Customer).await;
    let id = app.create_order(&token).await;
    let uri = format!("/api/orders/{id}/orderlines");

    app.post(&uri, Some(&token), Some(json!({"fishId": 1, "quantity": 1})))
        .await;
    let merged = app
        .post(&uri, Some(&token), Some(json!({"fishId": 1, "quantity": 2})))
        .await;

    let lines = merged.body["orderLines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["quantity"], 3);
}

#[tokio::test]
async fn test_removing_absent_line_is_noop() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("aiko", Role::Customer).await;
    let id = app.create_order(&token).await;

    let response = app
        .delete(&format!("/api/orders/{id}/orderlines/2"), Some(&token))
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let order = app.get(&format!("/api/orders/{id}"), Some(&token)).await;
    assert_eq!(order.body["version"], 1);
}

#[tokio::test]
async fn test_create_order_with_initial_lines() {
    let app = TestApp::new().await;
    let (user, token) = app.create_user("aiko", Role::Customer).await;

    let response = app
        .post(
            "/api/orders",
            Some(&token),
            Some(json!({"orderLines": [
                {"fishId": 2, "quantity": 1},
                {"fishId": 1, "quantity": 1},
            ]})),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["customerId"], user.id.as_i32());
    assert_eq!(response.body["paymentStatus"], "pending");
    let fish: Vec<i64> = response.body["orderLines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["fishId"].as_i64().unwrap())
        .collect();
    assert_eq!(fish, vec![1, 2]);
    assert_eq!(response.body["total"], "2050.00");
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_line_validation_errors() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("aiko", Role::Customer).await;
    let id = app.create_order(&token).await;
    let uri = format!("/api/orders/{id}/orderlines");

    let sold = app
        .post(&uri, Some(&token), Some(json!({"fishId": 4, "quantity": 1})))
        .await;
    assert_eq!(sold.status, StatusCode::BAD_REQUEST);
    assert_eq!(sold.error(), "Fish 4 is not available");

    let unknown = app
        .post(&uri, Some(&token), Some(json!({"fishId": 99, "quantity": 1})))
        .await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);

    let zero = app
        .post(&uri, Some(&token), Some(json!({"fishId": 1, "quantity": 0})))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let malformed = app
        .post(&uri, Some(&token), Some(json!({"fish": "kohaku"})))
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let order = app.get(&format!("/api/orders/{id}"), Some(&token)).await;
    assert_eq!(order.body["orderLines"], json!([]));
}

#[tokio::test]
async fn test_missing_order_is_not_found_everywhere() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("aiko", Role::Customer).await;

    assert_eq!(
        app.get("/api/orders/404", Some(&token)).await.status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.post(
            "/api/orders/404/orderlines",
            Some(&token),
            Some(json!({"fishId": 1, "quantity": 1}))
        )
        .await
        .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.delete("/api/orders/404/orderlines/1", Some(&token))
            .await
            .status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.post("/api/orders/404/pay", Some(&token), None)
            .await
            .status,
        StatusCode::NOT_FOUND
    );

    let all = app.state().stores().orders.list_all().await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_malformed_path_ids_are_json_bad_requests() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("aiko", Role::Customer).await;
    let id = app.create_order(&token).await;

    for uri in ["/api/orders/abc", "/api/orders/99999999999"] {
        let response = app.get(uri, Some(&token)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(response.error(), "Invalid path parameter", "{uri}");
    }

    let bad_fish = app
        .delete(&format!("/api/orders/{id}/orderlines/xyz"), Some(&token))
        .await;
    assert_eq!(bad_fish.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_fish.error(), "Invalid path parameter");

    let bad_pay = app.post("/api/orders/-x-/pay", Some(&token), None).await;
    assert_eq!(bad_pay.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_pay.error(), "Invalid path parameter");
}

#[tokio::test]
async fn test_orders_require_token() {
    let app = TestApp::new().await;

    let response = app.get("/api/orders", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let bad = app.get("/api/orders", Some("not.a.token")).await;
    assert_eq!(bad.status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Payment
// ============================================================================

#[tokio::test]
async fn test_pay_then_pay_again() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("aiko", Role::Customer).await;
    let id = app.create_order(&token).await;
    app.post(
        &format!("/api/orders/{id}/orderlines"),
        Some(&token),
        Some(json!({"fishId": 2, "quantity": 1})),
    )
    .await;

    let paid = app
        .post(&format!("/api/orders/{id}/pay"), Some(&token), None)
        .await;
    assert_eq!(paid.status, StatusCode::OK);
    assert_eq!(paid.body["paymentStatus"], "paid");
    assert!(paid.body["paidAt"].is_string());

    let again = app
        .post(&format!("/api/orders/{id}/pay"), Some(&token), None)
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.error(), "Order has already been paid");

    let edit = app
        .post(
            &format!("/api/orders/{id}/orderlines"),
            Some(&token),
            Some(json!({"fishId": 1, "quantity": 1})),
        )
        .await;
    assert_eq!(edit.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_order_cannot_be_paid() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("aiko", Role::Customer).await;
    let id = app.create_order(&token).await;

    let response = app
        .post(&format!("/api/orders/{id}/pay"), Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Ownership
// ============================================================================

#[tokio::test]
async fn test_other_customers_order_is_hidden() {
    let app = TestApp::new().await;
    let (_, owner) = app.create_user("aiko", Role::Customer).await;
    let (_, stranger) = app.create_user("hiro", Role::Customer).await;
    let id = app.create_order(&owner).await;

    let response = app.get(&format!("/api/orders/{id}"), Some(&stranger)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let list = app.get("/api/orders", Some(&stranger)).await;
    assert_eq!(list.body, json!([]));
}

#[tokio::test]
async fn test_staff_see_and_edit_any_order() {
    let app = TestApp::new().await;
    let (_, owner) = app.create_user("aiko", Role::Customer).await;
    let (_, staff) = app.create_user("kenji", Role::Staff).await;
    let id = app.create_order(&owner).await;
    app.create_order(&owner).await;

    let shown = app.get(&format!("/api/orders/{id}"), Some(&staff)).await;
    assert_eq!(shown.status, StatusCode::OK);

    let edited = app
        .post(
            &format!("/api/orders/{id}/orderlines"),
            Some(&staff),
            Some(json!({"fishId": 1, "quantity": 1})),
        )
        .await;
    assert_eq!(edited.status, StatusCode::OK);

    let list = app.get("/api/orders", Some(&staff)).await;
    assert_eq!(list.body.as_array().unwrap().len(), 2);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_stale_version_is_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.create_user("aiko", Role::Customer).await;
    let id = app.create_order(&token).await;
    let order_id = OrderId::new(i32::try_from(id).unwrap());

    let store = &app.state().stores().orders;
    let stale = store.get_by_id(order_id).await.unwrap().unwrap();

    // A concurrent writer bumps the version through the API.
    app.post(
        &format!("/api/orders/{id}/orderlines"),
        Some(&token),
        Some(json!({"fishId": 1, "quantity": 1})),
    )
    .await;

    let result = store.save(&stale).await;
    assert!(matches!(result, Err(RepositoryError::Conflict(_))));

    let current = app.get(&format!("/api/orders/{id}"), Some(&token)).await;
    assert_eq!(current.body["orderLines"].as_array().unwrap().len(), 1);
    assert_eq!(current.body["version"], 2);
}
