//! Fish catalog and health endpoints.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;

use koi_farm_integration_tests::TestApp;

#[tokio::test]
async fn test_list_is_sorted_by_name() {
    let app = TestApp::new().await;

    let response = app.get("/api/fishs", None).await;
    assert_eq!(response.status, StatusCode::OK);

    let names: Vec<&str> = response
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "Kohaku Grand Champion",
            "Sanke Jumbo",
            "Showa Tategoi",
            "Yamabuki Ogon"
        ]
    );
}

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let app = TestApp::new().await;

    let response = app.get("/api/fishs?search=SHOWA", None).await;
    let fish = response.body.as_array().unwrap();
    assert_eq!(fish.len(), 1);
    assert_eq!(fish[0]["fishId"], 2);
    assert_eq!(fish[0]["price"], "800.00");

    let none = app.get("/api/fishs?search=butterfly", None).await;
    assert_eq!(none.body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_show_fish() {
    let app = TestApp::new().await;

    let sold = app.get("/api/fishs/4", None).await;
    assert_eq!(sold.status, StatusCode::OK);
    assert_eq!(sold.body["breed"], "Ogon");
    assert_eq!(sold.body["available"], false);

    let missing = app.get("/api/fishs/40", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.error(), "Fish 40 not found");
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let app = TestApp::new().await;

    let bad_id = app.get("/api/fishs/abc", None).await;
    assert_eq!(bad_id.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_id.error(), "Invalid path parameter");

    let bad_query = app.get("/api/fishs?search=a&search=b", None).await;
    assert_eq!(bad_query.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_query.error(), "Invalid query string");
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new().await;

    let health = app.get("/health", None).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body, "ok");

    let ready = app.get("/health/ready", None).await;
    assert_eq!(ready.status, StatusCode::OK);
}
