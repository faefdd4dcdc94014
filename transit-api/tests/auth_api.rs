//! Authentication and role checks on the router.

mod common;

use axum::http::{Method, StatusCode};
use common::{build_test_app, get, send, token};
use serde_json::json;
use transit_api::auth::Role;

#[tokio::test]
async fn health_needs_no_token() {
    let app = build_test_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let app = build_test_app();

    let (status, body) = send(&app, Method::GET, "/api/booking/trips", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = get(&app, "/api/booking/trips", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn roles_gate_each_surface() {
    let app = build_test_app();
    let admin = token(Role::Admin, 1);
    let booking = token(Role::Booking, 2);
    let ops = token(Role::Ops, 3);

    let (status, body) = get(&app, "/api/admin/bus-types", &booking).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    assert_eq!(get(&app, "/api/booking/trips", &ops).await.0, StatusCode::FORBIDDEN);
    assert_eq!(
        send(&app, Method::POST, "/api/ops/trips", Some(booking.as_str()), Some(json!({}))).await.0,
        StatusCode::FORBIDDEN
    );

    // Admin passes every guard.
    assert_eq!(get(&app, "/api/admin/bus-types", &admin).await.0, StatusCode::OK);
    assert_eq!(get(&app, "/api/booking/trips", &admin).await.0, StatusCode::OK);
    assert_eq!(get(&app, "/api/booking/trips", &booking).await.0, StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_not_found_even_without_token() {
    let app = build_test_app();
    let (status, _) = send(&app, Method::GET, "/api/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
