//! End-to-end seating flows over HTTP against the in-memory store.

mod common;

use axum::http::{Method, StatusCode};
use axum::Router;
use common::{build_test_app, get, post, send, token};
use serde_json::{json, Value};
use transit_api::auth::Role;

/// Creates a bus type with a `rows` x `cols` grid; returns (bus type id, seat ids).
async fn bus_type(app: &Router, admin: &str, name: &str, rows: u32, cols: u32) -> (i64, Vec<i64>) {
    let (status, bt) = post(app, "/api/admin/bus-types", admin, json!({ "name": name, "seatCount": rows * cols })).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = bt["id"].as_i64().unwrap();

    let (status, grid) = post(
        app,
        &format!("/api/admin/bus-types/{}/seat-map/grid", id),
        admin,
        json!({ "rows": rows, "cols": cols }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grid["created"], rows * cols);

    let (_, seats) = get(app, &format!("/api/admin/bus-types/{}/seats", id), admin).await;
    let ids = seats.as_array().unwrap().iter().map(|s| s["id"].as_i64().unwrap()).collect();
    (id, ids)
}

async fn trip(app: &Router, tok: &str, bus_type_id: i64) -> String {
    let (status, trip) = post(
        app,
        "/api/booking/trips",
        tok,
        json!({
            "busTypeId": bus_type_id,
            "departureDt": "2025-08-27T06:30:00Z",
            "originLabel": "Damascus",
            "destinationLabel": "Aleppo"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trip["status"], "scheduled");
    trip["id"].as_str().unwrap().to_string()
}

fn booking_body(trip_id: &str, seat_id: i64) -> Value {
    json!({
        "tripId": trip_id,
        "seatId": seat_id,
        "passengerName": "Ahmad",
        "boardingPoint": "Damascus",
        "phone": "0944 123 456"
    })
}

async fn available(app: &Router, tok: &str, trip_id: &str) -> Vec<i64> {
    let (status, body) = get(app, &format!("/api/booking/trips/{}/seats/available", trip_id), tok).await;
    assert_eq!(status, StatusCode::OK);
    body["availableSeatIds"].as_array().unwrap().iter().map(|v| v.as_i64().unwrap()).collect()
}

#[tokio::test]
async fn book_cancel_and_rebook_a_seat() {
    let app = build_test_app();
    let admin = token(Role::Admin, 1);
    let booking = token(Role::Booking, 2);

    let (bt, seats) = bus_type(&app, &admin, "Coach", 2, 2).await;
    let trip_id = trip(&app, &booking, bt).await;

    let (status, map) = get(&app, &format!("/api/booking/trips/{}/seat-map", trip_id), &booking).await;
    assert_eq!(status, StatusCode::OK);
    let positions: Vec<(i64, i64)> = map["seats"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["row"].as_i64().unwrap(), e["col"].as_i64().unwrap()))
        .collect();
    assert_eq!(positions, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);

    let (status, reservation) = post(&app, "/api/booking/reservations", &booking, booking_body(&trip_id, seats[0])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reservation["createdBy"], 2);
    assert_eq!(reservation["phone"], "0944 123 456");
    assert_eq!(reservation["amount"], 0);
    let reservation_id = reservation["id"].as_str().unwrap().to_string();

    let (status, body) = post(&app, "/api/booking/reservations", &booking, booking_body(&trip_id, seats[0])).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    assert_eq!(available(&app, &booking, &trip_id).await, seats[1..].to_vec());

    let (_, map) = get(&app, &format!("/api/booking/trips/{}/seat-map", trip_id), &booking).await;
    assert_eq!(map["seats"][0]["reserved"], true);
    assert_eq!(map["seats"][0]["reservationId"], reservation_id.as_str());
    assert_eq!(map["seats"][1]["reserved"], false);
    assert!(map["seats"][1].get("reservationId").is_none());

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/booking/reservations/{}", reservation_id),
        Some(booking.as_str()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(available(&app, &booking, &trip_id).await, seats);

    let (status, _) = post(&app, "/api/booking/reservations", &booking, booking_body(&trip_id, seats[0])).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn reservation_validation_errors() {
    let app = build_test_app();
    let admin = token(Role::Admin, 1);
    let booking = token(Role::Booking, 2);

    let (coach, _) = bus_type(&app, &admin, "Coach", 2, 2).await;
    let (_, mini_seats) = bus_type(&app, &admin, "Mini", 1, 1).await;
    let trip_id = trip(&app, &booking, coach).await;

    let (status, body) = post(&app, "/api/booking/reservations", &booking, booking_body(&trip_id, mini_seats[0])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert_eq!(body["error"], "Seat does not belong to trip's bus type");

    let (status, _) = post(&app, "/api/booking/reservations", &booking, json!({ "tripId": trip_id })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(&app, "/api/booking/reservations", &booking, booking_body("999999", mini_seats[0])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (_, list) = get(&app, &format!("/api/booking/trips/{}/reservations", trip_id), &booking).await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn malformed_requests_get_error_body() {
    let app = build_test_app();
    let booking = token(Role::Booking, 2);

    let (status, body) = get(&app, "/api/booking/trips/not-a-number", &booking).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    let (status, body) = get(&app, "/api/booking/trips/424242", &booking).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "trip 424242 not found");

    let (status, body) = post(&app, "/api/booking/reservations", &booking, json!({ "seatId": "one" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn move_reservation_and_patch_fields() {
    let app = build_test_app();
    let admin = token(Role::Admin, 1);
    let booking = token(Role::Booking, 2);

    let (bt, seats) = bus_type(&app, &admin, "Coach", 2, 2).await;
    let trip_id = trip(&app, &booking, bt).await;

    let (_, a) = post(&app, "/api/booking/reservations", &booking, booking_body(&trip_id, seats[0])).await;
    post(&app, "/api/booking/reservations", &booking, booking_body(&trip_id, seats[1])).await;
    let a_uri = format!("/api/booking/reservations/{}", a["id"].as_str().unwrap());

    let (status, _) = send(&app, Method::PATCH, &a_uri, Some(booking.as_str()), Some(json!({ "seatId": seats[1] }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, updated) = send(
        &app,
        Method::PATCH,
        &a_uri,
        Some(booking.as_str()),
        Some(json!({ "seatId": seats[3], "paid": true, "amount": 25000, "notes": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["seatId"], seats[3]);
    assert_eq!(updated["paid"], true);
    assert_eq!(updated["amount"], 25000);

    let (_, view) = get(&app, &a_uri, &booking).await;
    assert_eq!((view["row"].as_i64(), view["col"].as_i64()), (Some(2), Some(2)));
    assert_eq!(view["passengerName"], "Ahmad");
}

#[tokio::test]
async fn grid_regeneration_refused_while_seats_are_booked() {
    let app = build_test_app();
    let admin = token(Role::Admin, 1);

    let (bt, seats) = bus_type(&app, &admin, "Coach", 2, 2).await;
    let trip_id = trip(&app, &admin, bt).await;
    post(&app, "/api/booking/reservations", &admin, booking_body(&trip_id, seats[2])).await;

    let (status, body) = post(
        &app,
        &format!("/api/admin/bus-types/{}/seat-map/grid", bt),
        &admin,
        json!({ "rows": 3, "cols": 3 }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (_, types) = get(&app, "/api/admin/bus-types", &admin).await;
    assert_eq!(types[0]["seatCountActual"], 4);
}

#[tokio::test]
async fn ops_manifest_payments_and_trip_lifecycle() {
    let app = build_test_app();
    let admin = token(Role::Admin, 1);
    let booking = token(Role::Booking, 2);
    let ops = token(Role::Ops, 3);

    let (coach, seats) = bus_type(&app, &admin, "Coach", 1, 3).await;
    let (mini, _) = bus_type(&app, &admin, "Mini", 1, 1).await;

    let (status, trip) = post(
        &app,
        "/api/ops/trips",
        &ops,
        json!({
            "busTypeId": coach,
            "departureTime": "2025-09-01T08:00:00Z",
            "originLabel": "Homs",
            "destinationLabel": "Latakia",
            "driverName": "Abu Samer"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let trip_id = trip["id"].as_str().unwrap().to_string();
    let trip_uri = format!("/api/ops/trips/{}", trip_id);

    // Booking staff cannot rebind; the field is dropped and nothing remains.
    let (status, _) = send(
        &app,
        Method::PATCH,
        &format!("/api/booking/trips/{}", trip_id),
        Some(booking.as_str()),
        Some(json!({ "busTypeId": mini })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, rebound) = send(&app, Method::PATCH, &trip_uri, Some(ops.as_str()), Some(json!({ "busTypeId": mini }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rebound["busTypeId"], mini);
    let (status, _) = send(&app, Method::PATCH, &trip_uri, Some(ops.as_str()), Some(json!({ "busTypeId": coach }))).await;
    assert_eq!(status, StatusCode::OK);

    let mut paid = booking_body(&trip_id, seats[0]);
    paid["paid"] = json!(true);
    paid["amount"] = json!(15000);
    post(&app, "/api/booking/reservations", &booking, paid).await;

    let (status, walk_in) = post(
        &app,
        &format!("/api/ops/trips/{}/passengers", trip_id),
        &ops,
        json!({ "passengerName": "Rana" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(walk_in["seatId"], Value::Null);
    assert_eq!(walk_in["paid"], false);

    let (status, manifest) = get(&app, &format!("/api/ops/trips/{}/passengers", trip_id), &ops).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(manifest.as_array().unwrap().len(), 2);
    assert_eq!(manifest[1]["passengerName"], "Rana");

    let (_, summary) = get(&app, &format!("/api/ops/trips/{}/payments-summary", trip_id), &ops).await;
    assert_eq!(summary, json!({ "tripId": trip_id, "totalPaid": 15000, "paidCount": 1, "unpaidCount": 1 }));

    let (status, _) = send(&app, Method::PATCH, &trip_uri, Some(ops.as_str()), Some(json!({ "busTypeId": mini }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::DELETE, &trip_uri, Some(ops.as_str()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, detail) = get(&app, &format!("/api/booking/trips/{}", trip_id), &booking).await;
    assert_eq!(detail["reservationCount"], 2);
    assert_eq!(detail["busTypeName"], "Coach");

    let (status, _) = get(&app, "/api/ops/trips/777/payments-summary", &ops).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn trip_listing_filters() {
    let app = build_test_app();
    let admin = token(Role::Admin, 1);
    let booking = token(Role::Booking, 2);

    let (coach, _) = bus_type(&app, &admin, "Coach", 1, 1).await;
    let (mini, _) = bus_type(&app, &admin, "Mini", 1, 1).await;
    let first = trip(&app, &booking, coach).await;
    let second = trip(&app, &booking, mini).await;

    let (_, all) = get(&app, "/api/booking/trips", &booking).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, by_bus) = get(&app, &format!("/api/booking/trips?busTypeId={}", mini), &booking).await;
    assert_eq!(by_bus.as_array().unwrap().len(), 1);
    assert_eq!(by_bus[0]["id"], second.as_str());

    let (_, admin_view) = get(&app, &format!("/api/admin/trips/{}", first), &admin).await;
    assert_eq!(admin_view["busTypeName"], "Coach");

    let (status, _) = get(&app, "/api/booking/trips?from=yesterday", &booking).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ops_and_booking_trip_creation_share_validation() {
    let app = build_test_app();
    let admin = token(Role::Admin, 1);
    let ops = token(Role::Ops, 3);
    let booking = token(Role::Booking, 2);
    let (coach, _) = bus_type(&app, &admin, "Coach", 1, 1).await;

    // No driverName on either route.
    let body = json!({
        "busTypeId": coach,
        "departureTime": "2025-09-01T08:00:00Z",
        "originLabel": "Homs",
        "destinationLabel": "Latakia"
    });
    for (uri, tok) in [("/api/ops/trips", &ops), ("/api/booking/trips", &booking)] {
        let (status, trip) = post(&app, uri, tok, body.clone()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(trip["driverName"], Value::Null);
    }

    let no_origin = json!({ "busTypeId": coach, "departureDt": "2025-09-01T08:00:00Z", "destinationLabel": "Latakia" });
    for (uri, tok) in [("/api/ops/trips", &ops), ("/api/booking/trips", &booking)] {
        let (status, body) = post(&app, uri, tok, no_origin.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_ARGUMENT");
    }
}
