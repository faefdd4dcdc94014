use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use transit_core::models::{
    AvailableSeats, CreateReservation, CreateTrip, Reservation, ReservationView, SeatMap, Trip, TripDetail,
    TripFilter, TripPatch, UpdateReservation,
};
use transit_shared::{ReservationId, TripId};

use crate::auth::{require_booking, Caller};
use crate::error::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Trips
        .route("/api/booking/trips", post(create_trip).get(list_trips))
        .route("/api/booking/trips/{trip_id}", get(get_trip).patch(patch_trip))
        // Seat map
        .route("/api/booking/trips/{trip_id}/seat-map", get(seat_map))
        .route("/api/booking/trips/{trip_id}/seats/available", get(available_seats))
        // Reservations
        .route("/api/booking/reservations", post(create_reservation))
        .route("/api/booking/trips/{trip_id}/reservations", get(list_trip_reservations))
        .route(
            "/api/booking/reservations/{id}",
            get(get_reservation).patch(update_reservation).delete(cancel_reservation),
        )
        .route_layer(middleware::from_fn_with_state(state, require_booking))
}

// ============================================================================
// Trips
// ============================================================================

/// POST /api/booking/trips
pub(crate) async fn create_trip(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    AppJson(req): AppJson<CreateTrip>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let trip = state.trips.create(req, caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

/// GET /api/booking/trips
async fn list_trips(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<TripFilter>,
) -> Result<Json<Vec<TripDetail>>, AppError> {
    Ok(Json(state.trips.list(&filter).await?))
}

/// GET /api/booking/trips/{trip_id}
async fn get_trip(
    State(state): State<AppState>,
    AppPath(trip_id): AppPath<TripId>,
) -> Result<Json<TripDetail>, AppError> {
    Ok(Json(state.trips.get(trip_id).await?))
}

/// PATCH /api/booking/trips/{trip_id}
///
/// Booking staff cannot rebind the bus type; that field is ignored here.
async fn patch_trip(
    State(state): State<AppState>,
    AppPath(trip_id): AppPath<TripId>,
    AppJson(mut patch): AppJson<TripPatch>,
) -> Result<Json<Trip>, AppError> {
    patch.bus_type_id = None;
    Ok(Json(state.trips.patch(trip_id, patch).await?))
}

// ============================================================================
// Seat Map
// ============================================================================

/// GET /api/booking/trips/{trip_id}/seat-map
async fn seat_map(State(state): State<AppState>, AppPath(trip_id): AppPath<TripId>) -> Result<Json<SeatMap>, AppError> {
    Ok(Json(state.seat_map.project(trip_id).await?))
}

/// GET /api/booking/trips/{trip_id}/seats/available
async fn available_seats(
    State(state): State<AppState>,
    AppPath(trip_id): AppPath<TripId>,
) -> Result<Json<AvailableSeats>, AppError> {
    Ok(Json(state.seat_map.available_seat_ids(trip_id).await?))
}

// ============================================================================
// Reservations
// ============================================================================

/// POST /api/booking/reservations
async fn create_reservation(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    AppJson(req): AppJson<CreateReservation>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let reservation = state.reservations.create(req, caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// GET /api/booking/trips/{trip_id}/reservations
async fn list_trip_reservations(
    State(state): State<AppState>,
    AppPath(trip_id): AppPath<TripId>,
) -> Result<Json<Vec<ReservationView>>, AppError> {
    Ok(Json(state.reservations.list_by_trip(trip_id).await?))
}

/// GET /api/booking/reservations/{id}
async fn get_reservation(
    State(state): State<AppState>,
    AppPath(id): AppPath<ReservationId>,
) -> Result<Json<ReservationView>, AppError> {
    Ok(Json(state.reservations.get(id).await?))
}

/// PATCH /api/booking/reservations/{id}
async fn update_reservation(
    State(state): State<AppState>,
    AppPath(id): AppPath<ReservationId>,
    AppJson(req): AppJson<UpdateReservation>,
) -> Result<Json<Reservation>, AppError> {
    Ok(Json(state.reservations.update(id, req).await?))
}

/// DELETE /api/booking/reservations/{id}
async fn cancel_reservation(
    State(state): State<AppState>,
    AppPath(id): AppPath<ReservationId>,
) -> Result<Json<Value>, AppError> {
    state.reservations.cancel(id).await?;
    Ok(Json(json!({ "message": "Reservation canceled" })))
}
