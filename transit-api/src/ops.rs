use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use transit_core::models::{AddPassenger, PaymentsSummary, Reservation, ReservationView, Trip, TripPatch};
use transit_shared::TripId;

use crate::auth::{require_ops, Caller};
use crate::booking::create_trip;
use crate::error::AppError;
use crate::extract::{AppJson, AppPath};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/ops/trips", post(create_trip))
        .route("/api/ops/trips/{trip_id}", patch(update_trip).delete(delete_trip))
        .route("/api/ops/trips/{trip_id}/passengers", get(passengers).post(add_passenger))
        .route("/api/ops/trips/{trip_id}/payments-summary", get(payments_summary))
        .route_layer(middleware::from_fn_with_state(state, require_ops))
}

/// PATCH /api/ops/trips/{trip_id}
///
/// Unlike the booking route, this one may rebind the bus type.
async fn update_trip(
    State(state): State<AppState>,
    AppPath(trip_id): AppPath<TripId>,
    AppJson(patch): AppJson<TripPatch>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.trips.patch(trip_id, patch).await?))
}

/// DELETE /api/ops/trips/{trip_id}
async fn delete_trip(State(state): State<AppState>, AppPath(trip_id): AppPath<TripId>) -> Result<Json<Value>, AppError> {
    state.trips.delete(trip_id).await?;
    Ok(Json(json!({ "message": "Trip deleted successfully" })))
}

/// GET /api/ops/trips/{trip_id}/passengers
async fn passengers(
    State(state): State<AppState>,
    AppPath(trip_id): AppPath<TripId>,
) -> Result<Json<Vec<ReservationView>>, AppError> {
    Ok(Json(state.reservations.passenger_manifest(trip_id).await?))
}

/// POST /api/ops/trips/{trip_id}/passengers
async fn add_passenger(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    AppPath(trip_id): AppPath<TripId>,
    AppJson(req): AppJson<AddPassenger>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let reservation = state.reservations.add_passenger(trip_id, req, caller.user_id).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// GET /api/ops/trips/{trip_id}/payments-summary
async fn payments_summary(
    State(state): State<AppState>,
    AppPath(trip_id): AppPath<TripId>,
) -> Result<Json<PaymentsSummary>, AppError> {
    Ok(Json(state.reservations.payments_summary(trip_id).await?))
}
