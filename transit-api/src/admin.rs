use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use transit_core::models::{
    BusType, BusTypeSummary, CreateBusType, GenerateGrid, GridSummary, Seat, TripDetail, TripFilter,
};
use transit_shared::{BusTypeId, TripId};

use crate::auth::require_admin;
use crate::error::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/bus-types", post(create_bus_type).get(list_bus_types))
        .route("/api/admin/bus-types/{id}/seat-map/grid", post(generate_grid))
        .route("/api/admin/bus-types/{id}/seats", get(list_seats))
        .route("/api/admin/trips", get(list_trips))
        .route("/api/admin/trips/{trip_id}", get(get_trip))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

// ============================================================================
// Bus Types & Seat Grids
// ============================================================================

/// POST /api/admin/bus-types
async fn create_bus_type(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateBusType>,
) -> Result<(StatusCode, Json<BusType>), AppError> {
    let bus_type = state.templates.create_bus_type(req).await?;
    Ok((StatusCode::CREATED, Json(bus_type)))
}

/// GET /api/admin/bus-types
async fn list_bus_types(State(state): State<AppState>) -> Result<Json<Vec<BusTypeSummary>>, AppError> {
    Ok(Json(state.templates.list_bus_types().await?))
}

/// POST /api/admin/bus-types/{id}/seat-map/grid
async fn generate_grid(
    State(state): State<AppState>,
    AppPath(id): AppPath<BusTypeId>,
    AppJson(req): AppJson<GenerateGrid>,
) -> Result<Json<GridSummary>, AppError> {
    Ok(Json(state.templates.generate_grid(id, req).await?))
}

/// GET /api/admin/bus-types/{id}/seats
async fn list_seats(
    State(state): State<AppState>,
    AppPath(id): AppPath<BusTypeId>,
) -> Result<Json<Vec<Seat>>, AppError> {
    Ok(Json(state.templates.list_seats(id).await?))
}

// ============================================================================
// Trips (read-only)
// ============================================================================

/// GET /api/admin/trips
async fn list_trips(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<TripFilter>,
) -> Result<Json<Vec<TripDetail>>, AppError> {
    Ok(Json(state.trips.list(&filter).await?))
}

/// GET /api/admin/trips/{trip_id}
async fn get_trip(
    State(state): State<AppState>,
    AppPath(trip_id): AppPath<TripId>,
) -> Result<Json<TripDetail>, AppError> {
    Ok(Json(state.trips.get(trip_id).await?))
}
