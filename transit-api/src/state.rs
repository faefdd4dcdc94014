use std::sync::Arc;

use transit_core::{
    ReservationController, ReservationLedger, SeatMapProjector, SeatTemplateRepository, SeatTemplateStore,
    TripRegistry, TripRepository,
};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub templates: SeatTemplateStore,
    pub trips: TripRegistry,
    pub seat_map: SeatMapProjector,
    pub reservations: ReservationController,
    pub auth: AuthConfig,
}

impl AppState {
    /// Wires every service onto the same set of repositories.
    pub fn new(
        trips: Arc<dyn TripRepository>,
        templates: Arc<dyn SeatTemplateRepository>,
        ledger: Arc<dyn ReservationLedger>,
        auth: AuthConfig,
    ) -> Self {
        Self {
            templates: SeatTemplateStore::new(templates.clone()),
            trips: TripRegistry::new(trips.clone(), templates.clone()),
            seat_map: SeatMapProjector::new(trips.clone(), templates.clone(), ledger.clone()),
            reservations: ReservationController::new(trips, templates, ledger),
            auth,
        }
    }
}
