use async_trait::async_trait;
use transit_shared::{BusTypeId, ReservationId, SeatId, TripId};

use crate::models::{
    BusType, BusTypeSummary, NewReservation, NewTrip, Reservation, ReservationChanges, Seat,
    Trip, TripDetail, TripFilter, TripPatch,
};

/// Failures reported by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness or restrict constraint refused the write.
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A foreign key pointed at a row that does not exist.
    #[error("missing reference: {0}")]
    MissingReference(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository for bus types and their seat grids.
#[async_trait]
pub trait SeatTemplateRepository: Send + Sync {
    async fn create_bus_type(&self, name: &str, seat_count: i32) -> StoreResult<BusType>;

    async fn get_bus_type(&self, id: BusTypeId) -> StoreResult<Option<BusType>>;

    async fn list_bus_types(&self) -> StoreResult<Vec<BusTypeSummary>>;

    /// Seats of a bus type ordered by (row, col) ascending.
    async fn list_seats(&self, bus_type_id: BusTypeId) -> StoreResult<Vec<Seat>>;

    async fn get_seat(&self, seat_id: SeatId) -> StoreResult<Option<Seat>>;

    async fn begin(&self) -> StoreResult<Box<dyn TemplateTx>>;
}

/// Transaction scope for seat grid regeneration. Dropping without `commit` rolls back.
#[async_trait]
pub trait TemplateTx: Send {
    /// Locks the bus type row for the rest of the transaction.
    async fn lock_bus_type(&mut self, id: BusTypeId) -> StoreResult<Option<BusType>>;

    /// Number of reservations, on any trip, that reference a seat of this bus type.
    async fn linked_reservation_count(&mut self, id: BusTypeId) -> StoreResult<i64>;

    /// Deletes every seat of the bus type and inserts `cells` as (row, col) pairs.
    async fn replace_seats(&mut self, id: BusTypeId, cells: &[(i32, i32)]) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Repository for scheduled trips.
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn insert(&self, trip: &NewTrip) -> StoreResult<Trip>;

    async fn get(&self, id: TripId) -> StoreResult<Option<Trip>>;

    async fn get_detail(&self, id: TripId) -> StoreResult<Option<TripDetail>>;

    /// Trips matching `filter`, ordered by departure ascending.
    async fn list(&self, filter: &TripFilter) -> StoreResult<Vec<TripDetail>>;

    async fn begin(&self) -> StoreResult<Box<dyn TripTx>>;
}

/// Transaction scope for trip mutations. Dropping without `commit` rolls back.
#[async_trait]
pub trait TripTx: Send {
    /// Reads the trip and locks it against concurrent writers.
    async fn lock(&mut self, id: TripId) -> StoreResult<Option<Trip>>;

    async fn reservation_count(&mut self, id: TripId) -> StoreResult<i64>;

    async fn apply(&mut self, id: TripId, patch: &TripPatch) -> StoreResult<Trip>;

    async fn delete(&mut self, id: TripId) -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Storage for reservation rows. Holds no business rules beyond key
/// uniqueness and the (trip, seat) unique index.
#[async_trait]
pub trait ReservationLedger: Send + Sync {
    async fn get(&self, id: ReservationId) -> StoreResult<Option<Reservation>>;

    /// Reservations of a trip ordered by id ascending.
    async fn list_by_trip(&self, trip_id: TripId) -> StoreResult<Vec<Reservation>>;

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;
}

/// Transaction scope for reservation writes. Dropping without `commit` rolls back.
#[async_trait]
pub trait LedgerTx: Send {
    /// Reads the trip and holds a shared lock so its bus-type binding cannot
    /// change until this transaction ends.
    async fn lock_trip(&mut self, trip_id: TripId) -> StoreResult<Option<Trip>>;

    async fn get_for_update(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>>;

    async fn find_by_trip_and_seat(
        &mut self,
        trip_id: TripId,
        seat_id: SeatId,
    ) -> StoreResult<Option<Reservation>>;

    /// Fails with `StoreError::Conflict` if the (trip, seat) index is violated.
    async fn insert(&mut self, reservation: &NewReservation) -> StoreResult<Reservation>;

    /// Fails with `StoreError::Conflict` if the (trip, seat) index is violated.
    async fn update(
        &mut self,
        id: ReservationId,
        changes: &ReservationChanges,
    ) -> StoreResult<Reservation>;

    async fn delete(&mut self, id: ReservationId) -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
