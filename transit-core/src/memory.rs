//! In-process storage backend used by tests and local runs without Postgres.
//!
//! Every transaction holds the whole-store lock until it commits or drops, so
//! transactions are fully serialized. Do not call non-transactional store
//! methods from a task that holds an open transaction on the same store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use transit_shared::{BusTypeId, ReservationId, SeatId, TripId};

use crate::models::{
    BusType, BusTypeSummary, NewReservation, NewTrip, Reservation, ReservationChanges, Seat, Trip, TripDetail,
    TripFilter, TripPatch,
};
use crate::repository::{
    LedgerTx, ReservationLedger, SeatTemplateRepository, StoreError, StoreResult, TemplateTx, TripRepository,
    TripTx,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    bus_types: BTreeMap<BusTypeId, BusType>,
    seats: BTreeMap<SeatId, Seat>,
    trips: BTreeMap<TripId, Trip>,
    reservations: BTreeMap<ReservationId, Reservation>,
    last_bus_type_id: BusTypeId,
    last_seat_id: SeatId,
    last_trip_id: i64,
    last_reservation_id: i64,
}

impl MemoryState {
    fn trip_detail(&self, trip: &Trip) -> TripDetail {
        TripDetail {
            trip: trip.clone(),
            bus_type_name: self
                .bus_types
                .get(&trip.bus_type_id)
                .map(|bt| bt.name.clone())
                .unwrap_or_default(),
            reservation_count: self.reservation_count(trip.id),
        }
    }

    fn reservation_count(&self, trip_id: TripId) -> i64 {
        self.reservations.values().filter(|r| r.trip_id == trip_id).count() as i64
    }

    fn holder_of(&self, trip_id: TripId, seat_id: SeatId) -> Option<&Reservation> {
        self.reservations
            .values()
            .find(|r| r.trip_id == trip_id && r.seat_id == Some(seat_id))
    }

    fn check_seat_free(&self, trip_id: TripId, seat_id: SeatId, except: Option<ReservationId>) -> StoreResult<()> {
        match self.holder_of(trip_id, seat_id) {
            Some(r) if Some(r.id) != except => Err(StoreError::Conflict(format!(
                "uq_reservations_trip_seat: trip {} seat {}",
                trip_id, seat_id
            ))),
            _ => Ok(()),
        }
    }

    fn insert_reservation(&mut self, new: &NewReservation) -> StoreResult<Reservation> {
        if !self.trips.contains_key(&new.trip_id) {
            return Err(StoreError::MissingReference(format!("trip {}", new.trip_id)));
        }
        if let Some(seat_id) = new.seat_id {
            if !self.seats.contains_key(&seat_id) {
                return Err(StoreError::MissingReference(format!("seat {}", seat_id)));
            }
            self.check_seat_free(new.trip_id, seat_id, None)?;
        }

        self.last_reservation_id += 1;
        let now = Utc::now();
        let reservation = Reservation {
            id: ReservationId(self.last_reservation_id),
            trip_id: new.trip_id,
            seat_id: new.seat_id,
            passenger_name: new.passenger_name.clone(),
            phone: new.phone.clone(),
            boarding_point: new.boarding_point.clone(),
            notes: new.notes.clone(),
            paid: new.paid,
            amount: new.amount,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        self.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    fn update_reservation(&mut self, id: ReservationId, changes: &ReservationChanges) -> StoreResult<Reservation> {
        let trip_id = match self.reservations.get(&id) {
            Some(r) => r.trip_id,
            None => return Err(StoreError::Backend(format!("reservation {} vanished", id))),
        };
        if let Some(seat_id) = changes.seat_id {
            if !self.seats.contains_key(&seat_id) {
                return Err(StoreError::MissingReference(format!("seat {}", seat_id)));
            }
            self.check_seat_free(trip_id, seat_id, Some(id))?;
        }

        let r = self
            .reservations
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("reservation {} vanished", id)))?;
        changes.apply_to(r);
        r.updated_at = Utc::now();
        Ok(r.clone())
    }
}

/// Storage backend that keeps everything in memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn transaction(&self) -> MemoryTx {
        let guard = self.state.clone().lock_owned().await;
        let work = (*guard).clone();
        MemoryTx { guard, work }
    }
}

/// Working copy of the state; written back on commit.
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

impl MemoryTx {
    fn finish(self: Box<Self>) {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
    }
}

#[async_trait]
impl SeatTemplateRepository for MemoryStore {
    async fn create_bus_type(&self, name: &str, seat_count: i32) -> StoreResult<BusType> {
        let mut state = self.state.lock().await;
        state.last_bus_type_id += 1;
        let bus_type = BusType {
            id: state.last_bus_type_id,
            name: name.to_string(),
            seat_count,
            created_at: Utc::now(),
        };
        state.bus_types.insert(bus_type.id, bus_type.clone());
        Ok(bus_type)
    }

    async fn get_bus_type(&self, id: BusTypeId) -> StoreResult<Option<BusType>> {
        Ok(self.state.lock().await.bus_types.get(&id).cloned())
    }

    async fn list_bus_types(&self) -> StoreResult<Vec<BusTypeSummary>> {
        let state = self.state.lock().await;
        Ok(state
            .bus_types
            .values()
            .map(|bt| BusTypeSummary {
                id: bt.id,
                name: bt.name.clone(),
                seat_count_declared: bt.seat_count,
                seat_count_actual: state.seats.values().filter(|s| s.bus_type_id == bt.id).count() as i64,
            })
            .collect())
    }

    async fn list_seats(&self, bus_type_id: BusTypeId) -> StoreResult<Vec<Seat>> {
        let state = self.state.lock().await;
        let mut seats: Vec<Seat> = state
            .seats
            .values()
            .filter(|s| s.bus_type_id == bus_type_id)
            .copied()
            .collect();
        seats.sort_by_key(|s| (s.row, s.col));
        Ok(seats)
    }

    async fn get_seat(&self, seat_id: SeatId) -> StoreResult<Option<Seat>> {
        Ok(self.state.lock().await.seats.get(&seat_id).copied())
    }

    async fn begin(&self) -> StoreResult<Box<dyn TemplateTx>> {
        Ok(Box::new(self.transaction().await))
    }
}

#[async_trait]
impl TemplateTx for MemoryTx {
    async fn lock_bus_type(&mut self, id: BusTypeId) -> StoreResult<Option<BusType>> {
        Ok(self.work.bus_types.get(&id).cloned())
    }

    async fn linked_reservation_count(&mut self, id: BusTypeId) -> StoreResult<i64> {
        let seats = &self.work.seats;
        Ok(self
            .work
            .reservations
            .values()
            .filter_map(|r| r.seat_id)
            .filter(|seat_id| seats.get(seat_id).is_some_and(|s| s.bus_type_id == id))
            .count() as i64)
    }

    async fn replace_seats(&mut self, id: BusTypeId, cells: &[(i32, i32)]) -> StoreResult<u64> {
        let state = &mut self.work;
        let referenced = state.reservations.values().filter_map(|r| r.seat_id).any(|seat_id| {
            state.seats.get(&seat_id).is_some_and(|s| s.bus_type_id == id)
        });
        if referenced {
            return Err(StoreError::Conflict(format!("seats of bus type {} are referenced", id)));
        }

        state.seats.retain(|_, s| s.bus_type_id != id);
        for &(row, col) in cells {
            state.last_seat_id += 1;
            let seat = Seat { id: state.last_seat_id, bus_type_id: id, row, col };
            state.seats.insert(seat.id, seat);
        }
        Ok(cells.len() as u64)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.finish();
        Ok(())
    }
}

#[async_trait]
impl TripRepository for MemoryStore {
    async fn insert(&self, trip: &NewTrip) -> StoreResult<Trip> {
        let mut state = self.state.lock().await;
        if !state.bus_types.contains_key(&trip.bus_type_id) {
            return Err(StoreError::MissingReference(format!("bus type {}", trip.bus_type_id)));
        }
        state.last_trip_id += 1;
        let trip = Trip {
            id: TripId(state.last_trip_id),
            bus_type_id: trip.bus_type_id,
            origin_label: trip.origin_label.clone(),
            destination_label: trip.destination_label.clone(),
            departure_dt: trip.departure_dt,
            duration_minutes: trip.duration_minutes,
            driver_name: trip.driver_name.clone(),
            status: trip.status.clone(),
            created_by: trip.created_by,
            created_at: Utc::now(),
        };
        state.trips.insert(trip.id, trip.clone());
        Ok(trip)
    }

    async fn get(&self, id: TripId) -> StoreResult<Option<Trip>> {
        Ok(self.state.lock().await.trips.get(&id).cloned())
    }

    async fn get_detail(&self, id: TripId) -> StoreResult<Option<TripDetail>> {
        let state = self.state.lock().await;
        Ok(state.trips.get(&id).map(|t| state.trip_detail(t)))
    }

    async fn list(&self, filter: &TripFilter) -> StoreResult<Vec<TripDetail>> {
        let state = self.state.lock().await;
        let mut trips: Vec<&Trip> = state.trips.values().filter(|t| filter.matches(t)).collect();
        trips.sort_by_key(|t| (t.departure_dt, t.id));
        Ok(trips.into_iter().map(|t| state.trip_detail(t)).collect())
    }

    async fn begin(&self) -> StoreResult<Box<dyn TripTx>> {
        Ok(Box::new(self.transaction().await))
    }
}

#[async_trait]
impl TripTx for MemoryTx {
    async fn lock(&mut self, id: TripId) -> StoreResult<Option<Trip>> {
        Ok(self.work.trips.get(&id).cloned())
    }

    async fn reservation_count(&mut self, id: TripId) -> StoreResult<i64> {
        Ok(self.work.reservation_count(id))
    }

    async fn apply(&mut self, id: TripId, patch: &TripPatch) -> StoreResult<Trip> {
        if let Some(bus_type_id) = patch.bus_type_id {
            if !self.work.bus_types.contains_key(&bus_type_id) {
                return Err(StoreError::MissingReference(format!("bus type {}", bus_type_id)));
            }
        }
        let trip = self
            .work
            .trips
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("trip {} vanished", id)))?;

        if let Some(dt) = patch.departure_dt {
            trip.departure_dt = dt;
        }
        if let Some(origin) = &patch.origin_label {
            trip.origin_label = origin.clone();
        }
        if let Some(destination) = &patch.destination_label {
            trip.destination_label = destination.clone();
        }
        if let Some(duration) = patch.duration_minutes {
            trip.duration_minutes = duration;
        }
        if let Some(driver) = &patch.driver_name {
            trip.driver_name = driver.clone();
        }
        if let Some(status) = &patch.status {
            trip.status = status.clone();
        }
        if let Some(bus_type_id) = patch.bus_type_id {
            trip.bus_type_id = bus_type_id;
        }
        Ok(trip.clone())
    }

    async fn delete(&mut self, id: TripId) -> StoreResult<bool> {
        if self.work.reservation_count(id) > 0 {
            return Err(StoreError::Conflict(format!("trip {} is referenced by reservations", id)));
        }
        Ok(self.work.trips.remove(&id).is_some())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.finish();
        Ok(())
    }
}

#[async_trait]
impl ReservationLedger for MemoryStore {
    async fn get(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn list_by_trip(&self, trip_id: TripId) -> StoreResult<Vec<Reservation>> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .values()
            .filter(|r| r.trip_id == trip_id)
            .cloned()
            .collect())
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        Ok(Box::new(self.transaction().await))
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_trip(&mut self, trip_id: TripId) -> StoreResult<Option<Trip>> {
        Ok(self.work.trips.get(&trip_id).cloned())
    }

    async fn get_for_update(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        Ok(self.work.reservations.get(&id).cloned())
    }

    async fn find_by_trip_and_seat(&mut self, trip_id: TripId, seat_id: SeatId) -> StoreResult<Option<Reservation>> {
        Ok(self.work.holder_of(trip_id, seat_id).cloned())
    }

    async fn insert(&mut self, reservation: &NewReservation) -> StoreResult<Reservation> {
        self.work.insert_reservation(reservation)
    }

    async fn update(&mut self, id: ReservationId, changes: &ReservationChanges) -> StoreResult<Reservation> {
        self.work.update_reservation(id, changes)
    }

    async fn delete(&mut self, id: ReservationId) -> StoreResult<bool> {
        Ok(self.work.reservations.remove(&id).is_some())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.finish();
        Ok(())
    }
}
