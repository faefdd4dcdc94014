use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use transit_shared::{Masked, ReservationId, SeatId, TripId, UserId};

use crate::models::{
    AddPassenger, CreateReservation, NewReservation, PaymentsSummary, Reservation, ReservationChanges,
    ReservationView, Seat, Trip, UpdateReservation,
};
use crate::repository::{ReservationLedger, SeatTemplateRepository, StoreError, TripRepository};
use crate::{optional_text, required_text, CoreError, CoreResult};

/// Entry point for every reservation mutation. Enforces the occupancy and
/// compatibility invariants; each check-then-write runs inside one ledger
/// transaction and the storage unique index on (trip, seat) is the final guard.
#[derive(Clone)]
pub struct ReservationController {
    trips: Arc<dyn TripRepository>,
    templates: Arc<dyn SeatTemplateRepository>,
    ledger: Arc<dyn ReservationLedger>,
}

impl ReservationController {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        templates: Arc<dyn SeatTemplateRepository>,
        ledger: Arc<dyn ReservationLedger>,
    ) -> Self {
        Self { trips, templates, ledger }
    }

    /// Full booking flow: seat and boarding point are mandatory.
    pub async fn create(&self, req: CreateReservation, creator: UserId) -> CoreResult<Reservation> {
        let missing = || CoreError::invalid("tripId, seatId, passengerName, boardingPoint are required");

        let trip_id = req.trip_id.ok_or_else(missing)?;
        let seat_id = req.seat_id.ok_or_else(missing)?;
        let passenger_name = required_text(req.passenger_name.as_deref()).ok_or_else(missing)?;
        let boarding_point = required_text(req.boarding_point.as_deref()).ok_or_else(missing)?;
        let paid = req.paid.unwrap_or(false);
        let amount = booking_amount(paid, req.amount)?;

        let seat = self.templates.get_seat(seat_id).await?;

        let mut tx = self.ledger.begin().await?;
        let trip = tx
            .lock_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
        ensure_compatible(seat.as_ref(), &trip)?;

        if let Some(existing) = tx.find_by_trip_and_seat(trip_id, seat_id).await? {
            warn!(trip_id = %trip_id, seat_id, held_by = %existing.id, "Seat already reserved");
            return Err(seat_taken());
        }

        let reservation = tx
            .insert(&NewReservation {
                trip_id,
                seat_id: Some(seat_id),
                passenger_name,
                phone: optional_text(req.phone).map(Masked),
                boarding_point: Some(boarding_point),
                notes: optional_text(req.notes),
                paid,
                amount,
                created_by: creator,
            })
            .await
            .map_err(on_seat_index)?;
        tx.commit().await?;

        info!(
            reservation_id = %reservation.id,
            trip_id = %trip_id,
            seat_id,
            paid,
            created_by = creator,
            "Reservation created"
        );
        Ok(reservation)
    }

    /// Partial update. A seat change is re-validated against the trip's bus
    /// type and against occupancy of the new seat, ignoring this reservation.
    pub async fn update(&self, id: ReservationId, req: UpdateReservation) -> CoreResult<Reservation> {
        if matches!(req.amount, Some(a) if a < 0) {
            return Err(CoreError::invalid("amount must be >= 0"));
        }
        let passenger_name = match req.passenger_name.as_deref() {
            Some(name) => Some(required_text(Some(name)).ok_or_else(|| CoreError::invalid("passengerName must not be blank"))?),
            None => None,
        };

        let target_seat = match req.seat_id {
            Some(seat_id) => Some((seat_id, self.templates.get_seat(seat_id).await?)),
            None => None,
        };

        let mut tx = self.ledger.begin().await?;
        let current = tx
            .get_for_update(id)
            .await?
            .ok_or_else(|| CoreError::not_found("reservation", id))?;

        let mut changes = ReservationChanges {
            seat_id: None,
            passenger_name,
            phone: req.phone.map(|p| optional_text(p).map(Masked)),
            boarding_point: req.boarding_point.map(optional_text),
            notes: req.notes.map(optional_text),
            paid: req.paid,
            amount: req.amount,
        };

        if let Some((seat_id, seat)) = target_seat {
            if current.seat_id != Some(seat_id) {
                let trip = tx
                    .lock_trip(current.trip_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("trip", current.trip_id))?;
                ensure_compatible(seat.as_ref(), &trip)?;

                if let Some(other) = tx.find_by_trip_and_seat(current.trip_id, seat_id).await? {
                    if other.id != id {
                        warn!(reservation_id = %id, seat_id, held_by = %other.id, "Target seat already reserved");
                        return Err(CoreError::Conflict("Target seat already reserved".to_string()));
                    }
                }
                changes.seat_id = Some(seat_id);
            }
        }

        if changes.is_empty() {
            return Ok(current);
        }

        let updated = tx.update(id, &changes).await.map_err(on_seat_index)?;
        tx.commit().await?;

        info!(
            reservation_id = %id,
            seat_changed = changes.seat_id.is_some(),
            "Reservation updated"
        );
        Ok(updated)
    }

    /// Hard delete. The seat frees up implicitly since occupancy is derived.
    pub async fn cancel(&self, id: ReservationId) -> CoreResult<()> {
        let mut tx = self.ledger.begin().await?;
        if !tx.delete(id).await? {
            return Err(CoreError::not_found("reservation", id));
        }
        tx.commit().await?;
        info!(reservation_id = %id, "Reservation canceled");
        Ok(())
    }

    /// Operator flow: only the passenger name is required; the entry is
    /// unpaid and may carry no seat at all.
    pub async fn add_passenger(&self, trip_id: TripId, req: AddPassenger, creator: UserId) -> CoreResult<Reservation> {
        let passenger_name = required_text(req.passenger_name.as_deref())
            .ok_or_else(|| CoreError::invalid("passengerName is required"))?;

        let seat = match req.seat_id {
            Some(seat_id) => Some((seat_id, self.templates.get_seat(seat_id).await?)),
            None => None,
        };

        let mut tx = self.ledger.begin().await?;
        let trip = tx
            .lock_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", trip_id))?;

        if let Some((seat_id, seat)) = &seat {
            ensure_compatible(seat.as_ref(), &trip)?;
            if tx.find_by_trip_and_seat(trip_id, *seat_id).await?.is_some() {
                warn!(trip_id = %trip_id, seat_id, "Seat already reserved");
                return Err(seat_taken());
            }
        }

        let reservation = tx
            .insert(&NewReservation {
                trip_id,
                seat_id: seat.map(|(id, _)| id),
                passenger_name,
                phone: None,
                boarding_point: None,
                notes: None,
                paid: false,
                amount: 0,
                created_by: creator,
            })
            .await
            .map_err(on_seat_index)?;
        tx.commit().await?;

        info!(reservation_id = %reservation.id, trip_id = %trip_id, seat_id = ?reservation.seat_id, "Passenger added");
        Ok(reservation)
    }

    pub async fn get(&self, id: ReservationId) -> CoreResult<ReservationView> {
        let reservation = self
            .ledger
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("reservation", id))?;
        let seat = match reservation.seat_id {
            Some(seat_id) => self.templates.get_seat(seat_id).await?,
            None => None,
        };
        Ok(ReservationView::new(reservation, seat.as_ref()))
    }

    /// Reservations of a trip ordered by id. An unknown trip has none.
    pub async fn list_by_trip(&self, trip_id: TripId) -> CoreResult<Vec<ReservationView>> {
        let reservations = self.ledger.list_by_trip(trip_id).await?;
        if reservations.is_empty() {
            return Ok(Vec::new());
        }
        let trip = match self.trips.get(trip_id).await? {
            Some(trip) => trip,
            None => return Ok(Vec::new()),
        };
        self.with_seats(&trip, reservations).await
    }

    /// Operator passenger list; unlike `list_by_trip` the trip must exist.
    pub async fn passenger_manifest(&self, trip_id: TripId) -> CoreResult<Vec<ReservationView>> {
        let trip = self.require_trip(trip_id).await?;
        let reservations = self.ledger.list_by_trip(trip_id).await?;
        self.with_seats(&trip, reservations).await
    }

    pub async fn payments_summary(&self, trip_id: TripId) -> CoreResult<PaymentsSummary> {
        self.require_trip(trip_id).await?;
        let reservations = self.ledger.list_by_trip(trip_id).await?;

        let mut summary = PaymentsSummary { trip_id, total_paid: 0, paid_count: 0, unpaid_count: 0 };
        for r in &reservations {
            if r.paid {
                summary.paid_count += 1;
                summary.total_paid = summary.total_paid.checked_add(r.amount).ok_or_else(|| {
                    CoreError::Internal(format!("paid total overflows for trip {}", trip_id))
                })?;
            } else {
                summary.unpaid_count += 1;
            }
        }
        Ok(summary)
    }

    async fn require_trip(&self, trip_id: TripId) -> CoreResult<Trip> {
        self.trips
            .get(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", trip_id))
    }

    async fn with_seats(&self, trip: &Trip, reservations: Vec<Reservation>) -> CoreResult<Vec<ReservationView>> {
        let seats: HashMap<SeatId, Seat> = self
            .templates
            .list_seats(trip.bus_type_id)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        Ok(reservations
            .into_iter()
            .map(|r| {
                let seat = r.seat_id.and_then(|id| seats.get(&id));
                ReservationView::new(r, seat)
            })
            .collect())
    }
}

/// Amount stored for a new booking: required and non-negative when paid,
/// zero otherwise.
fn booking_amount(paid: bool, amount: Option<i64>) -> CoreResult<i64> {
    match (paid, amount) {
        (true, Some(a)) if a >= 0 => Ok(a),
        (true, _) => Err(CoreError::invalid("amount must be >= 0 when paid=true")),
        (false, Some(a)) if a < 0 => Err(CoreError::invalid("amount must be >= 0")),
        (false, _) => Ok(0),
    }
}

fn ensure_compatible(seat: Option<&Seat>, trip: &Trip) -> CoreResult<()> {
    match seat {
        Some(seat) if seat.bus_type_id == trip.bus_type_id => Ok(()),
        _ => Err(CoreError::invalid("Seat does not belong to trip's bus type")),
    }
}

fn seat_taken() -> CoreError {
    CoreError::Conflict("Seat already reserved for this trip".to_string())
}

/// The unique index caught a write the in-transaction check did not see.
fn on_seat_index(err: StoreError) -> CoreError {
    match err {
        StoreError::Conflict(detail) => {
            warn!(%detail, "Seat uniqueness enforced by storage");
            seat_taken()
        }
        other => other.into(),
    }
}
