use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use transit_shared::{SeatId, TripId};

use crate::models::{AvailableSeats, Reservation, Seat, SeatMap, SeatMapEntry, Trip};
use crate::repository::{ReservationLedger, SeatTemplateRepository, TripRepository};
use crate::{CoreError, CoreResult};

/// Read-only view joining a trip's seat template with current occupancy.
/// Computed per call; nothing is cached.
#[derive(Clone)]
pub struct SeatMapProjector {
    trips: Arc<dyn TripRepository>,
    templates: Arc<dyn SeatTemplateRepository>,
    ledger: Arc<dyn ReservationLedger>,
}

impl SeatMapProjector {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        templates: Arc<dyn SeatTemplateRepository>,
        ledger: Arc<dyn ReservationLedger>,
    ) -> Self {
        Self { trips, templates, ledger }
    }

    pub async fn project(&self, trip_id: TripId) -> CoreResult<SeatMap> {
        let (trip, seats) = self.template_for(trip_id).await?;
        let reservations = self.ledger.list_by_trip(trip_id).await?;

        let by_seat: HashMap<SeatId, &Reservation> = reservations
            .iter()
            .filter_map(|r| r.seat_id.map(|seat_id| (seat_id, r)))
            .collect();

        let seats = seats
            .iter()
            .map(|seat| match by_seat.get(&seat.id) {
                Some(r) => SeatMapEntry {
                    seat_id: seat.id,
                    row: seat.row,
                    col: seat.col,
                    reserved: true,
                    reservation_id: Some(r.id),
                    passenger_name: Some(r.passenger_name.clone()),
                },
                None => SeatMapEntry {
                    seat_id: seat.id,
                    row: seat.row,
                    col: seat.col,
                    reserved: false,
                    reservation_id: None,
                    passenger_name: None,
                },
            })
            .collect();

        Ok(SeatMap { trip_id: trip.id, bus_type_id: trip.bus_type_id, seats })
    }

    /// Template seat ids minus occupied seat ids, in template order.
    pub async fn available_seat_ids(&self, trip_id: TripId) -> CoreResult<AvailableSeats> {
        let (trip, seats) = self.template_for(trip_id).await?;
        let occupied: HashSet<SeatId> = self
            .ledger
            .list_by_trip(trip_id)
            .await?
            .into_iter()
            .filter_map(|r| r.seat_id)
            .collect();

        let available_seat_ids = seats
            .iter()
            .map(|s| s.id)
            .filter(|id| !occupied.contains(id))
            .collect();

        Ok(AvailableSeats { trip_id: trip.id, bus_type_id: trip.bus_type_id, available_seat_ids })
    }

    async fn template_for(&self, trip_id: TripId) -> CoreResult<(Trip, Vec<Seat>)> {
        let trip = self
            .trips
            .get(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", trip_id))?;

        if self.templates.get_bus_type(trip.bus_type_id).await?.is_none() {
            return Err(CoreError::not_found("bus type", trip.bus_type_id));
        }

        let seats = self.templates.list_seats(trip.bus_type_id).await?;
        Ok((trip, seats))
    }
}
