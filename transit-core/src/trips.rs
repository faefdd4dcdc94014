use std::sync::Arc;

use tracing::{info, warn};
use transit_shared::{TripId, UserId};

use crate::models::{CreateTrip, NewTrip, Trip, TripDetail, TripFilter, TripPatch, DEFAULT_TRIP_STATUS};
use crate::repository::{SeatTemplateRepository, TripRepository};
use crate::{optional_text, required_text, CoreError, CoreResult};

/// Owns scheduled trips and their bus-type binding.
#[derive(Clone)]
pub struct TripRegistry {
    trips: Arc<dyn TripRepository>,
    templates: Arc<dyn SeatTemplateRepository>,
}

impl TripRegistry {
    pub fn new(trips: Arc<dyn TripRepository>, templates: Arc<dyn SeatTemplateRepository>) -> Self {
        Self { trips, templates }
    }

    pub async fn create(&self, req: CreateTrip, creator: UserId) -> CoreResult<Trip> {
        let missing = || CoreError::invalid("busTypeId, departureDt, originLabel, destinationLabel are required");

        let bus_type_id = req.bus_type_id.ok_or_else(missing)?;
        let departure_dt = req.departure_dt.ok_or_else(missing)?;
        let origin_label = required_text(req.origin_label.as_deref()).ok_or_else(missing)?;
        let destination_label = required_text(req.destination_label.as_deref()).ok_or_else(missing)?;
        if matches!(req.duration_minutes, Some(d) if d < 0) {
            return Err(CoreError::invalid("durationMinutes must be >= 0"));
        }

        if self.templates.get_bus_type(bus_type_id).await?.is_none() {
            return Err(CoreError::not_found("bus type", bus_type_id));
        }

        let new_trip = NewTrip {
            bus_type_id,
            departure_dt,
            origin_label,
            destination_label,
            duration_minutes: req.duration_minutes,
            driver_name: optional_text(req.driver_name),
            status: required_text(req.status.as_deref()).unwrap_or_else(|| DEFAULT_TRIP_STATUS.to_string()),
            created_by: creator,
        };

        let trip = self.trips.insert(&new_trip).await?;
        info!(trip_id = %trip.id, bus_type_id, created_by = creator, "Trip scheduled");
        Ok(trip)
    }

    pub async fn get(&self, id: TripId) -> CoreResult<TripDetail> {
        self.trips
            .get_detail(id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", id))
    }

    pub async fn list(&self, filter: &TripFilter) -> CoreResult<Vec<TripDetail>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(CoreError::invalid("from must not be after to"));
            }
        }
        Ok(self.trips.list(filter).await?)
    }

    /// Applies a partial update. Rebinding the bus type is only possible while
    /// the trip has no reservations; otherwise existing seat assignments would
    /// point at another layout.
    pub async fn patch(&self, id: TripId, mut patch: TripPatch) -> CoreResult<Trip> {
        if patch.is_empty() {
            return Err(CoreError::invalid("No fields to update"));
        }
        if let Some(label) = patch.origin_label.take() {
            patch.origin_label =
                Some(required_text(Some(&label)).ok_or_else(|| CoreError::invalid("originLabel must not be blank"))?);
        }
        if let Some(label) = patch.destination_label.take() {
            patch.destination_label = Some(
                required_text(Some(&label)).ok_or_else(|| CoreError::invalid("destinationLabel must not be blank"))?,
            );
        }
        if let Some(status) = patch.status.take() {
            patch.status =
                Some(required_text(Some(&status)).ok_or_else(|| CoreError::invalid("status must not be blank"))?);
        }
        if matches!(patch.duration_minutes, Some(Some(d)) if d < 0) {
            return Err(CoreError::invalid("durationMinutes must be >= 0"));
        }
        if let Some(driver) = patch.driver_name.take() {
            patch.driver_name = Some(optional_text(driver));
        }

        if let Some(bus_type_id) = patch.bus_type_id {
            if self.templates.get_bus_type(bus_type_id).await?.is_none() {
                return Err(CoreError::not_found("bus type", bus_type_id));
            }
        }

        let mut tx = self.trips.begin().await?;
        let current = tx.lock(id).await?.ok_or_else(|| CoreError::not_found("trip", id))?;

        if let Some(bus_type_id) = patch.bus_type_id {
            if bus_type_id == current.bus_type_id {
                patch.bus_type_id = None;
            } else {
                let reservations = tx.reservation_count(id).await?;
                if reservations > 0 {
                    warn!(trip_id = %id, reservations, "Bus type rebinding refused");
                    return Err(CoreError::Conflict(
                        "cannot change bus type of a trip that has reservations".to_string(),
                    ));
                }
            }
        }

        let updated = tx.apply(id, &patch).await?;
        tx.commit().await?;

        info!(trip_id = %id, status = %updated.status, "Trip updated");
        Ok(updated)
    }

    /// Removes a trip. Trips with reservations are kept to preserve history.
    pub async fn delete(&self, id: TripId) -> CoreResult<()> {
        let mut tx = self.trips.begin().await?;
        if tx.lock(id).await?.is_none() {
            return Err(CoreError::not_found("trip", id));
        }

        let reservations = tx.reservation_count(id).await?;
        if reservations > 0 {
            warn!(trip_id = %id, reservations, "Trip deletion refused");
            return Err(CoreError::Conflict(format!(
                "trip {} has {} reservation(s); cancel them first",
                id, reservations
            )));
        }

        tx.delete(id).await?;
        tx.commit().await?;
        info!(trip_id = %id, "Trip deleted");
        Ok(())
    }
}
