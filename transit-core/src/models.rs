use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use transit_shared::{double_option, BusTypeId, Masked, ReservationId, SeatId, TripId, UserId};

pub const DEFAULT_TRIP_STATUS: &str = "scheduled";

// ============================================================================
// Seat templates
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusType {
    pub id: BusTypeId,
    pub name: String,
    /// Informational only; the generated grid decides the real seat count.
    pub seat_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusTypeSummary {
    pub id: BusTypeId,
    pub name: String,
    pub seat_count_declared: i32,
    pub seat_count_actual: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: SeatId,
    pub bus_type_id: BusTypeId,
    pub row: i32,
    pub col: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GridSummary {
    pub bus_type_id: BusTypeId,
    pub rows: u32,
    pub cols: u32,
    pub created: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusType {
    pub name: Option<String>,
    pub seat_count: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateGrid {
    pub rows: Option<u32>,
    pub cols: Option<u32>,
}

// ============================================================================
// Trips
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: TripId,
    pub bus_type_id: BusTypeId,
    pub origin_label: String,
    pub destination_label: String,
    pub departure_dt: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub driver_name: Option<String>,
    pub status: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TripDetail {
    #[serde(flatten)]
    pub trip: Trip,
    pub bus_type_name: String,
    pub reservation_count: i64,
}

/// Trip creation request. `departureTime` is accepted as an alias because the
/// operator console sends it under that name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTrip {
    pub bus_type_id: Option<BusTypeId>,
    #[serde(alias = "departureTime")]
    pub departure_dt: Option<DateTime<Utc>>,
    pub origin_label: Option<String>,
    pub destination_label: Option<String>,
    pub duration_minutes: Option<i32>,
    pub driver_name: Option<String>,
    pub status: Option<String>,
}

/// Validated insert record for the trip table.
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub bus_type_id: BusTypeId,
    pub departure_dt: DateTime<Utc>,
    pub origin_label: String,
    pub destination_label: String,
    pub duration_minutes: Option<i32>,
    pub driver_name: Option<String>,
    pub status: String,
    pub created_by: UserId,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPatch {
    #[serde(alias = "departureTime")]
    pub departure_dt: Option<DateTime<Utc>>,
    pub origin_label: Option<String>,
    pub destination_label: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub duration_minutes: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub driver_name: Option<Option<String>>,
    pub status: Option<String>,
    pub bus_type_id: Option<BusTypeId>,
}

/// Query filters for listing trips; bounds on departure are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub bus_type_id: Option<BusTypeId>,
}

impl TripFilter {
    pub fn matches(&self, trip: &Trip) -> bool {
        self.from.map_or(true, |from| trip.departure_dt >= from)
            && self.to.map_or(true, |to| trip.departure_dt <= to)
            && self.status.as_deref().map_or(true, |s| trip.status == s)
            && self.bus_type_id.map_or(true, |id| trip.bus_type_id == id)
    }
}

impl TripPatch {
    pub fn is_empty(&self) -> bool {
        self.departure_dt.is_none()
            && self.origin_label.is_none()
            && self.destination_label.is_none()
            && self.duration_minutes.is_none()
            && self.driver_name.is_none()
            && self.status.is_none()
            && self.bus_type_id.is_none()
    }
}

// ============================================================================
// Reservations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub trip_id: TripId,
    pub seat_id: Option<SeatId>,
    pub passenger_name: String,
    pub phone: Option<Masked<String>>,
    pub boarding_point: Option<String>,
    pub notes: Option<String>,
    pub paid: bool,
    /// Minor currency units.
    pub amount: i64,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert record for the ledger. Built by the lifecycle controller after all
/// validation has passed.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub trip_id: TripId,
    pub seat_id: Option<SeatId>,
    pub passenger_name: String,
    pub phone: Option<Masked<String>>,
    pub boarding_point: Option<String>,
    pub notes: Option<String>,
    pub paid: bool,
    pub amount: i64,
    pub created_by: UserId,
}

/// Column-level changes applied by `LedgerTx::update`. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct ReservationChanges {
    pub seat_id: Option<SeatId>,
    pub passenger_name: Option<String>,
    pub phone: Option<Option<Masked<String>>>,
    pub boarding_point: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub paid: Option<bool>,
    pub amount: Option<i64>,
}

impl ReservationChanges {
    pub fn is_empty(&self) -> bool {
        self.seat_id.is_none()
            && self.passenger_name.is_none()
            && self.phone.is_none()
            && self.boarding_point.is_none()
            && self.notes.is_none()
            && self.paid.is_none()
            && self.amount.is_none()
    }

    /// Applies the changes to an in-memory copy.
    pub fn apply_to(&self, r: &mut Reservation) {
        if let Some(seat_id) = self.seat_id {
            r.seat_id = Some(seat_id);
        }
        if let Some(name) = &self.passenger_name {
            r.passenger_name = name.clone();
        }
        if let Some(phone) = &self.phone {
            r.phone = phone.clone();
        }
        if let Some(bp) = &self.boarding_point {
            r.boarding_point = bp.clone();
        }
        if let Some(notes) = &self.notes {
            r.notes = notes.clone();
        }
        if let Some(paid) = self.paid {
            r.paid = paid;
        }
        if let Some(amount) = self.amount {
            r.amount = amount;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservation {
    pub trip_id: Option<TripId>,
    pub seat_id: Option<SeatId>,
    pub passenger_name: Option<String>,
    pub boarding_point: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub paid: Option<bool>,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReservation {
    pub seat_id: Option<SeatId>,
    pub passenger_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub boarding_point: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    pub paid: Option<bool>,
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPassenger {
    pub passenger_name: Option<String>,
    pub seat_id: Option<SeatId>,
}

/// Reservation joined with its seat position, as returned by list and get.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub id: ReservationId,
    pub trip_id: TripId,
    pub seat_id: Option<SeatId>,
    pub row: Option<i32>,
    pub col: Option<i32>,
    pub passenger_name: String,
    pub phone: Option<Masked<String>>,
    pub boarding_point: Option<String>,
    pub notes: Option<String>,
    pub paid: bool,
    pub amount: i64,
}

impl ReservationView {
    pub fn new(r: Reservation, seat: Option<&Seat>) -> Self {
        Self {
            id: r.id,
            trip_id: r.trip_id,
            seat_id: r.seat_id,
            row: seat.map(|s| s.row),
            col: seat.map(|s| s.col),
            passenger_name: r.passenger_name,
            phone: r.phone,
            boarding_point: r.boarding_point,
            notes: r.notes,
            paid: r.paid,
            amount: r.amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentsSummary {
    pub trip_id: TripId,
    pub total_paid: i64,
    pub paid_count: i64,
    pub unpaid_count: i64,
}

// ============================================================================
// Seat map
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatMapEntry {
    pub seat_id: SeatId,
    pub row: i32,
    pub col: i32,
    pub reserved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<ReservationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passenger_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatMap {
    pub trip_id: TripId,
    pub bus_type_id: BusTypeId,
    pub seats: Vec<SeatMapEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableSeats {
    pub trip_id: TripId,
    pub bus_type_id: BusTypeId,
    pub available_seat_ids: Vec<SeatId>,
}
