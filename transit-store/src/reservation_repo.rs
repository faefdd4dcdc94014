use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use transit_core::models::{NewReservation, Reservation, ReservationChanges, Trip};
use transit_core::{LedgerTx, ReservationLedger, StoreResult};
use transit_shared::{Masked, ReservationId, SeatId, TripId};

use crate::error::{map_db_error, map_delete_error};
use crate::trip_repo::{TripRow, TRIP_COLUMNS};

const RESERVATION_COLUMNS: &str = "id, trip_id, seat_id, passenger_name, phone, boarding_point, notes, \
     paid, amount, created_by, created_at, updated_at";

pub struct PgReservationLedger {
    pool: PgPool,
}

impl PgReservationLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    trip_id: i64,
    seat_id: Option<i32>,
    passenger_name: String,
    phone: Option<String>,
    boarding_point: Option<String>,
    notes: Option<String>,
    paid: bool,
    amount: i64,
    created_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Reservation {
            id: ReservationId(row.id),
            trip_id: TripId(row.trip_id),
            seat_id: row.seat_id,
            passenger_name: row.passenger_name,
            phone: row.phone.map(Masked),
            boarding_point: row.boarding_point,
            notes: row.notes,
            paid: row.paid,
            amount: row.amount,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ReservationLedger for PgReservationLedger {
    async fn get(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        let sql = format!("SELECT {} FROM reservations WHERE id = $1", RESERVATION_COLUMNS);
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_by_trip(&self, trip_id: TripId) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE trip_id = $1 ORDER BY id",
            RESERVATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(trip_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_trip(&mut self, trip_id: TripId) -> StoreResult<Option<Trip>> {
        // FOR SHARE blocks a concurrent bus-type rebinding (FOR UPDATE) but
        // not other bookings on the same trip.
        let sql = format!("SELECT {} FROM trips WHERE id = $1 FOR SHARE", TRIP_COLUMNS);
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(trip_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn get_for_update(&mut self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        let sql = format!("SELECT {} FROM reservations WHERE id = $1 FOR UPDATE", RESERVATION_COLUMNS);
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn find_by_trip_and_seat(&mut self, trip_id: TripId, seat_id: SeatId) -> StoreResult<Option<Reservation>> {
        let sql = format!(
            "SELECT {} FROM reservations WHERE trip_id = $1 AND seat_id = $2",
            RESERVATION_COLUMNS
        );
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(trip_id.get())
            .bind(seat_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn insert(&mut self, r: &NewReservation) -> StoreResult<Reservation> {
        let sql = format!(
            r#"
            INSERT INTO reservations (trip_id, seat_id, passenger_name, phone, boarding_point,
                                      notes, paid, amount, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        let row = sqlx::query_as::<_, ReservationRow>(&sql)
            .bind(r.trip_id.get())
            .bind(r.seat_id)
            .bind(&r.passenger_name)
            .bind(r.phone.as_ref().map(|p| p.expose().clone()))
            .bind(&r.boarding_point)
            .bind(&r.notes)
            .bind(r.paid)
            .bind(r.amount)
            .bind(r.created_by)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn update(&mut self, id: ReservationId, changes: &ReservationChanges) -> StoreResult<Reservation> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE reservations SET updated_at = now()");
        if let Some(seat_id) = changes.seat_id {
            qb.push(", seat_id = ").push_bind(seat_id);
        }
        if let Some(name) = &changes.passenger_name {
            qb.push(", passenger_name = ").push_bind(name.clone());
        }
        if let Some(phone) = &changes.phone {
            qb.push(", phone = ").push_bind(phone.as_ref().map(|p| p.expose().clone()));
        }
        if let Some(boarding_point) = &changes.boarding_point {
            qb.push(", boarding_point = ").push_bind(boarding_point.clone());
        }
        if let Some(notes) = &changes.notes {
            qb.push(", notes = ").push_bind(notes.clone());
        }
        if let Some(paid) = changes.paid {
            qb.push(", paid = ").push_bind(paid);
        }
        if let Some(amount) = changes.amount {
            qb.push(", amount = ").push_bind(amount);
        }
        qb.push(" WHERE id = ").push_bind(id.get());
        qb.push(" RETURNING ").push(RESERVATION_COLUMNS);

        let row = qb
            .build_query_as::<ReservationRow>()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn delete(&mut self, id: ReservationId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(map_delete_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_db_error)
    }
}
