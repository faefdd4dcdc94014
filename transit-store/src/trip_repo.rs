use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use transit_core::models::{NewTrip, Trip, TripDetail, TripFilter, TripPatch};
use transit_core::{StoreError, StoreResult, TripRepository, TripTx};
use transit_shared::TripId;

use crate::error::{map_db_error, map_delete_error};

pub(crate) const TRIP_COLUMNS: &str = "id, bus_type_id, origin_label, destination_label, departure_dt, \
     duration_minutes, driver_name, status, created_by, created_at";

const DETAIL_QUERY: &str = r#"
    SELECT t.id, t.bus_type_id, t.origin_label, t.destination_label, t.departure_dt,
           t.duration_minutes, t.driver_name, t.status, t.created_by, t.created_at,
           bt.name AS bus_type_name,
           (SELECT COUNT(*) FROM reservations r WHERE r.trip_id = t.id) AS reservation_count
    FROM trips t
    JOIN bus_types bt ON bt.id = t.bus_type_id
"#;

pub struct PgTripRepository {
    pool: PgPool,
}

impl PgTripRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TripRow {
    id: i64,
    bus_type_id: i32,
    origin_label: String,
    destination_label: String,
    departure_dt: DateTime<Utc>,
    duration_minutes: Option<i32>,
    driver_name: Option<String>,
    status: String,
    created_by: i64,
    created_at: DateTime<Utc>,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Trip {
            id: TripId(row.id),
            bus_type_id: row.bus_type_id,
            origin_label: row.origin_label,
            destination_label: row.destination_label,
            departure_dt: row.departure_dt,
            duration_minutes: row.duration_minutes,
            driver_name: row.driver_name,
            status: row.status,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TripDetailRow {
    #[sqlx(flatten)]
    trip: TripRow,
    bus_type_name: String,
    reservation_count: i64,
}

impl From<TripDetailRow> for TripDetail {
    fn from(row: TripDetailRow) -> Self {
        TripDetail {
            trip: row.trip.into(),
            bus_type_name: row.bus_type_name,
            reservation_count: row.reservation_count,
        }
    }
}

#[async_trait]
impl TripRepository for PgTripRepository {
    async fn insert(&self, trip: &NewTrip) -> StoreResult<Trip> {
        let sql = format!(
            r#"
            INSERT INTO trips (bus_type_id, origin_label, destination_label, departure_dt,
                               duration_minutes, driver_name, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            TRIP_COLUMNS
        );
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(trip.bus_type_id)
            .bind(&trip.origin_label)
            .bind(&trip.destination_label)
            .bind(trip.departure_dt)
            .bind(trip.duration_minutes)
            .bind(&trip.driver_name)
            .bind(&trip.status)
            .bind(trip.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn get(&self, id: TripId) -> StoreResult<Option<Trip>> {
        let sql = format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS);
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn get_detail(&self, id: TripId) -> StoreResult<Option<TripDetail>> {
        let sql = format!("{} WHERE t.id = $1", DETAIL_QUERY);
        let row = sqlx::query_as::<_, TripDetailRow>(&sql)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn list(&self, filter: &TripFilter) -> StoreResult<Vec<TripDetail>> {
        let mut qb = QueryBuilder::<Postgres>::new(DETAIL_QUERY);
        qb.push(" WHERE TRUE");
        if let Some(from) = filter.from {
            qb.push(" AND t.departure_dt >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND t.departure_dt <= ").push_bind(to);
        }
        if let Some(status) = &filter.status {
            qb.push(" AND t.status = ").push_bind(status.clone());
        }
        if let Some(bus_type_id) = filter.bus_type_id {
            qb.push(" AND t.bus_type_id = ").push_bind(bus_type_id);
        }
        qb.push(" ORDER BY t.departure_dt, t.id");

        let rows = qb
            .build_query_as::<TripDetailRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn begin(&self) -> StoreResult<Box<dyn TripTx>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgTripTx { tx }))
    }
}

pub struct PgTripTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TripTx for PgTripTx {
    async fn lock(&mut self, id: TripId) -> StoreResult<Option<Trip>> {
        let sql = format!("SELECT {} FROM trips WHERE id = $1 FOR UPDATE", TRIP_COLUMNS);
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn reservation_count(&mut self, id: TripId) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reservations WHERE trip_id = $1")
            .bind(id.get())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)
    }

    async fn apply(&mut self, id: TripId, patch: &TripPatch) -> StoreResult<Trip> {
        if patch.is_empty() {
            let current = self.lock(id).await?;
            return current.ok_or_else(|| StoreError::Backend(format!("trip {} vanished", id)));
        }

        let mut qb = QueryBuilder::<Postgres>::new("UPDATE trips SET ");
        let mut set = qb.separated(", ");
        if let Some(dt) = patch.departure_dt {
            set.push("departure_dt = ").push_bind_unseparated(dt);
        }
        if let Some(origin) = &patch.origin_label {
            set.push("origin_label = ").push_bind_unseparated(origin.clone());
        }
        if let Some(destination) = &patch.destination_label {
            set.push("destination_label = ").push_bind_unseparated(destination.clone());
        }
        if let Some(duration) = patch.duration_minutes {
            set.push("duration_minutes = ").push_bind_unseparated(duration);
        }
        if let Some(driver) = &patch.driver_name {
            set.push("driver_name = ").push_bind_unseparated(driver.clone());
        }
        if let Some(status) = &patch.status {
            set.push("status = ").push_bind_unseparated(status.clone());
        }
        if let Some(bus_type_id) = patch.bus_type_id {
            set.push("bus_type_id = ").push_bind_unseparated(bus_type_id);
        }
        qb.push(" WHERE id = ").push_bind(id.get());
        qb.push(" RETURNING ").push(TRIP_COLUMNS);

        let row = qb
            .build_query_as::<TripRow>()
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn delete(&mut self, id: TripId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1")
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
