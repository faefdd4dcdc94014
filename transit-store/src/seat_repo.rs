use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use transit_core::models::{BusType, BusTypeSummary, Seat};
use transit_core::{SeatTemplateRepository, StoreResult, TemplateTx};
use transit_shared::{BusTypeId, SeatId};

use crate::error::{map_db_error, map_delete_error};

pub struct PgSeatTemplateRepository {
    pool: PgPool,
}

impl PgSeatTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BusTypeRow {
    id: i32,
    name: String,
    seat_count: i32,
    created_at: DateTime<Utc>,
}

impl From<BusTypeRow> for BusType {
    fn from(row: BusTypeRow) -> Self {
        BusType { id: row.id, name: row.name, seat_count: row.seat_count, created_at: row.created_at }
    }
}

#[derive(sqlx::FromRow)]
struct BusTypeSummaryRow {
    id: i32,
    name: String,
    seat_count: i32,
    seat_count_actual: i64,
}

// `row`/`col` are stored as seat_row/seat_col
#[derive(sqlx::FromRow)]
struct SeatRow {
    id: i32,
    bus_type_id: i32,
    seat_row: i32,
    seat_col: i32,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat { id: row.id, bus_type_id: row.bus_type_id, row: row.seat_row, col: row.seat_col }
    }
}

#[async_trait]
impl SeatTemplateRepository for PgSeatTemplateRepository {
    async fn create_bus_type(&self, name: &str, seat_count: i32) -> StoreResult<BusType> {
        let row = sqlx::query_as::<_, BusTypeRow>(
            r#"
            INSERT INTO bus_types (name, seat_count)
            VALUES ($1, $2)
            RETURNING id, name, seat_count, created_at
            "#,
        )
        .bind(name)
        .bind(seat_count)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.into())
    }

    async fn get_bus_type(&self, id: BusTypeId) -> StoreResult<Option<BusType>> {
        let row = sqlx::query_as::<_, BusTypeRow>(
            "SELECT id, name, seat_count, created_at FROM bus_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_bus_types(&self) -> StoreResult<Vec<BusTypeSummary>> {
        let rows = sqlx::query_as::<_, BusTypeSummaryRow>(
            r#"
            SELECT bt.id, bt.name, bt.seat_count, COUNT(s.id) AS seat_count_actual
            FROM bus_types bt
            LEFT JOIN seats s ON s.bus_type_id = bt.id
            GROUP BY bt.id
            ORDER BY bt.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows
            .into_iter()
            .map(|r| BusTypeSummary {
                id: r.id,
                name: r.name,
                seat_count_declared: r.seat_count,
                seat_count_actual: r.seat_count_actual,
            })
            .collect())
    }

    async fn list_seats(&self, bus_type_id: BusTypeId) -> StoreResult<Vec<Seat>> {
        let rows = sqlx::query_as::<_, SeatRow>(
            r#"
            SELECT id, bus_type_id, seat_row, seat_col
            FROM seats
            WHERE bus_type_id = $1
            ORDER BY seat_row, seat_col
            "#,
        )
        .bind(bus_type_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_seat(&self, seat_id: SeatId) -> StoreResult<Option<Seat>> {
        let row = sqlx::query_as::<_, SeatRow>(
            "SELECT id, bus_type_id, seat_row, seat_col FROM seats WHERE id = $1",
        )
        .bind(seat_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn begin(&self) -> StoreResult<Box<dyn TemplateTx>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgTemplateTx { tx }))
    }
}

pub struct PgTemplateTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TemplateTx for PgTemplateTx {
    async fn lock_bus_type(&mut self, id: BusTypeId) -> StoreResult<Option<BusType>> {
        let row = sqlx::query_as::<_, BusTypeRow>(
            "SELECT id, name, seat_count, created_at FROM bus_types WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn linked_reservation_count(&mut self, id: BusTypeId) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM reservations r
            JOIN seats s ON s.id = r.seat_id
            WHERE s.bus_type_id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)
    }

    async fn replace_seats(&mut self, id: BusTypeId, cells: &[(i32, i32)]) -> StoreResult<u64> {
        // A reservation committed after the count still trips the RESTRICT key.
        sqlx::query("DELETE FROM seats WHERE bus_type_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_delete_error)?;

        let (rows, cols): (Vec<i32>, Vec<i32>) = cells.iter().copied().unzip();
        let inserted = sqlx::query(
            r#"
            INSERT INTO seats (bus_type_id, seat_row, seat_col)
            SELECT $1, cell.r, cell.c
            FROM UNNEST($2::int4[], $3::int4[]) AS cell(r, c)
            "#,
        )
        .bind(id)
        .bind(rows)
        .bind(cols)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        Ok(inserted.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_db_error)
    }
}
