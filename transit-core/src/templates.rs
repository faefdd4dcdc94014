use std::sync::Arc;

use tracing::{info, warn};
use transit_shared::{BusTypeId, SeatId};

use crate::models::{BusType, BusTypeSummary, CreateBusType, GenerateGrid, GridSummary, Seat};
use crate::repository::SeatTemplateRepository;
use crate::{required_text, CoreError, CoreResult};

/// Upper bound on either grid dimension.
pub const MAX_GRID_DIMENSION: u32 = 100;

/// Owns bus types and their seat grids.
#[derive(Clone)]
pub struct SeatTemplateStore {
    repo: Arc<dyn SeatTemplateRepository>,
}

impl SeatTemplateStore {
    pub fn new(repo: Arc<dyn SeatTemplateRepository>) -> Self {
        Self { repo }
    }

    pub async fn create_bus_type(&self, req: CreateBusType) -> CoreResult<BusType> {
        let name = required_text(req.name.as_deref())
            .ok_or_else(|| CoreError::invalid("name and seatCount required"))?;
        let seat_count = req
            .seat_count
            .ok_or_else(|| CoreError::invalid("name and seatCount required"))?;
        if seat_count < 0 {
            return Err(CoreError::invalid("seatCount must be >= 0"));
        }

        let bus_type = self.repo.create_bus_type(&name, seat_count).await?;
        info!(bus_type_id = bus_type.id, name = %bus_type.name, "Bus type created");
        Ok(bus_type)
    }

    pub async fn list_bus_types(&self) -> CoreResult<Vec<BusTypeSummary>> {
        Ok(self.repo.list_bus_types().await?)
    }

    /// Replaces the bus type's seats with a fresh `rows` x `cols` grid.
    ///
    /// Refused with `Conflict` while any reservation on any trip points at one
    /// of the current seats. The check and the replacement share a transaction
    /// that holds the bus type row lock.
    pub async fn generate_grid(&self, bus_type_id: BusTypeId, req: GenerateGrid) -> CoreResult<GridSummary> {
        let (rows, cols) = match (req.rows, req.cols) {
            (Some(r), Some(c)) if r > 0 && c > 0 => (r, c),
            _ => return Err(CoreError::invalid("rows and cols required")),
        };
        if rows > MAX_GRID_DIMENSION || cols > MAX_GRID_DIMENSION {
            return Err(CoreError::invalid(format!(
                "rows and cols must not exceed {}",
                MAX_GRID_DIMENSION
            )));
        }

        let mut tx = self.repo.begin().await?;
        if tx.lock_bus_type(bus_type_id).await?.is_none() {
            return Err(CoreError::not_found("bus type", bus_type_id));
        }

        let linked = tx.linked_reservation_count(bus_type_id).await?;
        if linked > 0 {
            warn!(bus_type_id, linked, "Seat grid regeneration refused: reservations reference current seats");
            return Err(CoreError::Conflict(
                "cannot regenerate seats: reservations are linked to this bus type".to_string(),
            ));
        }

        let cells = grid_cells(rows, cols);
        let created = tx.replace_seats(bus_type_id, &cells).await?;
        tx.commit().await?;

        info!(bus_type_id, rows, cols, created, "Seat grid generated");
        Ok(GridSummary { bus_type_id, rows, cols, created })
    }

    /// Seats ordered by (row, col). An unknown bus type yields an empty list.
    pub async fn list_seats(&self, bus_type_id: BusTypeId) -> CoreResult<Vec<Seat>> {
        Ok(self.repo.list_seats(bus_type_id).await?)
    }

    pub async fn get_seat(&self, seat_id: SeatId) -> CoreResult<Option<Seat>> {
        Ok(self.repo.get_seat(seat_id).await?)
    }
}

/// Row-major, 1-indexed (row, col) pairs.
pub fn grid_cells(rows: u32, cols: u32) -> Vec<(i32, i32)> {
    let mut cells = Vec::with_capacity((rows * cols) as usize);
    for r in 1..=rows as i32 {
        for c in 1..=cols as i32 {
            cells.push((r, c));
        }
    }
    cells
}
