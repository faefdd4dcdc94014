pub mod memory;
pub mod models;
pub mod repository;
pub mod reservations;
pub mod seat_map;
pub mod templates;
pub mod trips;

pub use memory::MemoryStore;
pub use repository::{
    LedgerTx, ReservationLedger, SeatTemplateRepository, StoreError, StoreResult, TemplateTx,
    TripRepository, TripTx,
};
pub use reservations::ReservationController;
pub use seat_map::SeatMapProjector;
pub use templates::SeatTemplateStore;
pub use trips::TripRegistry;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound { entity, id: id.to_string() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidArgument(msg.into())
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::MissingReference(msg) => CoreError::InvalidArgument(msg),
            StoreError::Backend(msg) => CoreError::Internal(msg),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Trims a required text field; `None` when missing or blank.
pub(crate) fn required_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Trims optional text; blank collapses to `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
