pub mod ids;
pub mod pii;

pub use ids::{double_option, BusTypeId, ParseIdError, ReservationId, SeatId, TripId, UserId};
pub use pii::Masked;
