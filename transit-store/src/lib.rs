pub mod app_config;
pub mod database;
mod error;
pub mod reservation_repo;
pub mod seat_repo;
pub mod trip_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use reservation_repo::PgReservationLedger;
pub use seat_repo::PgSeatTemplateRepository;
pub use trip_repo::PgTripRepository;
