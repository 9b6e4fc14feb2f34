//! Station aggregate

pub mod model;
pub mod repository;

pub use model::{Station, StationConfig, StationStatus};
pub use repository::StationRepository;
