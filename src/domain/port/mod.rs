//! Port aggregate

pub mod model;
pub mod repository;

pub use model::{ConnectorType, Port, PortState};
pub use repository::PortRepository;
