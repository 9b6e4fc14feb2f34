//! Charging session aggregate

pub mod model;
pub mod repository;

pub use model::{Session, SessionMetrics, SessionOutcome, SessionState};
pub use repository::SessionRepository;
