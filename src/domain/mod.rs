//! Domain layer
//!
//! Entities, the port state machine and the repository interfaces. No I/O.

pub mod actor;
pub mod events;
pub mod port;
pub mod repositories;
pub mod session;
pub mod station;
pub mod transition;

pub use actor::{Actor, ActorRole};
pub use events::{PortEvent, TriggerKind};
pub use port::{ConnectorType, Port, PortState};
pub use repositories::{DomainResult, RepositoryProvider};
pub use session::{Session, SessionMetrics, SessionOutcome, SessionState};
pub use station::{Station, StationConfig, StationStatus};
pub use transition::{PortTrigger, SessionEffect, TransitionRule};

pub use crate::shared::errors::{ConflictReason, DomainError};
