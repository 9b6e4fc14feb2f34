use std::fmt;

use thiserror::Error;

use crate::domain::PortState;

/// Why a state transition was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another transition on the same port is in flight.
    PortBusy,
    /// The port is not in the state the caller expected.
    StateMismatch {
        expected: PortState,
        actual: PortState,
    },
    /// No row of the transition table matches.
    IllegalTransition { from: PortState, trigger: String },
    /// The session is not in the state the transition requires.
    SessionState { session_id: String, state: String },
    /// The vehicle is already bound to a non-terminal session.
    VehicleBusy { vehicle_id: String },
    /// The station reached its concurrent session limit.
    StationAtCapacity { station_id: String, limit: u32 },
    /// The station is not accepting new sessions.
    StationClosed { station_id: String },
    /// Administrative removal refused because the entity is in use.
    InUse(String),
    /// Entity with the same identifier already exists.
    AlreadyExists(String),
}

impl ConflictReason {
    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PortBusy => "port_busy",
            Self::StateMismatch { .. } => "state_mismatch",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::SessionState { .. } => "session_state",
            Self::VehicleBusy { .. } => "vehicle_busy",
            Self::StationAtCapacity { .. } => "station_at_capacity",
            Self::StationClosed { .. } => "station_closed",
            Self::InUse(_) => "in_use",
            Self::AlreadyExists(_) => "already_exists",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortBusy => write!(f, "port is busy with another transition"),
            Self::StateMismatch { expected, actual } => {
                write!(f, "expected port state {}, found {}", expected, actual)
            }
            Self::IllegalTransition { from, trigger } => {
                write!(f, "{} is not allowed from {}", trigger, from)
            }
            Self::SessionState { session_id, state } => {
                write!(f, "session {} is {}", session_id, state)
            }
            Self::VehicleBusy { vehicle_id } => {
                write!(f, "vehicle {} already has an open session", vehicle_id)
            }
            Self::StationAtCapacity { station_id, limit } => {
                write!(f, "station {} reached its limit of {} sessions", station_id, limit)
            }
            Self::StationClosed { station_id } => {
                write!(f, "station {} is not accepting sessions", station_id)
            }
            Self::InUse(what) => write!(f, "{} is in use", what),
            Self::AlreadyExists(what) => write!(f, "{} already exists", what),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Conflict: {0}")]
    Conflict(ConflictReason),

    #[error("Stale subscriber on port {port_id}: requested replay after {requested}, oldest retained is {oldest_retained}")]
    StaleSubscriber {
        port_id: String,
        requested: u64,
        oldest_retained: u64,
    },

    #[error("Hardware anomaly: {0}")]
    HardwareAnomaly(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Persistence: {0}")]
    Persistence(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, value: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            field: "id",
            value: value.into(),
        }
    }

    /// Conflicts are ordinary business failures; the caller may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_port_busy(&self) -> bool {
        matches!(self, Self::Conflict(ConflictReason::PortBusy))
    }

    /// Lost a race on the port: it was locked or moved on since it was read.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::Conflict(ConflictReason::PortBusy | ConflictReason::StateMismatch { .. })
        )
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict(reason) => reason.label(),
            Self::StaleSubscriber { .. } => "stale_subscriber",
            Self::HardwareAnomaly(_) => "hardware_anomaly",
            Self::Forbidden(_) => "forbidden",
            Self::Validation(_) => "validation",
            Self::Persistence(_) => "persistence",
        }
    }
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<InfraError> for DomainError {
    fn from(e: InfraError) -> Self {
        DomainError::Persistence(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Infra(#[from] InfraError),
}
