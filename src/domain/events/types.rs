//! Port events
//!
//! Every committed port transition produces exactly one `PortEvent`.
//! Sequence numbers are per port, start at 1 and have no gaps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::Actor;
use crate::domain::port::PortState;
use crate::domain::session::SessionState;

/// Kind of trigger that caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    StartRequested,
    HardwareAck,
    Timeout,
    StopRequested,
    HardwareStopReport,
    HardwareFinalReport,
    FaultReport,
    ManualReset,
    TakeOffline,
    BringOnline,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartRequested => "StartRequested",
            Self::HardwareAck => "HardwareAck",
            Self::Timeout => "Timeout",
            Self::StopRequested => "StopRequested",
            Self::HardwareStopReport => "HardwareStopReport",
            Self::HardwareFinalReport => "HardwareFinalReport",
            Self::FaultReport => "FaultReport",
            Self::ManualReset => "ManualReset",
            Self::TakeOffline => "TakeOffline",
            Self::BringOnline => "BringOnline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "StartRequested" => Some(Self::StartRequested),
            "HardwareAck" => Some(Self::HardwareAck),
            "Timeout" => Some(Self::Timeout),
            "StopRequested" => Some(Self::StopRequested),
            "HardwareStopReport" => Some(Self::HardwareStopReport),
            "HardwareFinalReport" => Some(Self::HardwareFinalReport),
            "FaultReport" => Some(Self::FaultReport),
            "ManualReset" => Some(Self::ManualReset),
            "TakeOffline" => Some(Self::TakeOffline),
            "BringOnline" => Some(Self::BringOnline),
            _ => None,
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of one port transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortEvent {
    pub sequence: u64,
    pub port_id: String,
    pub station_id: String,
    pub session_id: Option<String>,
    /// Session state right after the transition, if a session was involved
    pub session_state: Option<SessionState>,
    pub old_state: PortState,
    pub new_state: PortState,
    pub trigger: TriggerKind,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
}

impl PortEvent {
    pub fn event_type(&self) -> &'static str {
        "port_transition"
    }
}
