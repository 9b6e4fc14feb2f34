//! Port domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Port state as seen by every client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortState {
    Available,
    /// Held for a pending session until the station acknowledges
    Reserved,
    Charging,
    /// Stop requested, waiting for the final meter report
    Completing,
    Faulted,
    /// Taken out of service by an operator
    Offline,
}

impl PortState {
    pub const ALL: [PortState; 6] = [
        Self::Available,
        Self::Reserved,
        Self::Charging,
        Self::Completing,
        Self::Faulted,
        Self::Offline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Reserved => "Reserved",
            Self::Charging => "Charging",
            Self::Completing => "Completing",
            Self::Faulted => "Faulted",
            Self::Offline => "Offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str().eq_ignore_ascii_case(s))
    }

    /// States the watchdog recovers when they outlive their grace period
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Reserved | Self::Completing)
    }
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Physical connector standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectorType {
    Type1,
    Type2,
    #[serde(rename = "CCS")]
    Ccs,
    #[serde(rename = "CHAdeMO")]
    Chademo,
    TeslaNacs,
}

impl ConnectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Type1 => "Type1",
            Self::Type2 => "Type2",
            Self::Ccs => "CCS",
            Self::Chademo => "CHAdeMO",
            Self::TeslaNacs => "TeslaNacs",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace([' ', '_', '-'], "").as_str() {
            "type1" => Some(Self::Type1),
            "type2" => Some(Self::Type2),
            "ccs" => Some(Self::Ccs),
            "chademo" => Some(Self::Chademo),
            "teslanacs" | "nacs" => Some(Self::TeslaNacs),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Charging port of a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub station_id: String,
    pub connector_type: ConnectorType,
    pub max_power_kw: f64,
    pub state: PortState,
    pub last_transition_at: DateTime<Utc>,
    /// Set while a non-terminal session holds the port
    pub active_session_id: Option<String>,
    /// Sequence of the last event emitted for this port; doubles as the version
    pub sequence: u64,
    /// Code of the last fault report, cleared on reset
    pub fault_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Port {
    pub fn new(
        id: impl Into<String>,
        station_id: impl Into<String>,
        connector_type: ConnectorType,
        max_power_kw: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            station_id: station_id.into(),
            connector_type,
            max_power_kw,
            state: PortState::Available,
            last_transition_at: now,
            active_session_id: None,
            sequence: 0,
            fault_code: None,
            created_at: now,
        }
    }

    pub fn is_available(&self) -> bool {
        self.state == PortState::Available
    }

    /// Age of the current state at `now`
    pub fn state_age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_transition_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_port_is_available_without_session() {
        let p = Port::new("P101", "ST1", ConnectorType::Ccs, 150.0);
        assert!(p.is_available());
        assert_eq!(p.active_session_id, None);
        assert_eq!(p.sequence, 0);
    }

    #[test]
    fn connector_parse_accepts_common_spellings() {
        assert_eq!(ConnectorType::parse("CHAdeMO"), Some(ConnectorType::Chademo));
        assert_eq!(ConnectorType::parse("tesla_nacs"), Some(ConnectorType::TeslaNacs));
        assert_eq!(ConnectorType::parse("ccs"), Some(ConnectorType::Ccs));
        assert_eq!(ConnectorType::parse("GB/T"), None);
    }

    #[test]
    fn transient_states() {
        let transient: Vec<_> = PortState::ALL.into_iter().filter(|s| s.is_transient()).collect();
        assert_eq!(transient, vec![PortState::Reserved, PortState::Completing]);
    }

    #[test]
    fn connector_serde_uses_display_names() {
        let json = serde_json::to_string(&ConnectorType::Chademo).unwrap();
        assert_eq!(json, "\"CHAdeMO\"");
    }
}
