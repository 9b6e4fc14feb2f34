//! Station domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::port::ConnectorType;

/// Station operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StationStatus {
    /// Accepting new sessions
    Active,
    /// Switched off by the operator
    Inactive,
    /// Under maintenance, existing sessions may finish
    Maintenance,
}

impl Default for StationStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
            Self::Maintenance => "Maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Operator-controlled station limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Upper bound on non-terminal sessions across all ports of the station
    pub max_concurrent_sessions: u32,
    pub supported_connectors: Vec<ConnectorType>,
}

impl StationConfig {
    pub fn supports(&self, connector: ConnectorType) -> bool {
        self.supported_connectors.contains(&connector)
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 4,
            supported_connectors: vec![ConnectorType::Type2, ConnectorType::Ccs],
        }
    }
}

/// Charging station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub status: StationStatus,
    pub config: StationConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Station {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        config: StationConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            address: None,
            latitude,
            longitude,
            status: StationStatus::Active,
            config,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn accepts_sessions(&self) -> bool {
        self.status == StationStatus::Active
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_station_is_active() {
        let s = Station::new("ST1", "Depot", 41.3, 69.2, StationConfig::default());
        assert!(s.accepts_sessions());
        assert_eq!(s.address, None);
    }

    #[test]
    fn maintenance_station_rejects_sessions() {
        let mut s = Station::new("ST1", "Depot", 0.0, 0.0, StationConfig::default());
        s.status = StationStatus::Maintenance;
        assert!(!s.accepts_sessions());
    }

    #[test]
    fn config_supports_listed_connectors() {
        let cfg = StationConfig::default();
        assert!(cfg.supports(ConnectorType::Ccs));
        assert!(!cfg.supports(ConnectorType::Chademo));
    }

    #[test]
    fn status_parse_roundtrip() {
        for s in [StationStatus::Active, StationStatus::Inactive, StationStatus::Maintenance] {
            assert_eq!(StationStatus::parse(s.as_str()), Some(s));
        }
    }
}
