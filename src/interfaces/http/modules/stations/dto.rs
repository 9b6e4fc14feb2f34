//! Station DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::{DomainError, DomainResult, Station, StationConfig, StationStatus};
use crate::interfaces::http::modules::ports::parse_connector;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StationDto {
    pub id: String,
    pub name: String,
    pub address: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Active, Inactive, Maintenance
    pub status: String,
    pub max_concurrent_sessions: u32,
    pub supported_connectors: Vec<String>,
    /// Non-terminal sessions currently counted against the limit
    pub open_sessions: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StationDto {
    pub fn from_domain(s: Station, open_sessions: u32) -> Self {
        Self {
            id: s.id,
            name: s.name,
            address: s.address,
            latitude: s.latitude,
            longitude: s.longitude,
            status: s.status.as_str().to_string(),
            max_concurrent_sessions: s.config.max_concurrent_sessions,
            supported_connectors: s
                .config
                .supported_connectors
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
            open_sessions,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateStationRequest {
    #[validate(length(min = 1, max = 64, message = "Station id must be 1-64 characters"))]
    pub id: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 512))]
    pub address: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(range(min = 1, max = 1000))]
    pub max_concurrent_sessions: u32,
    #[validate(length(min = 1, message = "At least one connector type is required"))]
    pub supported_connectors: Vec<String>,
}

impl CreateStationRequest {
    pub fn into_domain(self) -> DomainResult<Station> {
        let config = station_config(self.max_concurrent_sessions, &self.supported_connectors)?;
        let mut station = Station::new(self.id, self.name, self.latitude, self.longitude, config);
        station.address = self.address;
        Ok(station)
    }
}

/// Full replacement of the editable station fields
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStationRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 512))]
    pub address: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// Active, Inactive, Maintenance
    pub status: String,
    #[validate(range(min = 1, max = 1000))]
    pub max_concurrent_sessions: u32,
    #[validate(length(min = 1))]
    pub supported_connectors: Vec<String>,
}

impl UpdateStationRequest {
    pub fn into_domain(self, station_id: &str) -> DomainResult<Station> {
        let status = StationStatus::parse(&self.status).ok_or_else(|| {
            DomainError::Validation(format!("Unknown station status '{}'", self.status))
        })?;
        let config = station_config(self.max_concurrent_sessions, &self.supported_connectors)?;
        let mut station = Station::new(station_id, self.name, self.latitude, self.longitude, config);
        station.address = self.address;
        station.status = status;
        Ok(station)
    }
}

fn station_config(max_concurrent_sessions: u32, connectors: &[String]) -> DomainResult<StationConfig> {
    let mut supported_connectors = Vec::with_capacity(connectors.len());
    for raw in connectors {
        let connector = parse_connector(raw)?;
        if !supported_connectors.contains(&connector) {
            supported_connectors.push(connector);
        }
    }
    Ok(StationConfig {
        max_concurrent_sessions,
        supported_connectors,
    })
}
