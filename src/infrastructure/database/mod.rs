pub mod entities;
pub mod migrator;
pub mod repositories;

pub use repositories::SeaOrmRepositoryProvider;

use tracing::info;
use sea_orm::{Database, DatabaseConnection};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://./charge-coordinator.db?mode=rwc")
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./charge-coordinator.db?mode=rwc".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Create config for SQLite
    pub fn sqlite(path: &str) -> Self {
        Self {
            url: format!("sqlite://{}?mode=rwc", path),
        }
    }

    /// Private in-memory SQLite database
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
        }
    }
}

/// Initialize database connection
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, sea_orm::DbErr> {
    info!(url = %config.url, "Connecting to database");
    let db = Database::connect(&config.url).await?;
    info!("Database connected successfully");
    Ok(db)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sea_orm_migration::MigratorTrait;

    use super::migrator::Migrator;
    use super::*;
    use crate::domain::{
        Actor, ConnectorType, Port, PortEvent, PortState, RepositoryProvider, Session,
        SessionOutcome, Station, StationConfig, TriggerKind,
    };

    async fn provider() -> SeaOrmRepositoryProvider {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        SeaOrmRepositoryProvider::new(db)
    }

    fn event(port_id: &str, sequence: u64) -> PortEvent {
        PortEvent {
            sequence,
            port_id: port_id.to_string(),
            station_id: "ST1".into(),
            session_id: None,
            session_state: None,
            old_state: PortState::Available,
            new_state: PortState::Offline,
            trigger: TriggerKind::TakeOffline,
            actor: Actor::admin("ops"),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn station_and_port_round_trip() {
        let repos = provider().await;
        let station = Station::new("ST1", "Depot", 41.31, 69.24, StationConfig::default())
            .with_address("Amir Temur 1");
        repos.stations().save(station.clone()).await.unwrap();
        repos.stations().save(station.clone()).await.unwrap();

        let port = Port::new("P1", "ST1", ConnectorType::Ccs, 150.0);
        assert!(repos.ports().store_if_newer(port.clone()).await.unwrap());

        let loaded = repos.stations().find_by_id("ST1").await.unwrap().unwrap();
        assert_eq!(loaded.config, station.config);
        assert_eq!(loaded.address.as_deref(), Some("Amir Temur 1"));
        assert_eq!(repos.ports().find_all().await.unwrap().len(), 1);

        repos.stations().delete("ST1").await.unwrap();
        assert!(repos.ports().find_by_id("P1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_port_version_is_rejected() {
        let repos = provider().await;
        repos
            .stations()
            .save(Station::new("ST1", "Depot", 0.0, 0.0, StationConfig::default()))
            .await
            .unwrap();
        let mut port = Port::new("P1", "ST1", ConnectorType::Type2, 22.0);
        repos.ports().store_if_newer(port.clone()).await.unwrap();

        port.sequence = 2;
        port.state = PortState::Charging;
        assert!(repos.ports().store_if_newer(port.clone()).await.unwrap());

        let mut older = port.clone();
        older.sequence = 1;
        older.state = PortState::Reserved;
        assert!(!repos.ports().store_if_newer(older).await.unwrap());

        let stored = repos.ports().find_by_id("P1").await.unwrap().unwrap();
        assert_eq!(stored.state, PortState::Charging);
        assert_eq!(stored.sequence, 2);
    }

    #[tokio::test]
    async fn event_log_ignores_duplicates() {
        let repos = provider().await;
        for seq in [1, 2, 2, 3] {
            repos.events().append(event("P1", seq)).await.unwrap();
        }
        repos.events().append(event("P2", 1)).await.unwrap();

        let after_one = repos.events().find_after("P1", 1, 10).await.unwrap();
        let seqs: Vec<u64> = after_one.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert_eq!(after_one[0].actor.id, "ops");
    }

    #[tokio::test]
    async fn terminal_session_is_not_reopened() {
        let repos = provider().await;
        let mut session = Session::new("P1", "ST1", "V1", "U1", Utc::now());
        let pending = session.clone();
        repos.sessions().save(session.clone()).await.unwrap();
        assert_eq!(repos.sessions().find_open().await.unwrap().len(), 1);

        session.finish(SessionOutcome::Closed, "done", Utc::now());
        repos.sessions().save(session.clone()).await.unwrap();
        repos.sessions().save(pending).await.unwrap();

        assert!(repos.sessions().find_open().await.unwrap().is_empty());
        let for_user = repos.sessions().find_for_user("U1").await.unwrap();
        assert_eq!(for_user.len(), 1);
        assert!(for_user[0].is_terminal());
    }

    #[tokio::test]
    async fn deleted_port_takes_its_event_log_along() {
        let repos = provider().await;
        repos
            .stations()
            .save(Station::new("ST1", "Depot", 0.0, 0.0, StationConfig::default()))
            .await
            .unwrap();
        let port = Port::new("P1", "ST1", ConnectorType::Ccs, 150.0);
        repos.ports().store_if_newer(port.clone()).await.unwrap();
        for seq in 1..=3 {
            repos.events().append(event("P1", seq)).await.unwrap();
        }

        repos.ports().delete("P1").await.unwrap();
        assert!(repos.events().find_after("P1", 0, 10).await.unwrap().is_empty());

        // Re-added under the same id: numbering restarts and is not shadowed.
        repos.ports().store_if_newer(port).await.unwrap();
        let mut fresh = event("P1", 1);
        fresh.new_state = PortState::Faulted;
        repos.events().append(fresh).await.unwrap();
        let log = repos.events().find_after("P1", 0, 10).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].new_state, PortState::Faulted);
    }

    #[tokio::test]
    async fn deleted_station_takes_port_events_along() {
        let repos = provider().await;
        repos
            .stations()
            .save(Station::new("ST1", "Depot", 0.0, 0.0, StationConfig::default()))
            .await
            .unwrap();
        repos
            .ports()
            .store_if_newer(Port::new("P1", "ST1", ConnectorType::Ccs, 150.0))
            .await
            .unwrap();
        repos.events().append(event("P1", 1)).await.unwrap();

        repos.stations().delete("ST1").await.unwrap();
        assert!(repos.events().find_after("P1", 0, 10).await.unwrap().is_empty());
    }
}
