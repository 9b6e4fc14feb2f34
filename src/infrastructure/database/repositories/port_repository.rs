//! SeaORM implementation of PortRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;

use super::{corrupt, db_err};
use crate::domain::port::{ConnectorType, Port, PortRepository, PortState};
use crate::domain::DomainResult;
use crate::infrastructure::database::entities::{port, port_event};

pub struct SeaOrmPortRepository {
    db: DatabaseConnection,
}

impl SeaOrmPortRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: port::Model) -> DomainResult<Port> {
    let connector_type = ConnectorType::parse(&m.connector_type)
        .ok_or_else(|| corrupt("port", "connector_type", &m.connector_type))?;
    let state = PortState::parse(&m.state).ok_or_else(|| corrupt("port", "state", &m.state))?;
    Ok(Port {
        id: m.id,
        station_id: m.station_id,
        connector_type,
        max_power_kw: m.max_power_kw,
        state,
        last_transition_at: m.last_transition_at,
        active_session_id: m.active_session_id,
        sequence: m.version.max(0) as u64,
        fault_code: m.fault_code,
        created_at: m.created_at,
    })
}

fn domain_to_active(p: &Port) -> port::ActiveModel {
    port::ActiveModel {
        id: Set(p.id.clone()),
        station_id: Set(p.station_id.clone()),
        connector_type: Set(p.connector_type.as_str().to_string()),
        max_power_kw: Set(p.max_power_kw),
        state: Set(p.state.as_str().to_string()),
        last_transition_at: Set(p.last_transition_at),
        active_session_id: Set(p.active_session_id.clone()),
        version: Set(p.sequence as i64),
        fault_code: Set(p.fault_code.clone()),
        created_at: Set(p.created_at),
    }
}

#[async_trait]
impl PortRepository for SeaOrmPortRepository {
    async fn store_if_newer(&self, p: Port) -> DomainResult<bool> {
        let version = p.sequence as i64;
        let updated = port::Entity::update_many()
            .set(domain_to_active(&p))
            .filter(port::Column::Id.eq(p.id.as_str()))
            .filter(port::Column::Version.lt(version))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        if updated.rows_affected > 0 {
            return Ok(true);
        }

        let existing = port::Entity::find_by_id(&p.id)
            .one(&self.db)
            .await
            .map_err(db_err)?;
        if existing.is_some() {
            debug!(port_id = %p.id, version, "Skipping stale port write");
            return Ok(false);
        }
        domain_to_active(&p).insert(&self.db).await.map_err(db_err)?;
        Ok(true)
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Port>> {
        port::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_domain)
            .transpose()
    }

    async fn find_all(&self) -> DomainResult<Vec<Port>> {
        port::Entity::find()
            .order_by_asc(port::Column::CreatedAt)
            .order_by_asc(port::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }

    /// Removes the port and its event log, so a port re-added under the
    /// same id starts numbering from 1 again.
    async fn delete(&self, id: &str) -> DomainResult<()> {
        let dropped = port_event::Entity::delete_many()
            .filter(port_event::Column::PortId.eq(id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        debug!(port_id = %id, events = dropped.rows_affected, "Deleting port");
        port::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
