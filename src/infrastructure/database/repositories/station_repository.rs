//! SeaORM implementation of StationRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::debug;

use super::{corrupt, db_err};
use crate::domain::station::{Station, StationConfig, StationRepository, StationStatus};
use crate::domain::{DomainError, DomainResult};
use crate::infrastructure::database::entities::{port, port_event, station};

pub struct SeaOrmStationRepository {
    db: DatabaseConnection,
}

impl SeaOrmStationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: station::Model) -> DomainResult<Station> {
    let status = StationStatus::parse(&m.status).ok_or_else(|| corrupt("station", "status", &m.status))?;
    let config: StationConfig = serde_json::from_str(&m.config)
        .map_err(|e| DomainError::Persistence(format!("station {} config: {}", m.id, e)))?;
    Ok(Station {
        id: m.id,
        name: m.name,
        address: m.address,
        latitude: m.latitude,
        longitude: m.longitude,
        status,
        config,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}

fn domain_to_active(s: &Station) -> DomainResult<station::ActiveModel> {
    let config = serde_json::to_string(&s.config)
        .map_err(|e| DomainError::Persistence(format!("station {} config: {}", s.id, e)))?;
    Ok(station::ActiveModel {
        id: Set(s.id.clone()),
        name: Set(s.name.clone()),
        address: Set(s.address.clone()),
        latitude: Set(s.latitude),
        longitude: Set(s.longitude),
        status: Set(s.status.as_str().to_string()),
        config: Set(config),
        created_at: Set(s.created_at),
        updated_at: Set(s.updated_at),
    })
}

#[async_trait]
impl StationRepository for SeaOrmStationRepository {
    async fn save(&self, s: Station) -> DomainResult<()> {
        debug!(station_id = %s.id, "Saving station");
        let existing = station::Entity::find_by_id(&s.id)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        let model = domain_to_active(&s)?;
        if existing.is_some() {
            model.update(&self.db).await.map_err(db_err)?;
        } else {
            model.insert(&self.db).await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Station>> {
        station::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_domain)
            .transpose()
    }

    async fn find_all(&self) -> DomainResult<Vec<Station>> {
        station::Entity::find()
            .order_by_asc(station::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        debug!(station_id = %id, "Deleting station");
        port_event::Entity::delete_many()
            .filter(port_event::Column::StationId.eq(id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        port::Entity::delete_many()
            .filter(port::Column::StationId.eq(id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        station::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
