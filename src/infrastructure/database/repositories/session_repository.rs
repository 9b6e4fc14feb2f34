//! SeaORM implementation of SessionRepository

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use super::{corrupt, db_err};
use crate::domain::session::{Session, SessionMetrics, SessionRepository, SessionState};
use crate::domain::DomainResult;
use crate::infrastructure::database::entities::charging_session;

pub struct SeaOrmSessionRepository {
    db: DatabaseConnection,
}

impl SeaOrmSessionRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: charging_session::Model) -> DomainResult<Session> {
    let state =
        SessionState::parse(&m.state).ok_or_else(|| corrupt("charging_session", "state", &m.state))?;
    Ok(Session {
        id: m.id,
        port_id: m.port_id,
        station_id: m.station_id,
        vehicle_id: m.vehicle_id,
        user_id: m.user_id,
        state,
        started_at: m.started_at,
        ended_at: m.ended_at,
        metrics: SessionMetrics {
            energy_kwh: m.energy_kwh,
            duration_secs: m.duration_secs,
            last_power_kw: m.last_power_kw,
        },
        end_reason: m.end_reason,
        updated_at: m.updated_at,
    })
}

fn domain_to_active(s: &Session) -> charging_session::ActiveModel {
    charging_session::ActiveModel {
        id: Set(s.id.clone()),
        port_id: Set(s.port_id.clone()),
        station_id: Set(s.station_id.clone()),
        vehicle_id: Set(s.vehicle_id.clone()),
        user_id: Set(s.user_id.clone()),
        state: Set(s.state.as_str().to_string()),
        started_at: Set(s.started_at),
        ended_at: Set(s.ended_at),
        energy_kwh: Set(s.metrics.energy_kwh),
        duration_secs: Set(s.metrics.duration_secs),
        last_power_kw: Set(s.metrics.last_power_kw),
        end_reason: Set(s.end_reason.clone()),
        updated_at: Set(s.updated_at),
    }
}

#[async_trait]
impl SessionRepository for SeaOrmSessionRepository {
    async fn save(&self, s: Session) -> DomainResult<()> {
        let existing = charging_session::Entity::find_by_id(&s.id)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        let model = domain_to_active(&s);
        match existing {
            // A terminal row is final; an out-of-order write must not reopen it
            Some(row) if SessionState::parse(&row.state).is_some_and(|st| st.is_terminal()) => {}
            Some(_) => {
                model.update(&self.db).await.map_err(db_err)?;
            }
            None => {
                model.insert(&self.db).await.map_err(db_err)?;
            }
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Session>> {
        charging_session::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_domain)
            .transpose()
    }

    async fn find_for_user(&self, user_id: &str) -> DomainResult<Vec<Session>> {
        charging_session::Entity::find()
            .filter(charging_session::Column::UserId.eq(user_id))
            .order_by_desc(charging_session::Column::StartedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }

    async fn find_open(&self) -> DomainResult<Vec<Session>> {
        let open = [
            SessionState::Pending,
            SessionState::Active,
            SessionState::Completing,
        ];
        charging_session::Entity::find()
            .filter(charging_session::Column::State.is_in(open.iter().map(|s| s.as_str())))
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }
}
