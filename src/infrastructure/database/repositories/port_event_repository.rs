//! SeaORM implementation of PortEventRepository

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use super::{corrupt, db_err};
use crate::domain::events::{PortEvent, PortEventRepository, TriggerKind};
use crate::domain::{Actor, ActorRole, DomainResult, PortState, SessionState};
use crate::infrastructure::database::entities::port_event;

pub struct SeaOrmPortEventRepository {
    db: DatabaseConnection,
}

impl SeaOrmPortEventRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: port_event::Model) -> DomainResult<PortEvent> {
    let state = |column: &str, value: &str| {
        PortState::parse(value).ok_or_else(|| corrupt("port_event", column, value))
    };
    let old_state = state("old_state", &m.old_state)?;
    let new_state = state("new_state", &m.new_state)?;
    let trigger =
        TriggerKind::parse(&m.trigger).ok_or_else(|| corrupt("port_event", "trigger", &m.trigger))?;
    let role = ActorRole::parse(&m.actor_role)
        .ok_or_else(|| corrupt("port_event", "actor_role", &m.actor_role))?;
    let session_state = match m.session_state.as_deref() {
        Some(s) => Some(
            SessionState::parse(s).ok_or_else(|| corrupt("port_event", "session_state", s))?,
        ),
        None => None,
    };
    Ok(PortEvent {
        sequence: m.sequence.max(0) as u64,
        port_id: m.port_id,
        station_id: m.station_id,
        session_id: m.session_id,
        session_state,
        old_state,
        new_state,
        trigger,
        actor: Actor::new(m.actor_id, role, m.timestamp),
        timestamp: m.timestamp,
    })
}

#[async_trait]
impl PortEventRepository for SeaOrmPortEventRepository {
    async fn append(&self, e: PortEvent) -> DomainResult<()> {
        let model = port_event::ActiveModel {
            id: NotSet,
            port_id: Set(e.port_id),
            sequence: Set(e.sequence as i64),
            station_id: Set(e.station_id),
            session_id: Set(e.session_id),
            session_state: Set(e.session_state.map(|s| s.as_str().to_string())),
            old_state: Set(e.old_state.as_str().to_string()),
            new_state: Set(e.new_state.as_str().to_string()),
            trigger: Set(e.trigger.as_str().to_string()),
            actor_id: Set(e.actor.id),
            actor_role: Set(e.actor.role.as_str().to_string()),
            timestamp: Set(e.timestamp),
        };
        port_event::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([port_event::Column::PortId, port_event::Column::Sequence])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_after(&self, port_id: &str, after: u64, limit: u64) -> DomainResult<Vec<PortEvent>> {
        port_event::Entity::find()
            .filter(port_event::Column::PortId.eq(port_id))
            .filter(port_event::Column::Sequence.gt(after as i64))
            .order_by_asc(port_event::Column::Sequence)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_domain)
            .collect()
    }
}
