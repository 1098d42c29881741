//! Entity aggregate: a typed node with a JSON payload.

mod service;

pub use service::{EntityService, EntityServiceConfig};

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Kind, Result};
use crate::eventstore::Aggregate;
use crate::model::{Command, CommandModel, Data, Event, EventModel, Id, Version};

/// A typed node. The type is set at insert and immutable thereafter; deletes
/// tombstone the entity (the record is retained with `deleted_at` set).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub id: Id,
    #[serde(default, skip_serializing_if = "Data::is_empty")]
    pub data: Data,
    pub tenant_id: Id,
    #[serde(rename = "otype")]
    pub otype: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

/// Create a new entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertEntity {
    #[serde(flatten)]
    pub model: CommandModel,
    #[serde(default)]
    pub data: Data,
    pub otype: String,
}

/// Replace an entity's payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEntity {
    #[serde(flatten)]
    pub model: CommandModel,
    #[serde(default)]
    pub data: Data,
}

/// Tombstone an entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteEntity {
    #[serde(flatten)]
    pub model: CommandModel,
}

/// The commands an [`Entity`] accepts.
#[derive(Debug, Clone)]
pub enum EntityCommand {
    Insert(InsertEntity),
    Update(UpdateEntity),
    Delete(DeleteEntity),
}

impl EntityCommand {
    fn model(&self) -> &CommandModel {
        match self {
            EntityCommand::Insert(cmd) => &cmd.model,
            EntityCommand::Update(cmd) => &cmd.model,
            EntityCommand::Delete(cmd) => &cmd.model,
        }
    }
}

impl Command for EntityCommand {
    fn command_id(&self) -> &Id {
        &self.model().id
    }

    fn command_tenant_id(&self) -> &Id {
        &self.model().tenant_id
    }
}

impl From<InsertEntity> for EntityCommand {
    fn from(cmd: InsertEntity) -> Self {
        EntityCommand::Insert(cmd)
    }
}

impl From<UpdateEntity> for EntityCommand {
    fn from(cmd: UpdateEntity) -> Self {
        EntityCommand::Update(cmd)
    }
}

impl From<DeleteEntity> for EntityCommand {
    fn from(cmd: DeleteEntity) -> Self {
        EntityCommand::Delete(cmd)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInserted {
    #[serde(flatten)]
    pub model: EventModel,
    #[serde(default)]
    pub data: Data,
    pub otype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdated {
    #[serde(flatten)]
    pub model: EventModel,
    #[serde(default)]
    pub data: Data,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDeleted {
    #[serde(flatten)]
    pub model: EventModel,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The events an [`Entity`] emits, as the persisted `{kind, payload}`
/// envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum EntityEvent {
    EntityInserted(EntityInserted),
    EntityUpdated(EntityUpdated),
    EntityDeleted(EntityDeleted),
}

impl EntityEvent {
    fn model(&self) -> &EventModel {
        match self {
            EntityEvent::EntityInserted(e) => &e.model,
            EntityEvent::EntityUpdated(e) => &e.model,
            EntityEvent::EntityDeleted(e) => &e.model,
        }
    }
}

impl Event for EntityEvent {
    fn event_id(&self) -> &Id {
        &self.model().id
    }

    fn event_tenant_id(&self) -> &Id {
        &self.model().tenant_id
    }

    fn event_version(&self) -> Version {
        self.model().version
    }

    fn event_at(&self) -> Option<DateTime<Utc>> {
        self.model().at
    }
}

impl Entity {
    fn apply_insert(&self, cmd: &InsertEntity) -> Result<EntityEvent> {
        if cmd.otype.is_empty() {
            return Err(Error::new(Kind::Invalid).msg("missing type"));
        }

        let now = Utc::now();
        Ok(EntityEvent::EntityInserted(EntityInserted {
            model: EventModel {
                id: cmd.model.id.clone(),
                tenant_id: cmd.model.tenant_id.clone(),
                version: self.version + 1,
                at: Some(now),
            },
            data: cmd.data.clone(),
            otype: cmd.otype.clone(),
        }))
    }

    fn apply_update(&self, cmd: &UpdateEntity) -> Result<EntityEvent> {
        let now = Utc::now();
        Ok(EntityEvent::EntityUpdated(EntityUpdated {
            model: EventModel {
                id: cmd.model.id.clone(),
                tenant_id: cmd.model.tenant_id.clone(),
                version: self.version + 1,
                at: Some(now),
            },
            data: cmd.data.clone(),
        }))
    }

    fn apply_delete(&self, cmd: &DeleteEntity) -> Result<EntityEvent> {
        let now = Utc::now();
        Ok(EntityEvent::EntityDeleted(EntityDeleted {
            model: EventModel {
                id: cmd.model.id.clone(),
                tenant_id: cmd.model.tenant_id.clone(),
                version: self.version + 1,
                at: Some(now),
            },
            deleted_at: Some(now),
        }))
    }
}

impl Aggregate for Entity {
    type Command = EntityCommand;
    type Event = EntityEvent;

    fn apply(&self, command: &EntityCommand) -> Result<Vec<EntityEvent>> {
        const OP: &str = "entity/Entity.apply";

        if command.command_id().is_empty() {
            return Err(Error::new(Kind::Internal).op(OP).msg("missing ID"));
        }

        if command.command_tenant_id().is_empty() {
            return Err(Error::new(Kind::Internal).op(OP).msg("missing tenant ID"));
        }

        let event = match command {
            EntityCommand::Insert(cmd) => self.apply_insert(cmd),
            EntityCommand::Update(cmd) => self.apply_update(cmd),
            EntityCommand::Delete(cmd) => self.apply_delete(cmd),
        }
        .map_err(|err| Error::new(Kind::Other).op(OP).wrap(err))?;

        Ok(vec![event])
    }

    fn on(&mut self, event: &EntityEvent) -> Result<()> {
        match event {
            EntityEvent::EntityInserted(v) => {
                self.data = v.data.clone();
                self.otype = v.otype.clone();
            }
            EntityEvent::EntityUpdated(v) => {
                self.data = v.data.clone();
            }
            EntityEvent::EntityDeleted(v) => {
                self.deleted_at = v.deleted_at;
            }
        }

        self.id = event.event_id().clone();
        self.tenant_id = event.event_tenant_id().clone();
        self.version = event.event_version();

        if self.version == 1 {
            self.created_at = event.event_at();
        }

        self.updated_at = event.event_at();

        Ok(())
    }
}

pub(crate) fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_time(
    m: &HashMap<String, String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match m.get(field) {
        Some(raw) => {
            let parsed = DateTime::parse_from_rfc3339(raw)
                .map_err(|e| Error::new(Kind::Internal).with(e))?;
            Ok(Some(parsed.with_timezone(&Utc)))
        }
        None => Ok(None),
    }
}

impl Entity {
    /// The entity as cache hash fields.
    pub fn to_hash(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();

        if let Some(created_at) = &self.created_at {
            m.insert("created_at".to_string(), format_time(created_at));
        }
        if let Some(deleted_at) = &self.deleted_at {
            m.insert("deleted_at".to_string(), format_time(deleted_at));
        }
        if let Some(updated_at) = &self.updated_at {
            m.insert("updated_at".to_string(), format_time(updated_at));
        }

        m.insert("id".to_string(), self.id.to_string());

        if !self.data.is_empty() {
            let raw = serde_json::to_string(&self.data).expect("data is valid JSON");
            m.insert("data".to_string(), raw);
        }

        m.insert("tenant_id".to_string(), self.tenant_id.to_string());
        m.insert("otype".to_string(), self.otype.clone());
        m.insert("version".to_string(), self.version.to_string());

        m
    }

    /// Rebuild an entity from cache hash fields.
    pub fn from_hash(m: &HashMap<String, String>) -> Result<Entity> {
        let data = match m.get("data") {
            Some(raw) => serde_json::from_str(raw)?,
            None => Data::new(),
        };

        let version = m
            .get("version")
            .ok_or_else(|| Error::new(Kind::Internal).msg("missing version field"))?
            .parse::<Version>()
            .map_err(|e| Error::new(Kind::Internal).with(e))?;

        Ok(Entity {
            created_at: parse_time(m, "created_at")?,
            deleted_at: parse_time(m, "deleted_at")?,
            id: Id::new(m.get("id").cloned().unwrap_or_default()),
            data,
            tenant_id: Id::new(m.get("tenant_id").cloned().unwrap_or_default()),
            otype: m.get("otype").cloned().unwrap_or_default(),
            updated_at: parse_time(m, "updated_at")?,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventstore::Aggregate as _;

    fn insert_cmd() -> EntityCommand {
        let mut data = Data::new();
        data.insert("n".into(), serde_json::json!("A"));
        EntityCommand::Insert(InsertEntity {
            model: CommandModel::new("u1", "t1"),
            data,
            otype: "user".into(),
        })
    }

    fn fold(entity: &mut Entity, events: &[EntityEvent]) {
        for event in events {
            entity.on(event).unwrap();
        }
    }

    #[test]
    fn insert_emits_version_one_and_sets_created_at() {
        let entity = Entity::default();
        let events = entity.apply(&insert_cmd()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_version(), 1);

        let mut entity = Entity::default();
        fold(&mut entity, &events);
        assert_eq!(entity.version, 1);
        assert_eq!(entity.otype, "user");
        assert_eq!(entity.data["n"], "A");
        assert!(entity.created_at.is_some());
        assert_eq!(entity.created_at, entity.updated_at);
        assert!(entity.deleted_at.is_none());
    }

    #[test]
    fn insert_requires_a_type() {
        let entity = Entity::default();
        let err = entity
            .apply(&EntityCommand::Insert(InsertEntity {
                model: CommandModel::new("u1", "t1"),
                data: Data::new(),
                otype: String::new(),
            }))
            .unwrap_err();
        assert!(Error::is(Kind::Invalid, &err));
    }

    #[test]
    fn update_replaces_data_and_keeps_created_at() {
        let mut entity = Entity::default();
        let inserted = entity.apply(&insert_cmd()).unwrap();
        fold(&mut entity, &inserted);
        let created_at = entity.created_at;

        let mut data = Data::new();
        data.insert("n".into(), serde_json::json!("B"));
        let updated = entity
            .apply(&EntityCommand::Update(UpdateEntity {
                model: CommandModel::new("u1", "t1"),
                data,
            }))
            .unwrap();
        fold(&mut entity, &updated);

        assert_eq!(entity.version, 2);
        assert_eq!(entity.data["n"], "B");
        assert_eq!(entity.created_at, created_at);
    }

    #[test]
    fn delete_sets_deleted_at_and_keeps_the_record() {
        let mut entity = Entity::default();
        let inserted = entity.apply(&insert_cmd()).unwrap();
        fold(&mut entity, &inserted);

        let deleted = entity
            .apply(&EntityCommand::Delete(DeleteEntity {
                model: CommandModel::new("u1", "t1"),
            }))
            .unwrap();
        fold(&mut entity, &deleted);

        assert_eq!(entity.version, 2);
        assert!(entity.deleted_at.is_some());
        assert_eq!(entity.otype, "user");
    }

    #[test]
    fn commands_require_id_and_tenant() {
        let entity = Entity::default();

        let err = entity
            .apply(&EntityCommand::Insert(InsertEntity {
                model: CommandModel::new("", "t1"),
                data: Data::new(),
                otype: "user".into(),
            }))
            .unwrap_err();
        assert!(Error::is(Kind::Internal, &err));
        assert!(err.to_string().contains("missing ID"));

        let err = entity
            .apply(&EntityCommand::Insert(InsertEntity {
                model: CommandModel::new("u1", ""),
                data: Data::new(),
                otype: "user".into(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("missing tenant ID"));
    }

    #[test]
    fn hash_round_trip_preserves_the_entity() {
        let mut entity = Entity::default();
        let inserted = entity.apply(&insert_cmd()).unwrap();
        fold(&mut entity, &inserted);

        let hash = entity.to_hash();
        assert_eq!(hash["id"], "u1");
        assert_eq!(hash["otype"], "user");
        assert_eq!(hash["version"], "1");

        let back = Entity::from_hash(&hash).unwrap();
        assert_eq!(back.id, entity.id);
        assert_eq!(back.otype, entity.otype);
        assert_eq!(back.version, entity.version);
        assert_eq!(back.data, entity.data);
    }

    #[test]
    fn from_hash_requires_a_version() {
        let err = Entity::from_hash(&HashMap::new()).unwrap_err();
        assert!(Error::is(Kind::Internal, &err));
    }
}
