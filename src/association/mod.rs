//! Association aggregate: a typed, directed edge between two entities.

mod service;

pub use service::{AssociationService, AssociationServiceConfig};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{format_time, parse_time};
use crate::errors::{Error, Kind, Result};
use crate::eventstore::Aggregate;
use crate::model::{Command, CommandModel, Data, Event, EventModel, Id, Version};

/// Derived association id: `{in}:{atype}:{out}`.
///
/// The format is a contract; changing it breaks existing data. Endpoint ids
/// should avoid the `:` separator.
pub fn association_id(in_id: &Id, atype: &str, out_id: &Id) -> Id {
    Id::new(format!("{in_id}:{atype}:{out_id}"))
}

/// Id of the `(source, type)` group an association belongs to:
/// `{in}:{atype}`.
pub fn association_type_id(in_id: &Id, atype: &str) -> Id {
    Id::new(format!("{in_id}:{atype}"))
}

/// A typed, directed edge. `in`, `out`, and `atype` are fixed at insert and
/// define the composite id; deletes tombstone the association.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Data::is_empty")]
    pub data: Data,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub id: Id,
    #[serde(rename = "in")]
    pub in_id: Id,
    #[serde(rename = "out")]
    pub out_id: Id,
    pub tenant_id: Id,
    #[serde(rename = "atype")]
    pub atype: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

/// Create a new association. The id is derived, not supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertAssociation {
    #[serde(flatten)]
    pub model: CommandModel,
    #[serde(default)]
    pub data: Data,
    #[serde(rename = "in")]
    pub in_id: Id,
    #[serde(rename = "out")]
    pub out_id: Id,
    #[serde(rename = "atype")]
    pub atype: String,
}

/// Replace an association's payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAssociation {
    #[serde(flatten)]
    pub model: CommandModel,
    #[serde(default)]
    pub data: Data,
}

/// Tombstone an association.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteAssociation {
    #[serde(flatten)]
    pub model: CommandModel,
}

/// The commands an [`Association`] accepts.
#[derive(Debug, Clone)]
pub enum AssociationCommand {
    Insert(InsertAssociation),
    Update(UpdateAssociation),
    Delete(DeleteAssociation),
}

impl AssociationCommand {
    fn model(&self) -> &CommandModel {
        match self {
            AssociationCommand::Insert(cmd) => &cmd.model,
            AssociationCommand::Update(cmd) => &cmd.model,
            AssociationCommand::Delete(cmd) => &cmd.model,
        }
    }
}

impl Command for AssociationCommand {
    fn command_id(&self) -> &Id {
        &self.model().id
    }

    fn command_tenant_id(&self) -> &Id {
        &self.model().tenant_id
    }
}

impl From<InsertAssociation> for AssociationCommand {
    fn from(cmd: InsertAssociation) -> Self {
        AssociationCommand::Insert(cmd)
    }
}

impl From<UpdateAssociation> for AssociationCommand {
    fn from(cmd: UpdateAssociation) -> Self {
        AssociationCommand::Update(cmd)
    }
}

impl From<DeleteAssociation> for AssociationCommand {
    fn from(cmd: DeleteAssociation) -> Self {
        AssociationCommand::Delete(cmd)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationInserted {
    #[serde(flatten)]
    pub model: EventModel,
    #[serde(default)]
    pub data: Data,
    #[serde(rename = "in")]
    pub in_id: Id,
    #[serde(rename = "out")]
    pub out_id: Id,
    #[serde(rename = "atype")]
    pub atype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationUpdated {
    #[serde(flatten)]
    pub model: EventModel,
    #[serde(default)]
    pub data: Data,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationDeleted {
    #[serde(flatten)]
    pub model: EventModel,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The events an [`Association`] emits, as the persisted `{kind, payload}`
/// envelope. `in`/`out`/`atype` travel only in `AssociationInserted`;
/// updates never re-emit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum AssociationEvent {
    AssociationInserted(AssociationInserted),
    AssociationUpdated(AssociationUpdated),
    AssociationDeleted(AssociationDeleted),
}

impl AssociationEvent {
    fn model(&self) -> &EventModel {
        match self {
            AssociationEvent::AssociationInserted(e) => &e.model,
            AssociationEvent::AssociationUpdated(e) => &e.model,
            AssociationEvent::AssociationDeleted(e) => &e.model,
        }
    }
}

impl Event for AssociationEvent {
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

impl Association {
    fn apply_insert(&self, cmd: &InsertAssociation) -> Result<AssociationEvent> {
        if cmd.in_id.is_empty() {
            return Err(Error::new(Kind::Invalid).msg("missing input ID"));
        }

        if cmd.out_id.is_empty() {
            return Err(Error::new(Kind::Invalid).msg("missing output ID"));
        }

        if cmd.atype.is_empty() {
            return Err(Error::new(Kind::Invalid).msg("missing type"));
        }

        let now = Utc::now();
        Ok(AssociationEvent::AssociationInserted(AssociationInserted {
            model: EventModel {
                id: cmd.model.id.clone(),
                tenant_id: cmd.model.tenant_id.clone(),
                version: self.version + 1,
                at: Some(now),
            },
            data: cmd.data.clone(),
            in_id: cmd.in_id.clone(),
            out_id: cmd.out_id.clone(),
            atype: cmd.atype.clone(),
        }))
    }

    fn apply_update(&self, cmd: &UpdateAssociation) -> Result<AssociationEvent> {
        let now = Utc::now();
        Ok(AssociationEvent::AssociationUpdated(AssociationUpdated {
            model: EventModel {
                id: cmd.model.id.clone(),
                tenant_id: cmd.model.tenant_id.clone(),
                version: self.version + 1,
                at: Some(now),
            },
            data: cmd.data.clone(),
        }))
    }

    fn apply_delete(&self, cmd: &DeleteAssociation) -> Result<AssociationEvent> {
        let now = Utc::now();
        Ok(AssociationEvent::AssociationDeleted(AssociationDeleted {
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

impl Aggregate for Association {
    type Command = AssociationCommand;
    type Event = AssociationEvent;

    fn apply(&self, command: &AssociationCommand) -> Result<Vec<AssociationEvent>> {
        const OP: &str = "association/Association.apply";

        if command.command_id().is_empty() {
            return Err(Error::new(Kind::Internal).op(OP).msg("missing ID"));
        }

        if command.command_tenant_id().is_empty() {
            return Err(Error::new(Kind::Internal).op(OP).msg("missing tenant ID"));
        }

        let event = match command {
            AssociationCommand::Insert(cmd) => self.apply_insert(cmd),
            AssociationCommand::Update(cmd) => self.apply_update(cmd),
            AssociationCommand::Delete(cmd) => self.apply_delete(cmd),
        }
        .map_err(|err| Error::new(Kind::Other).op(OP).wrap(err))?;

        Ok(vec![event])
    }

    fn on(&mut self, event: &AssociationEvent) -> Result<()> {
        match event {
            AssociationEvent::AssociationInserted(v) => {
                self.in_id = v.in_id.clone();
                self.out_id = v.out_id.clone();
                self.data = v.data.clone();
                self.atype = v.atype.clone();
            }
            AssociationEvent::AssociationUpdated(v) => {
                self.data = v.data.clone();
            }
            AssociationEvent::AssociationDeleted(v) => {
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

impl Association {
    /// The association as cache hash fields.
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
        m.insert("in".to_string(), self.in_id.to_string());
        m.insert("out".to_string(), self.out_id.to_string());

        if !self.data.is_empty() {
            let raw = serde_json::to_string(&self.data).expect("data is valid JSON");
            m.insert("data".to_string(), raw);
        }

        m.insert("tenant_id".to_string(), self.tenant_id.to_string());
        m.insert("atype".to_string(), self.atype.clone());
        m.insert("version".to_string(), self.version.to_string());

        m
    }

    /// Rebuild an association from cache hash fields.
    pub fn from_hash(m: &HashMap<String, String>) -> Result<Association> {
        let data = match m.get("data") {
            Some(raw) => serde_json::from_str(raw)?,
            None => Data::new(),
        };

        let version = m
            .get("version")
            .ok_or_else(|| Error::new(Kind::Internal).msg("missing version field"))?
            .parse::<Version>()
            .map_err(|e| Error::new(Kind::Internal).with(e))?;

        Ok(Association {
            created_at: parse_time(m, "created_at")?,
            data,
            deleted_at: parse_time(m, "deleted_at")?,
            id: Id::new(m.get("id").cloned().unwrap_or_default()),
            in_id: Id::new(m.get("in").cloned().unwrap_or_default()),
            out_id: Id::new(m.get("out").cloned().unwrap_or_default()),
            tenant_id: Id::new(m.get("tenant_id").cloned().unwrap_or_default()),
            atype: m.get("atype").cloned().unwrap_or_default(),
            updated_at: parse_time(m, "updated_at")?,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventstore::Aggregate as _;

    fn insert_cmd() -> AssociationCommand {
        AssociationCommand::Insert(InsertAssociation {
            model: CommandModel::new("u1:likes:p1", "t1"),
            data: Data::new(),
            in_id: Id::from("u1"),
            out_id: Id::from("p1"),
            atype: "likes".into(),
        })
    }

    fn fold(assoc: &mut Association, events: &[AssociationEvent]) {
        for event in events {
            assoc.on(event).unwrap();
        }
    }

    #[test]
    fn id_is_derived_from_endpoints_and_type() {
        let id = association_id(&Id::from("u1"), "likes", &Id::from("p1"));
        assert_eq!(id, Id::from("u1:likes:p1"));
        assert_eq!(
            association_type_id(&Id::from("u1"), "likes"),
            Id::from("u1:likes")
        );
    }

    #[test]
    fn insert_fixes_endpoints_and_type() {
        let mut assoc = Association::default();
        let events = assoc.apply(&insert_cmd()).unwrap();
        fold(&mut assoc, &events);

        assert_eq!(assoc.version, 1);
        assert_eq!(assoc.in_id, Id::from("u1"));
        assert_eq!(assoc.out_id, Id::from("p1"));
        assert_eq!(assoc.atype, "likes");
        assert!(assoc.created_at.is_some());
    }

    #[test]
    fn insert_requires_endpoints_and_type() {
        let assoc = Association::default();

        for (in_id, out_id, atype) in [
            ("", "p1", "likes"),
            ("u1", "", "likes"),
            ("u1", "p1", ""),
        ] {
            let err = assoc
                .apply(&AssociationCommand::Insert(InsertAssociation {
                    model: CommandModel::new("x", "t1"),
                    data: Data::new(),
                    in_id: Id::from(in_id),
                    out_id: Id::from(out_id),
                    atype: atype.into(),
                }))
                .unwrap_err();
            assert!(Error::is(Kind::Invalid, &err));
        }
    }

    #[test]
    fn update_keeps_endpoints_and_type() {
        let mut assoc = Association::default();
        let inserted = assoc.apply(&insert_cmd()).unwrap();
        fold(&mut assoc, &inserted);

        let mut data = Data::new();
        data.insert("w".into(), serde_json::json!(2));
        let updated = assoc
            .apply(&AssociationCommand::Update(UpdateAssociation {
                model: CommandModel::new("u1:likes:p1", "t1"),
                data,
            }))
            .unwrap();
        fold(&mut assoc, &updated);

        assert_eq!(assoc.version, 2);
        assert_eq!(assoc.atype, "likes");
        assert_eq!(assoc.in_id, Id::from("u1"));
        assert_eq!(assoc.data["w"], 2);
    }

    #[test]
    fn delete_tombstones_the_association() {
        let mut assoc = Association::default();
        let inserted = assoc.apply(&insert_cmd()).unwrap();
        fold(&mut assoc, &inserted);

        let deleted = assoc
            .apply(&AssociationCommand::Delete(DeleteAssociation {
                model: CommandModel::new("u1:likes:p1", "t1"),
            }))
            .unwrap();
        fold(&mut assoc, &deleted);

        assert_eq!(assoc.version, 2);
        assert!(assoc.deleted_at.is_some());
    }

    #[test]
    fn hash_round_trip_preserves_the_association() {
        let mut assoc = Association::default();
        let inserted = assoc.apply(&insert_cmd()).unwrap();
        fold(&mut assoc, &inserted);

        let hash = assoc.to_hash();
        assert_eq!(hash["id"], "u1:likes:p1");
        assert_eq!(hash["in"], "u1");
        assert_eq!(hash["out"], "p1");
        assert_eq!(hash["atype"], "likes");

        let back = Association::from_hash(&hash).unwrap();
        assert_eq!(back.id, assoc.id);
        assert_eq!(back.in_id, assoc.in_id);
        assert_eq!(back.out_id, assoc.out_id);
        assert_eq!(back.atype, assoc.atype);
        assert_eq!(back.version, assoc.version);
    }
}
