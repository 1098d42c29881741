//! Event contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Id, Version};

/// A change that happened to an aggregate.
///
/// `(event_id, tenant_id, version)` uniquely identifies an event.
pub trait Event {
    /// The id of the aggregate the event belongs to.
    fn event_id(&self) -> &Id;

    /// The tenant that owns the aggregate.
    fn event_tenant_id(&self) -> &Id;

    /// The incremental version of the event within the aggregate's history.
    fn event_version(&self) -> Version;

    /// When the event was created.
    fn event_at(&self) -> Option<DateTime<Utc>>;
}

/// Embeddable base for event types. Flattened into the event payload so the
/// serialized form carries `id`, `tenant_id`, `version`, and `at` alongside
/// the event's own fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventModel {
    /// Aggregate id.
    pub id: Id,

    /// Owner of the aggregate.
    pub tenant_id: Id,

    /// Incremental version of the event.
    pub version: Version,

    /// Creation time of the event.
    pub at: Option<DateTime<Utc>>,
}

impl Event for EventModel {
    fn event_id(&self) -> &Id {
        &self.id
    }

    fn event_tenant_id(&self) -> &Id {
        &self.tenant_id
    }

    fn event_version(&self) -> Version {
        self.version
    }

    fn event_at(&self) -> Option<DateTime<Utc>> {
        self.at
    }
}
