//! Append-only event storage and the aggregate repository built on it.
//!
//! A [`Store`] persists serialized [`Record`]s per `(aggregate id, tenant
//! id)`. Two backends share identical semantics:
//! - [`MemoryStore`]: in-process map behind a lock
//! - [`PgStore`]: PostgreSQL `records` table with a unique
//!   `(aggregate_id, tenant_id, version)` index
//!
//! The [`Repository`] replays histories into aggregates and turns commands
//! into appended events.

mod memory;
mod postgres;
mod repository;
mod serializer;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repository::{Aggregate, Observer, Repository};
pub use serializer::JsonSerializer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::model::{Id, Version};

/// Serialized representation of an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Aggregate the event belongs to.
    pub aggregate_id: Id,

    /// Owner of the aggregate.
    pub tenant_id: Id,

    /// Version associated with the serialized event.
    pub version: Version,

    /// The event in serialized form.
    pub data: Vec<u8>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// The version-ordered records of one aggregate.
pub type History = Vec<Record>;

/// Append-only event persistence, keyed by `(aggregate id, tenant id)`.
///
/// Saving a batch whose versions collide with already-persisted records
/// succeeds as a no-op when the colliding range is byte-identical, and fails
/// with an `Internal` conflict when it diverges; retrying a successful save
/// is therefore always safe. Concurrent appends racing for the same version
/// are resolved by the backend's uniqueness guarantee: one wins, the losers
/// see the conflict error.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load the history of events between `from_version` and `to_version`
    /// inclusive, ascending by version. When `to_version` is 0, all events
    /// from `from_version` on are loaded. An empty history is `NotFound`.
    async fn load(
        &self,
        aggregate_id: &Id,
        tenant_id: &Id,
        from_version: Version,
        to_version: Version,
    ) -> Result<History>;

    /// Append the records to the aggregate's history. Empty input is a
    /// no-op.
    async fn save(&self, aggregate_id: &Id, tenant_id: &Id, records: Vec<Record>) -> Result<()>;
}

/// Whether a batch matches the persisted range it collides with.
///
/// Compares version and payload bytes; the persistence timestamp is assigned
/// by the store and plays no part in equality.
pub(crate) fn records_match(batch: &[Record], persisted: &[Record]) -> bool {
    batch.len() == persisted.len()
        && batch
            .iter()
            .zip(persisted)
            .all(|(b, p)| b.version == p.version && b.data == p.data)
}
