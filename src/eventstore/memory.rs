//! In-memory event store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{records_match, History, Record, Store};
use crate::errors::{Error, Kind, Result};
use crate::model::{Id, Version};

/// Event store holding all histories in process memory.
///
/// The default backend when no database is configured; also used throughout
/// the test suites. One lock guards the whole map.
#[derive(Default)]
pub struct MemoryStore {
    histories: Mutex<HashMap<(Id, Id), History>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(
        &self,
        aggregate_id: &Id,
        tenant_id: &Id,
        from_version: Version,
        to_version: Version,
    ) -> Result<History> {
        const OP: &str = "eventstore/MemoryStore.load";
        debug!(aggregate_id = %aggregate_id, tenant_id = %tenant_id, "load history");

        let histories = self.histories.lock().await;
        let records = histories
            .get(&(aggregate_id.clone(), tenant_id.clone()))
            .ok_or_else(|| Error::new(Kind::NotFound).op(OP).id(aggregate_id.clone()))?;

        let history: History = records
            .iter()
            .filter(|r| r.version >= from_version && (to_version == 0 || r.version <= to_version))
            .cloned()
            .collect();

        if history.is_empty() {
            return Err(Error::new(Kind::NotFound).op(OP).id(aggregate_id.clone()));
        }

        Ok(history)
    }

    async fn save(&self, aggregate_id: &Id, tenant_id: &Id, records: Vec<Record>) -> Result<()> {
        const OP: &str = "eventstore/MemoryStore.save";
        debug!(aggregate_id = %aggregate_id, tenant_id = %tenant_id, count = records.len(), "save records");

        if records.is_empty() {
            return Ok(());
        }

        let mut batch = records;
        batch.sort_by_key(|r| r.version);

        let mut histories = self.histories.lock().await;
        let history = histories
            .entry((aggregate_id.clone(), tenant_id.clone()))
            .or_default();

        let max_version = history.iter().map(|r| r.version).max().unwrap_or(0);
        if max_version >= batch[0].version {
            // Re-save of an already-persisted range: a byte-identical batch
            // is a no-op, anything else is a conflicting append.
            let from = batch[0].version;
            let to = batch[batch.len() - 1].version;
            let persisted: History = history
                .iter()
                .filter(|r| r.version >= from && r.version <= to)
                .cloned()
                .collect();

            if records_match(&batch, &persisted) {
                return Ok(());
            }

            return Err(Error::new(Kind::Internal)
                .op(OP)
                .id(aggregate_id.clone())
                .msg(format!(
                    "conflicting records of aggregate with aggregateID {aggregate_id} detected"
                )));
        }

        history.extend(batch);
        history.sort_by_key(|r| r.version);

        Ok(())
    }
}
