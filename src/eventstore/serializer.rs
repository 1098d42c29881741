//! Event serialization.
//!
//! Events are persisted as a tag-discriminated JSON envelope
//! `{"kind": ..., "payload": ...}`. Each aggregate declares its event set as
//! an adjacently-tagged serde enum, so the variant name is the kind tag and
//! the variant body is the payload; a `#[serde(rename)]` on a variant
//! overrides the tag. Decoding a kind that no variant binds fails with
//! `Internal`.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{History, Record};
use crate::errors::{Error, Kind, Result};
use crate::model::Event;

/// Converts between events and [`Record`]s via the JSON envelope.
pub struct JsonSerializer<E> {
    _events: PhantomData<fn() -> E>,
}

impl<E> JsonSerializer<E>
where
    E: Event + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self {
            _events: PhantomData,
        }
    }

    /// Convert an event into its persistent form.
    pub fn marshal(&self, event: &E) -> Result<Record> {
        const OP: &str = "eventstore/JsonSerializer.marshal";

        let data = serde_json::to_vec(event)
            .map_err(|e| Error::new(Kind::Internal).op(OP).with(e))?;

        Ok(Record {
            aggregate_id: event.event_id().clone(),
            tenant_id: event.event_tenant_id().clone(),
            version: event.event_version(),
            data,
            created_at: event.event_at().unwrap_or_else(chrono::Utc::now),
        })
    }

    /// Convert a persisted record back into an event. Fails with `Internal`
    /// when the envelope is malformed or its kind is unbound.
    pub fn unmarshal(&self, record: &Record) -> Result<E> {
        const OP: &str = "eventstore/JsonSerializer.unmarshal";

        serde_json::from_slice(&record.data).map_err(|e| {
            Error::new(Kind::Internal)
                .op(OP)
                .id(record.aggregate_id.clone())
                .with(e)
        })
    }

    /// Marshal a batch of events into a [`History`].
    pub fn marshal_all(&self, events: &[E]) -> Result<History> {
        let mut history = History::with_capacity(events.len());
        for event in events {
            history.push(self.marshal(event)?);
        }
        Ok(history)
    }
}

impl<E> Default for JsonSerializer<E>
where
    E: Event + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}
