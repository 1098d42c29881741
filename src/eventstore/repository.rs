//! Aggregate repository: replay, apply, save, observer fan-out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{JsonSerializer, Store};
use crate::errors::{Error, Kind, Result};
use crate::model::{Command, Event, Id, Version};

/// A consistency boundary identified by `(id, tenant)`, whose state is the
/// left fold of its event history.
pub trait Aggregate: Default + Send + Sync + 'static {
    /// The commands this aggregate accepts.
    type Command: Command + Send + Sync;

    /// The events this aggregate emits and folds.
    type Event: Event + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Decide: validate a command against the current state and emit the
    /// resulting events. Emitting no events is a valid outcome.
    fn apply(&self, command: &Self::Command) -> Result<Vec<Self::Event>>;

    /// Fold a single event into the state.
    fn on(&mut self, event: &Self::Event) -> Result<()>;
}

/// Side-effectful event sink invoked after a successful apply. Observers
/// must be cheap and non-blocking; heavier consumers should forward to their
/// own queue.
pub type Observer<E> = Box<dyn Fn(&E) + Send + Sync>;

/// The primary abstraction for saving and loading events.
pub struct Repository<A: Aggregate> {
    store: Arc<dyn Store>,
    serializer: JsonSerializer<A::Event>,
    observers: Vec<Observer<A::Event>>,
}

impl<A: Aggregate> Repository<A> {
    pub fn new(store: Arc<dyn Store>, observers: Vec<Observer<A::Event>>) -> Self {
        Self {
            store,
            serializer: JsonSerializer::new(),
            observers,
        }
    }

    /// A fresh zero-valued aggregate.
    pub fn new_aggregate(&self) -> A {
        A::default()
    }

    /// Persist the events into the underlying store.
    pub async fn save(&self, tenant_id: &Id, events: &[A::Event]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let id = events[0].event_id().clone();
        let history = self.serializer.marshal_all(events)?;
        self.store.save(&id, tenant_id, history).await
    }

    /// Load the aggregate at its latest version.
    pub async fn load(&self, aggregate_id: &Id, tenant_id: &Id) -> Result<A> {
        let (aggregate, _) = self.load_version(aggregate_id, tenant_id, 0).await?;
        Ok(aggregate)
    }

    /// Load the aggregate as of the given version.
    pub async fn load_at_version(
        &self,
        aggregate_id: &Id,
        tenant_id: &Id,
        version: Version,
    ) -> Result<A> {
        let (aggregate, _) = self.load_version(aggregate_id, tenant_id, version).await?;
        Ok(aggregate)
    }

    /// Load the aggregate as of some point in time: replay stops before the
    /// first event strictly after `end`.
    pub async fn load_at_time(
        &self,
        aggregate_id: &Id,
        tenant_id: &Id,
        end: DateTime<Utc>,
    ) -> Result<A> {
        const OP: &str = "eventstore/Repository.load_at_time";

        let history = self.store.load(aggregate_id, tenant_id, 0, 0).await?;
        if history.is_empty() {
            return Err(Error::new(Kind::NotFound).op(OP).id(aggregate_id.clone()));
        }

        debug!(aggregate_id = %aggregate_id, count = history.len(), "loaded events");

        let mut aggregate = self.new_aggregate();
        for record in &history {
            let event = self.serializer.unmarshal(record)?;
            if event.event_at().is_some_and(|at| at > end) {
                break;
            }
            aggregate.on(&event)?;
        }

        Ok(aggregate)
    }

    /// Replay the aggregate's history up to `to_version` (0 for all) and
    /// return it with the version of the last applied event.
    async fn load_version(
        &self,
        aggregate_id: &Id,
        tenant_id: &Id,
        to_version: Version,
    ) -> Result<(A, Version)> {
        const OP: &str = "eventstore/Repository.load_version";

        let history = self
            .store
            .load(aggregate_id, tenant_id, 0, to_version)
            .await?;
        if history.is_empty() {
            return Err(Error::new(Kind::NotFound).op(OP).id(aggregate_id.clone()));
        }

        debug!(aggregate_id = %aggregate_id, count = history.len(), "loaded events");

        let mut aggregate = self.new_aggregate();
        let mut version = 0;
        for record in &history {
            let event = self.serializer.unmarshal(record)?;
            aggregate.on(&event)?;
            version = event.event_version();
        }

        Ok((aggregate, version))
    }

    /// Execute the command and return the current version of the aggregate.
    ///
    /// The aggregate is loaded (or started fresh when absent), asked to turn
    /// the command into events, and the events are saved and fanned out to
    /// the observers in registration order, once per event, in event order.
    /// A command that emits no events leaves the version unchanged.
    pub async fn apply(&self, command: &A::Command) -> Result<Version> {
        const OP: &str = "eventstore/Repository.apply";

        let id = command.command_id();
        if id.is_empty() {
            return Err(Error::new(Kind::Invalid).op(OP).msg("required ID"));
        }

        let tenant_id = command.command_tenant_id();
        if tenant_id.is_empty() {
            return Err(Error::new(Kind::Invalid).op(OP).msg("required tenant ID"));
        }

        let (aggregate, version) = match self.load_version(id, tenant_id, 0).await {
            Ok(loaded) => loaded,
            Err(err) if Error::is(Kind::NotFound, &err) => (self.new_aggregate(), 0),
            Err(err) => return Err(err),
        };

        let events = aggregate.apply(command)?;
        self.save(tenant_id, &events).await?;

        let version = match events.last() {
            Some(last) => last.event_version(),
            None => version,
        };

        for event in &events {
            for observer in &self.observers {
                observer(event);
            }
        }

        debug!(aggregate_id = %id, count = events.len(), "applied events");

        Ok(version)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}
