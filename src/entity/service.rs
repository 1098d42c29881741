//! Entity service: cache-aside reads, write-behind mutations.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::{DeleteEntity, Entity, EntityCommand, EntityEvent, InsertEntity, UpdateEntity};
use crate::cache::{cache_key, Cache};
use crate::errors::{Error, Kind, Result};
use crate::eventstore::{Observer, Repository, Store};
use crate::model::{Command, Id};
use crate::worker::{default_queue_size, default_workers, Dispatcher, Job};

/// Collaborators of an [`EntityService`].
pub struct EntityServiceConfig {
    pub cache: Arc<dyn Cache>,
    pub cache_key_prefix: String,
    pub store: Arc<dyn Store>,
    pub observers: Vec<Observer<EntityEvent>>,
}

/// Serves entity reads through the cache and enqueues entity writes onto a
/// bounded worker pool.
///
/// Writes return once their job is enqueued; persistence and the cache
/// update happen asynchronously on a worker (write-behind). Callers that
/// need durable acknowledgement must read after writing.
#[derive(Clone)]
pub struct EntityService {
    cache: Arc<dyn Cache>,
    cache_prefix: String,
    entities: Arc<Repository<Entity>>,
    jobs: mpsc::Sender<Job>,
}

impl EntityService {
    /// Build the service and start its dispatcher. Must be called from
    /// within a tokio runtime.
    pub fn new(cfg: EntityServiceConfig) -> Self {
        let (jobs, queue) = mpsc::channel(default_queue_size());
        Dispatcher::new(queue, default_workers()).run();

        Self {
            cache: cfg.cache,
            cache_prefix: cfg.cache_key_prefix,
            entities: Arc::new(Repository::new(cfg.store, cfg.observers)),
            jobs,
        }
    }

    fn key(&self, id: &Id, tenant_id: &Id) -> String {
        cache_key(&self.cache_prefix, id, tenant_id)
    }

    async fn from_cache(&self, id: &Id, tenant_id: &Id) -> Result<Entity> {
        let key = self.key(id, tenant_id);

        let fields = self.cache.get_hash(&key).await?;
        if fields.is_empty() {
            return Err(Error::new(Kind::NotFound)
                .msg(format!("entity {key} not found in cache")));
        }

        Entity::from_hash(&fields).map_err(|err| {
            Error::new(Kind::Internal)
                .msg(format!("unable to parse cached entity {key}"))
                .wrap(err)
        })
    }

    async fn to_cache(&self, entity: &Entity) -> Result<()> {
        let key = self.key(&entity.id, &entity.tenant_id);
        self.cache.set_hash(&key, entity.to_hash()).await
    }

    async fn from_store(&self, id: &Id, tenant_id: &Id) -> Result<Entity> {
        self.entities.load(id, tenant_id).await
    }

    async fn apply_to_store(&self, command: &EntityCommand) -> Result<Entity> {
        self.entities.apply(command).await?;
        self.entities
            .load(command.command_id(), command.command_tenant_id())
            .await
    }

    /// Refresh the cache for an already-loaded entity.
    fn set_cache_job(&self, entity: Entity) -> Job {
        let service = self.clone();
        let key = self.key(&entity.id, &entity.tenant_id);
        Job::new(format!("set-entity-cache-{key}"), async move {
            service.to_cache(&entity).await
        })
    }

    /// Apply a command, then refresh the cache with the resulting state.
    fn apply_job(&self, action: &str, command: EntityCommand) -> Job {
        let service = self.clone();
        let key = self.key(command.command_id(), command.command_tenant_id());
        Job::new(format!("{action}-{key}"), async move {
            let entity = service.apply_to_store(&command).await?;
            service.to_cache(&entity).await
        })
    }

    async fn enqueue(&self, job: Job) -> Result<()> {
        self.jobs
            .send(job)
            .await
            .map_err(|e| Error::new(Kind::Internal).msg(format!("job queue closed: {e}")))
    }

    /// Fetch an entity: cache first, then the repository on a miss. A miss
    /// also enqueues a cache refresh so subsequent reads are served from the
    /// cache.
    pub async fn get(&self, id: &Id, tenant_id: &Id) -> Result<Entity> {
        const OP: &str = "entity/Service.get";
        info!(id = %id, tenant = %tenant_id, "get entity");

        if id.is_empty() {
            return Err(Error::new(Kind::Invalid).op(OP).msg("ID is required"));
        }

        if tenant_id.is_empty() {
            return Err(Error::new(Kind::Invalid)
                .op(OP)
                .msg("Tenant ID cannot be empty"));
        }

        match self.from_cache(id, tenant_id).await {
            Ok(entity) => return Ok(entity),
            Err(err) if !Error::is(Kind::NotFound, &err) => return Err(err),
            Err(_) => {}
        }

        // Cache miss
        let entity = self.from_store(id, tenant_id).await?;

        // Set-aside refresh; its outcome does not affect this read.
        if let Err(err) = self.enqueue(self.set_cache_job(entity.clone())).await {
            error!(id = %id, error = %err, "unable to enqueue cache refresh");
        }

        Ok(entity)
    }

    /// Accept an entity creation. Fails `Duplicate` when the entity already
    /// exists; otherwise the apply job is enqueued and
    /// persistence happens on a worker.
    pub async fn create(&self, command: InsertEntity) -> Result<()> {
        const OP: &str = "entity/Service.create";
        info!(id = %command.model.id, tenant = %command.model.tenant_id, otype = %command.otype, "create entity");

        match self.get(&command.model.id, &command.model.tenant_id).await {
            Ok(_) => {
                let key = self.key(&command.model.id, &command.model.tenant_id);
                Err(Error::new(Kind::Duplicate)
                    .op(OP)
                    .msg(format!("entity {key} already exists")))
            }
            Err(err) if !Error::is(Kind::NotFound, &err) => Err(err),
            Err(_) => self.enqueue(self.apply_job("create", command.into())).await,
        }
    }

    /// Accept an entity update. Fails `NotFound` when absent.
    pub async fn update(&self, command: UpdateEntity) -> Result<()> {
        const OP: &str = "entity/Service.update";
        info!(id = %command.model.id, tenant = %command.model.tenant_id, "update entity");

        self.get(&command.model.id, &command.model.tenant_id)
            .await
            .map_err(|err| Error::new(Kind::Other).op(OP).wrap(err))?;

        self.enqueue(self.apply_job("update", command.into())).await
    }

    /// Accept an entity deletion. Fails `NotFound` when absent.
    pub async fn delete(&self, command: DeleteEntity) -> Result<()> {
        const OP: &str = "entity/Service.delete";
        info!(id = %command.model.id, tenant = %command.model.tenant_id, "delete entity");

        self.get(&command.model.id, &command.model.tenant_id)
            .await
            .map_err(|err| Error::new(Kind::Other).op(OP).wrap(err))?;

        self.enqueue(self.apply_job("delete", command.into())).await
    }
}
