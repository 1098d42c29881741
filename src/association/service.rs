//! Association service: cache-aside reads, write-behind mutations, and the
//! source-type index.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::{
    association_id, association_type_id, Association, AssociationCommand, AssociationEvent,
    DeleteAssociation, InsertAssociation, UpdateAssociation,
};
use crate::cache::{cache_key, Cache};
use crate::errors::{Error, Kind, Result};
use crate::eventstore::{Observer, Repository, Store};
use crate::model::{Command, Id};
use crate::worker::{default_queue_size, default_workers, Dispatcher, Job};

/// Collaborators of an [`AssociationService`].
pub struct AssociationServiceConfig {
    pub cache: Arc<dyn Cache>,
    pub cache_key_prefix: String,
    pub store: Arc<dyn Store>,
    pub observers: Vec<Observer<AssociationEvent>>,
}

/// Serves association reads through the cache and enqueues association
/// writes onto a bounded worker pool.
///
/// Beyond the primary hash, every cache write indexes the association in the
/// `{prefix}:{tenant}:{in}:{atype}` sorted set, scored by `updated_at` Unix
/// time. That index is what lets a reader enumerate the edges of one type
/// out of one node, most recent first.
#[derive(Clone)]
pub struct AssociationService {
    associations: Arc<Repository<Association>>,
    cache: Arc<dyn Cache>,
    cache_prefix: String,
    jobs: mpsc::Sender<Job>,
}

impl AssociationService {
    /// Build the service and start its dispatcher. Must be called from
    /// within a tokio runtime.
    pub fn new(cfg: AssociationServiceConfig) -> Self {
        let (jobs, queue) = mpsc::channel(default_queue_size());
        Dispatcher::new(queue, default_workers()).run();

        Self {
            associations: Arc::new(Repository::new(cfg.store, cfg.observers)),
            cache: cfg.cache,
            cache_prefix: cfg.cache_key_prefix,
            jobs,
        }
    }

    fn key(&self, id: &Id, tenant_id: &Id) -> String {
        cache_key(&self.cache_prefix, id, tenant_id)
    }

    async fn from_cache(&self, id: &Id, tenant_id: &Id) -> Result<Association> {
        let key = self.key(id, tenant_id);

        let fields = self.cache.get_hash(&key).await?;
        if fields.is_empty() {
            return Err(Error::new(Kind::NotFound)
                .msg(format!("association {key} not found in cache")));
        }

        Association::from_hash(&fields).map_err(|err| {
            Error::new(Kind::Internal)
                .msg(format!("unable to parse cached association {key}"))
                .wrap(err)
        })
    }

    async fn to_cache(&self, assoc: &Association) -> Result<()> {
        let assoc_key = self.key(&assoc.id, &assoc.tenant_id);
        self.cache.set_hash(&assoc_key, assoc.to_hash()).await?;

        let type_key = self.key(
            &association_type_id(&assoc.in_id, &assoc.atype),
            &assoc.tenant_id,
        );
        let score = assoc.updated_at.map_or(0, |t| t.timestamp()) as f64;
        self.cache.zadd(&type_key, &assoc_key, score).await
    }

    async fn from_store(&self, id: &Id, tenant_id: &Id) -> Result<Association> {
        self.associations.load(id, tenant_id).await
    }

    async fn apply_to_store(&self, command: &AssociationCommand) -> Result<Association> {
        self.associations.apply(command).await?;
        self.associations
            .load(command.command_id(), command.command_tenant_id())
            .await
    }

    fn set_cache_job(&self, assoc: Association) -> Job {
        let service = self.clone();
        let key = self.key(&assoc.id, &assoc.tenant_id);
        Job::new(format!("set-association-cache-{key}"), async move {
            service.to_cache(&assoc).await
        })
    }

    fn apply_job(&self, action: &str, command: AssociationCommand) -> Job {
        let service = self.clone();
        let key = self.key(command.command_id(), command.command_tenant_id());
        Job::new(format!("{action}-{key}"), async move {
            let assoc = service.apply_to_store(&command).await?;
            service.to_cache(&assoc).await
        })
    }

    async fn enqueue(&self, job: Job) -> Result<()> {
        self.jobs
            .send(job)
            .await
            .map_err(|e| Error::new(Kind::Internal).msg(format!("job queue closed: {e}")))
    }

    /// Fetch an association: cache first, then the repository on a miss,
    /// with a cache refresh enqueued on the way out.
    pub async fn get(&self, id: &Id, tenant_id: &Id) -> Result<Association> {
        const OP: &str = "association/Service.get";
        info!(id = %id, tenant = %tenant_id, "get association");

        if id.is_empty() {
            return Err(Error::new(Kind::Invalid).op(OP).msg("ID is required"));
        }

        if tenant_id.is_empty() {
            return Err(Error::new(Kind::Invalid)
                .op(OP)
                .msg("Tenant ID cannot be empty"));
        }

        match self.from_cache(id, tenant_id).await {
            Ok(assoc) => return Ok(assoc),
            Err(err) if !Error::is(Kind::NotFound, &err) => return Err(err),
            Err(_) => {}
        }

        // Cache miss
        let assoc = self.from_store(id, tenant_id).await?;

        // Set-aside refresh; its outcome does not affect this read.
        if let Err(err) = self.enqueue(self.set_cache_job(assoc.clone())).await {
            error!(id = %id, error = %err, "unable to enqueue cache refresh");
        }

        Ok(assoc)
    }

    /// Accept an association creation. The id is derived from
    /// `(in, atype, out)`, which makes creation idempotent in the sense that
    /// recreating the same edge fails `Duplicate` once the first creation
    /// has persisted.
    pub async fn create(&self, command: InsertAssociation) -> Result<()> {
        const OP: &str = "association/Service.create";
        info!(
            tenant = %command.model.tenant_id,
            in_id = %command.in_id,
            out_id = %command.out_id,
            atype = %command.atype,
            "create association"
        );

        let mut command = command;
        command.model.id = association_id(&command.in_id, &command.atype, &command.out_id);

        match self.get(&command.model.id, &command.model.tenant_id).await {
            Ok(_) => Err(Error::new(Kind::Duplicate).op(OP).msg(format!(
                "association {} already exists",
                command.model.id
            ))),
            Err(err) if !Error::is(Kind::NotFound, &err) => Err(err),
            Err(_) => self.enqueue(self.apply_job("create", command.into())).await,
        }
    }

    /// Accept an association update. Fails `NotFound` when absent.
    pub async fn update(&self, command: UpdateAssociation) -> Result<()> {
        const OP: &str = "association/Service.update";
        info!(id = %command.model.id, tenant = %command.model.tenant_id, "update association");

        self.get(&command.model.id, &command.model.tenant_id)
            .await
            .map_err(|err| Error::new(Kind::Other).op(OP).wrap(err))?;

        self.enqueue(self.apply_job("update", command.into())).await
    }

    /// Accept an association deletion. Fails `NotFound` when absent.
    pub async fn delete(&self, command: DeleteAssociation) -> Result<()> {
        const OP: &str = "association/Service.delete";
        info!(id = %command.model.id, tenant = %command.model.tenant_id, "delete association");

        self.get(&command.model.id, &command.model.tenant_id)
            .await
            .map_err(|err| Error::new(Kind::Other).op(OP).wrap(err))?;

        self.enqueue(self.apply_job("delete", command.into())).await
    }
}
