//! Bounded worker pool.
//!
//! Services push [`Job`]s into a bounded queue; the [`Dispatcher`] hands
//! each job to the next idle worker. Workers run jobs serially and log
//! failures. A job's outcome is never returned to the enqueuer, which is
//! what makes the services' writes write-behind. There is no ordering
//! guarantee between jobs on different workers; per-aggregate ordering is
//! enforced downstream by the event store's version check.

use std::thread;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::errors::Result;

/// Number of workers a service runs by default: the logical CPU count.
pub fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

/// Default capacity of a service's job queue. Enqueues block when the queue
/// is full, applying backpressure to the HTTP layer.
pub fn default_queue_size() -> usize {
    default_workers() * 4
}

/// A named unit of asynchronous work.
pub struct Job {
    name: String,
    task: BoxFuture<'static, Result<()>>,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        task: impl std::future::Future<Output = Result<()>> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            task: Box::pin(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One worker owning a single-slot job channel. The worker re-publishes its
/// sender to the shared pool before every task, so the dispatcher only ever
/// hands a job to an idle worker.
struct Worker {
    id: usize,
    pool: mpsc::Sender<mpsc::Sender<Job>>,
}

impl Worker {
    fn start(self) {
        tokio::spawn(async move {
            let (slot, mut jobs) = mpsc::channel::<Job>(1);
            loop {
                if self.pool.send(slot.clone()).await.is_err() {
                    break;
                }
                match jobs.recv().await {
                    Some(job) => {
                        debug!(worker = self.id, job = %job.name, "starting job");
                        if let Err(err) = job.task.await {
                            error!(worker = self.id, job = %job.name, error = %err, "job failed");
                        }
                    }
                    None => break,
                }
            }
            info!(worker = self.id, "worker stopped");
        });
    }
}

/// Feeds jobs from a shared bounded queue to a pool of workers.
pub struct Dispatcher {
    job_queue: mpsc::Receiver<Job>,
    max_workers: usize,
}

impl Dispatcher {
    pub fn new(job_queue: mpsc::Receiver<Job>, max_workers: usize) -> Self {
        Self {
            job_queue,
            max_workers,
        }
    }

    /// Spawn the workers and the dispatch loop. Workers terminate with the
    /// process; jobs carry no cancellation.
    pub fn run(self) {
        let (pool_tx, mut pool_rx) = mpsc::channel(self.max_workers);

        for id in 1..=self.max_workers {
            Worker {
                id,
                pool: pool_tx.clone(),
            }
            .start();
        }

        let mut queue = self.job_queue;
        tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                debug!(job = %job.name, "job dequeued");
                match pool_rx.recv().await {
                    Some(idle) => {
                        let _ = idle.send(job).await;
                    }
                    None => break,
                }
            }
        });
    }
}
