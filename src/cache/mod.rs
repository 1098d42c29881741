//! Cache contract used by the services.
//!
//! The cache stores one hash per aggregate under `{prefix}:{tenant}:{id}`,
//! and for associations additionally maintains a sorted set per
//! `(source, type)` whose members are association cache keys scored by
//! `updated_at` Unix time.

mod memory;
mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::Result;
use crate::model::Id;

/// Cache key for an aggregate: `{prefix}:{tenant}:{id}`, with the prefix
/// omitted when empty.
pub fn cache_key(prefix: &str, id: &Id, tenant_id: &Id) -> String {
    if prefix.is_empty() {
        return format!("{tenant_id}:{id}");
    }

    format!("{prefix}:{tenant_id}:{id}")
}

/// Operations the services need from the primary cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// All fields of the hash at `key`; an empty map on miss.
    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Overwrite the fields of the hash at `key`.
    async fn set_hash(&self, key: &str, fields: HashMap<String, String>) -> Result<()>;

    /// Insert-or-update `member` in the sorted set at `key`.
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Remove `key`.
    async fn del(&self, key: &str) -> Result<()>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Release client-side resources.
    async fn shutdown(&self) -> Result<()>;
}
