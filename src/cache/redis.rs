//! Redis cache client.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use super::Cache;
use crate::errors::Result;

/// Cache backed by Redis.
///
/// The connection manager multiplexes one connection and reconnects on
/// failure; cloning it is cheap and is done once per operation.
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to the Redis instance at `url`
    /// (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(crate::errors::Error::from)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "connected to Redis");

        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(fields)
    }

    async fn set_hash(&self, key: &str, fields: HashMap<String, String>) -> Result<()> {
        let mut conn = self.conn.clone();
        let items: Vec<(String, String)> = fields.into_iter().collect();
        let _: () = conn.hset_multiple(key, &items).await?;
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        // The multiplexed connection closes when the last clone drops.
        debug!("redis cache shut down");
        Ok(())
    }
}
