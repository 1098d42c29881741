//! In-memory cache.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Cache;
use crate::errors::Result;

#[derive(Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    sorted_sets: HashMap<String, HashMap<String, f64>>,
}

/// Cache holding everything in process memory.
///
/// Used by the test suites and as a fallback for single-process
/// deployments without a Redis instance.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The score of `member` in the sorted set at `key`, if present.
    pub async fn score(&self, key: &str, member: &str) -> Option<f64> {
        let inner = self.inner.lock().await;
        inner.sorted_sets.get(key)?.get(member).copied()
    }

    /// Members of the sorted set at `key`, ascending by score.
    pub async fn members(&self, key: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        let Some(set) = inner.sorted_sets.get(key) else {
            return Vec::new();
        };
        let mut members: Vec<(&String, &f64)> = set.iter().collect();
        members.sort_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)));
        members.into_iter().map(|(m, _)| m.clone()).collect()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_hash(&self, key: &str) -> Result<HashMap<String, String>> {
        let inner = self.inner.lock().await;
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn set_hash(&self, key: &str, fields: HashMap<String, String>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.hashes.insert(key.to_string(), fields);
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.hashes.remove(key);
        inner.sorted_sets.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.hashes.clear();
        inner.sorted_sets.clear();
        Ok(())
    }
}
