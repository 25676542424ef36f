//! Result cache with lazy time-to-live expiry
//!
//! Route variants are keyed by rounded endpoints, tower sets by rounded
//! bounding box. Entries older than the TTL read as absent and are simply
//! overwritten by the next `put`; nothing sweeps them in the background.
//! An optional fjall-backed layer keeps entries across restarts.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use fjall::Keyspace;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::task;
use tracing::{debug, warn};

use crate::models::{RouteVariants, TowerRecord};

/// A cached value and when it was computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    /// Unix timestamp (seconds)
    pub created_at_epoch: i64,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: i64, ttl: Duration) -> bool {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(self.created_at_epoch) <= ttl
    }
}

type Layer<V> = Mutex<HashMap<String, CacheEntry<V>>>;

pub struct ResultCache {
    ttl: Duration,
    routes: Layer<RouteVariants>,
    towers: Layer<Vec<TowerRecord>>,
    persistent: Option<PersistentCache>,
}

impl ResultCache {
    /// Memory-only cache
    #[must_use]
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            ttl,
            routes: Mutex::default(),
            towers: Mutex::default(),
            persistent: None,
        }
    }

    /// Memory cache backed by an on-disk store at `path`
    pub fn with_persistence(path: impl AsRef<Path>, ttl: Duration) -> Result<Self> {
        Ok(Self {
            persistent: Some(PersistentCache::open(path)?),
            ..Self::in_memory(ttl)
        })
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh route variants for `key`, if any
    pub async fn get(&self, key: &str) -> Option<CacheEntry<RouteVariants>> {
        self.lookup(&self.routes, key, Utc::now().timestamp()).await
    }

    /// Store a complete set of variants under `key`
    pub async fn put(&self, key: &str, results: RouteVariants) {
        self.store(&self.routes, key, results, Utc::now().timestamp())
            .await;
    }

    /// Fresh tower set for a bounding-box key, if any
    pub async fn get_towers(&self, key: &str) -> Option<Vec<TowerRecord>> {
        self.lookup(&self.towers, key, Utc::now().timestamp())
            .await
            .map(|entry| entry.value)
    }

    pub async fn put_towers(&self, key: &str, towers: Vec<TowerRecord>) {
        self.store(&self.towers, key, towers, Utc::now().timestamp())
            .await;
    }

    async fn lookup<V>(&self, layer: &Layer<V>, key: &str, now: i64) -> Option<CacheEntry<V>>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Debug + 'static,
    {
        let in_memory = layer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();

        let entry = match in_memory {
            Some(entry) => Some(entry),
            None => self.lookup_persistent(layer, key).await,
        };

        match entry {
            Some(entry) if entry.is_fresh(now, self.ttl) => {
                debug!("Cache hit for {}", key);
                Some(entry)
            }
            Some(_) => {
                debug!("Cache entry for {} is stale", key);
                None
            }
            None => {
                debug!("Cache miss for {}", key);
                None
            }
        }
    }

    async fn lookup_persistent<V>(&self, layer: &Layer<V>, key: &str) -> Option<CacheEntry<V>>
    where
        V: Clone + DeserializeOwned + Send + 'static,
    {
        let persistent = self.persistent.as_ref()?;
        match persistent.get::<CacheEntry<V>>(key).await {
            Ok(Some(entry)) => {
                layer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key.to_string(), entry.clone());
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Persistent cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store<V>(&self, layer: &Layer<V>, key: &str, value: V, now: i64)
    where
        V: Clone + Serialize + Send + Debug + 'static,
    {
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            created_at_epoch: now,
        };

        if let Some(persistent) = &self.persistent {
            if let Err(e) = persistent.put(key, entry.clone()).await {
                warn!("Persistent cache write failed for {}: {}", key, e);
            }
        }

        // Single insert so readers never observe a half-written entry
        layer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
    }
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
    Ok(store.get(key)?.map(|v| v.to_vec()))
}

/// On-disk key/value store for cache entries
pub struct PersistentCache {
    store: Keyspace,
}

impl PersistentCache {
    fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = fjall::Database::builder(&path).open()?;
        let items = db.keyspace("results", fjall::KeyspaceCreateOptions::default)?;
        Ok(PersistentCache { store: items })
    }

    #[tracing::instrument(name = "put_persistent_cache", level = "debug", skip(self, value))]
    async fn put<T: Serialize + Send + 'static>(&self, key: &str, value: T) -> Result<()> {
        let store = self.store.clone();
        let key = key.as_bytes().to_vec();
        let bytes = postcard::to_stdvec(&value)?;

        task::spawn_blocking(move || store.insert(key, bytes)).await??;
        Ok(())
    }

    #[tracing::instrument(name = "query_persistent_cache", level = "debug", skip(self))]
    async fn get<T: DeserializeOwned + Send + 'static>(&self, key: &str) -> Result<Option<T>> {
        let store = self.store.clone();
        let key_bytes = key.as_bytes().to_vec();

        let maybe_bytes = task::spawn_blocking(move || get_from_store(store, key_bytes)).await??;

        match maybe_bytes {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tower::tower_at;
    use crate::models::{RouteGeometry, RouteResult, RouteType};

    fn variants() -> RouteVariants {
        let mut variants = RouteVariants::default();
        for route_type in RouteType::ALL {
            variants.set(RouteResult {
                route_type,
                distance_meters: 12_345.6,
                duration_seconds: 789.1,
                signal_score: 3.141_592,
                tower_count: 0,
                towers: vec![],
                geometry: RouteGeometry::from_lng_lat(&[[8.0, 47.0], [8.1, 47.1]]).unwrap(),
            });
        }
        variants
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = ResultCache::in_memory(Duration::from_secs(1800));
        assert!(cache.get("route:a").await.is_none());

        cache.put("route:a", variants()).await;
        let entry = cache.get("route:a").await.unwrap();
        assert_eq!(entry.value, variants());
        assert_eq!(entry.key, "route:a");
    }

    #[tokio::test]
    async fn test_stale_entry_reads_as_absent() {
        let cache = ResultCache::in_memory(Duration::from_secs(1800));
        let created = Utc::now().timestamp();
        cache.store(&cache.routes, "route:a", variants(), created).await;

        assert!(cache.lookup(&cache.routes, "route:a", created + 1800).await.is_some());
        assert!(cache.lookup(&cache.routes, "route:a", created + 1801).await.is_none());
        // Stale entries are ignored, not deleted
        assert_eq!(cache.routes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tower_layer_is_separate() {
        let cache = ResultCache::in_memory(Duration::from_secs(60));
        cache.put_towers("towers:x", vec![tower_at(47.0, 8.0, -80)]).await;
        assert_eq!(cache.get_towers("towers:x").await.unwrap().len(), 1);
        assert!(cache.get("towers:x").await.is_none());
    }

    #[tokio::test]
    async fn test_persistent_layer_backs_memory() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = ResultCache::with_persistence(dir.path(), Duration::from_secs(1800)).unwrap();
        cache.put("route:persisted", variants()).await;

        cache.routes.lock().unwrap().clear();
        let entry = cache.get("route:persisted").await.unwrap();
        assert_eq!(entry.value, variants());
        // Promoted back into memory
        assert!(cache.routes.lock().unwrap().contains_key("route:persisted"));
    }
}
