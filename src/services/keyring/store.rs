//! Persistence for keyring descriptors
//!
//! Each backend is stored as `{type, options}` JSON under an opaque id. The
//! Redis store keeps a set of ids next to one value per id and writes both
//! through atomic pipelines, so a crash never leaves an id without its
//! descriptor.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::WalletError;
use crate::models::{KeyringDescriptor, PrefixedStoreKeys};

#[async_trait]
pub trait DescriptorStore: Send + Sync {
    async fn save(&self, id: &str, descriptor: &KeyringDescriptor) -> Result<(), WalletError>;

    /// Every persisted descriptor, ordered by id.
    async fn load_all(&self) -> Result<Vec<(String, KeyringDescriptor)>, WalletError>;

    async fn remove(&self, id: &str) -> Result<(), WalletError>;
}

/// Redis-backed descriptor store
pub struct RedisDescriptorStore {
    redis: redis::Client,
    keys: PrefixedStoreKeys,
}

impl RedisDescriptorStore {
    /// Connect with the default "wallet-gate:" prefix
    pub async fn new(redis_url: &str) -> Result<Self, WalletError> {
        Self::with_prefix(redis_url, "wallet-gate:").await
    }

    /// Connect with a custom prefix, used to isolate parallel tests
    pub async fn with_prefix(redis_url: &str, prefix: &str) -> Result<Self, WalletError> {
        let redis = redis::Client::open(redis_url)
            .map_err(|e| WalletError::Storage(format!("Failed to connect to Redis: {e}")))?;

        let mut conn = redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| WalletError::Storage(format!("Failed to get Redis connection: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| WalletError::Storage(format!("Redis ping failed: {e}")))?;

        tracing::info!("Descriptor store connected to Redis with prefix '{}'", prefix);

        Ok(Self {
            redis,
            keys: PrefixedStoreKeys::new(prefix),
        })
    }

    async fn get_conn(&self) -> Result<redis::aio::MultiplexedConnection, WalletError> {
        self.redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| WalletError::Storage(format!("Redis connection failed: {e}")))
    }
}

#[async_trait]
impl DescriptorStore for RedisDescriptorStore {
    async fn save(&self, id: &str, descriptor: &KeyringDescriptor) -> Result<(), WalletError> {
        let mut conn = self.get_conn().await?;
        let json = serde_json::to_string(descriptor)
            .map_err(|e| WalletError::Storage(format!("Failed to serialize descriptor: {e}")))?;

        let _: () = redis::pipe()
            .atomic()
            .sadd(self.keys.keyring_ids(), id)
            .set(self.keys.keyring(id), json)
            .query_async(&mut conn)
            .await
            .map_err(|e| WalletError::Storage(format!("Failed to save keyring {id}: {e}")))?;

        tracing::info!("Saved {} keyring {}", descriptor.keyring_type.as_str(), id);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<(String, KeyringDescriptor)>, WalletError> {
        let mut conn = self.get_conn().await?;

        let mut ids: Vec<String> = conn
            .smembers(self.keys.keyring_ids())
            .await
            .map_err(|e| WalletError::Storage(format!("Failed to list keyrings: {e}")))?;
        ids.sort();

        let mut descriptors = Vec::with_capacity(ids.len());
        for id in ids {
            let json: Option<String> = conn
                .get(self.keys.keyring(&id))
                .await
                .map_err(|e| WalletError::Storage(format!("Failed to load keyring {id}: {e}")))?;
            let Some(json) = json else {
                tracing::warn!("Keyring {} listed without a descriptor, skipping", id);
                continue;
            };
            match serde_json::from_str(&json) {
                Ok(descriptor) => descriptors.push((id, descriptor)),
                Err(e) => tracing::error!("Corrupt descriptor for keyring {}: {}", id, e),
            }
        }
        Ok(descriptors)
    }

    async fn remove(&self, id: &str) -> Result<(), WalletError> {
        let mut conn = self.get_conn().await?;
        let _: () = redis::pipe()
            .atomic()
            .srem(self.keys.keyring_ids(), id)
            .del(self.keys.keyring(id))
            .query_async(&mut conn)
            .await
            .map_err(|e| WalletError::Storage(format!("Failed to remove keyring {id}: {e}")))?;

        tracing::info!("Removed keyring {}", id);
        Ok(())
    }
}

/// In-memory descriptor store for tests and redis-less deployments
#[derive(Debug, Clone, Default)]
pub struct MemoryDescriptorStore {
    descriptors: Arc<RwLock<HashMap<String, KeyringDescriptor>>>,
}

impl MemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DescriptorStore for MemoryDescriptorStore {
    async fn save(&self, id: &str, descriptor: &KeyringDescriptor) -> Result<(), WalletError> {
        self.descriptors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), descriptor.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<(String, KeyringDescriptor)>, WalletError> {
        let descriptors = self.descriptors.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = descriptors
            .iter()
            .map(|(id, d)| (id.clone(), d.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }

    async fn remove(&self, id: &str) -> Result<(), WalletError> {
        self.descriptors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        Ok(())
    }
}
