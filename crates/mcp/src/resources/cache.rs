// In-memory read cache for resource providers

use super::ResourceProvider;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use toolhost_core::{ResourceInfo, ToolhostResult};

/// Cached content for one URI
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content: Bytes,
    pub inserted_at: DateTime<Utc>,
}

/// URI-keyed content cache. Entries never expire; they live until `clear`
/// or the end of the process.
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, uri: &str) -> Option<Bytes> {
        self.entries
            .read()
            .await
            .get(uri)
            .map(|entry| entry.content.clone())
    }

    pub async fn entry(&self, uri: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(uri).cloned()
    }

    pub async fn insert(&self, uri: impl Into<String>, content: Bytes) {
        let entry = CacheEntry {
            content,
            inserted_at: Utc::now(),
        };
        self.entries.write().await.insert(uri.into(), entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Wraps a provider so each URI is fetched at most once.
/// Failed reads are not cached.
pub struct CachedProvider<P> {
    inner: P,
    cache: ResourceCache,
}

impl<P: ResourceProvider> CachedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: ResourceCache::new(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }
}

#[async_trait::async_trait]
impl<P: ResourceProvider> ResourceProvider for CachedProvider<P> {
    fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    async fn list_resources(&self) -> ToolhostResult<Vec<ResourceInfo>> {
        self.inner.list_resources().await
    }

    async fn get_resource_info(&self, uri: &str) -> ToolhostResult<ResourceInfo> {
        self.inner.get_resource_info(uri).await
    }

    async fn read_resource(&self, uri: &str) -> ToolhostResult<Bytes> {
        if let Some(content) = self.cache.get(uri).await {
            tracing::debug!(uri, "Resource cache hit");
            return Ok(content);
        }

        let content = self.inner.read_resource(uri).await?;
        self.cache.insert(uri, content.clone()).await;
        tracing::debug!(uri, bytes = content.len(), "Resource cached");

        Ok(content)
    }
}
