use super::ResourceProvider;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use toolhost_core::{ResourceInfo, ResourceUri, ToolhostError, ToolhostResult};

/// Routes URIs to the provider registered for their scheme
#[derive(Default, Clone)]
pub struct ResourceRegistry {
    providers: BTreeMap<String, Arc<dyn ResourceProvider>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one for the same scheme
    pub fn register(&mut self, provider: Arc<dyn ResourceProvider>) {
        let scheme = provider.scheme().to_ascii_lowercase();
        if self.providers.insert(scheme.clone(), provider).is_some() {
            tracing::warn!("Resource scheme {}:// registered twice, keeping the latest", scheme);
        }
    }

    pub fn schemes(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn provider_for(&self, uri: &str) -> ToolhostResult<&Arc<dyn ResourceProvider>> {
        let parsed = ResourceUri::parse(uri)?;
        self.providers
            .get(parsed.scheme())
            .ok_or_else(|| ToolhostError::unsupported_scheme(uri))
    }

    /// Resources from every provider, in scheme order. A provider that fails
    /// to list is logged and skipped.
    pub async fn list_resources(&self) -> Vec<ResourceInfo> {
        let mut resources = Vec::new();
        for (scheme, provider) in &self.providers {
            match provider.list_resources().await {
                Ok(mut listed) => resources.append(&mut listed),
                Err(e) => tracing::warn!("Failed to list {}:// resources: {}", scheme, e),
            }
        }
        resources
    }

    pub async fn get_resource_info(&self, uri: &str) -> ToolhostResult<ResourceInfo> {
        self.provider_for(uri)?.get_resource_info(uri).await
    }

    pub async fn read_resource(&self, uri: &str) -> ToolhostResult<Bytes> {
        self.provider_for(uri)?.read_resource(uri).await
    }
}

impl FromIterator<Arc<dyn ResourceProvider>> for ResourceRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn ResourceProvider>>>(providers: I) -> Self {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(provider);
        }
        registry
    }
}
