// Resource providers: URI-addressed content exposed for reading

pub mod cache;
pub mod example;
pub mod file;
mod registry;

pub use cache::{CacheEntry, CachedProvider, ResourceCache};
pub use example::{ExampleResourceProvider, EXAMPLE_RESOURCE_URI};
pub use file::LocalFileProvider;
pub use registry::ResourceRegistry;

use bytes::Bytes;
use toolhost_core::{ResourceInfo, ResourceUri, ToolhostError, ToolhostResult};

/// Content source for a single URI scheme
#[async_trait::async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Scheme this provider answers for, without `://`
    fn scheme(&self) -> &str;

    /// Resources this provider currently offers
    async fn list_resources(&self) -> ToolhostResult<Vec<ResourceInfo>>;

    /// Metadata for one URI
    async fn get_resource_info(&self, uri: &str) -> ToolhostResult<ResourceInfo>;

    /// Content for one URI
    async fn read_resource(&self, uri: &str) -> ToolhostResult<Bytes>;
}

/// Parse `uri` and make sure it uses `scheme`
pub fn ensure_scheme(uri: &str, scheme: &str) -> ToolhostResult<ResourceUri> {
    let parsed = ResourceUri::parse(uri)?;
    if parsed.scheme() != scheme {
        return Err(ToolhostError::unsupported_scheme(uri));
    }
    Ok(parsed)
}
