// Example in-memory resource provider (`example://` scheme)

use super::{ensure_scheme, ResourceProvider};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use toolhost_core::{ResourceInfo, ToolhostError, ToolhostResult};

pub const EXAMPLE_SCHEME: &str = "example";
pub const EXAMPLE_RESOURCE_URI: &str = "example://resource";

const EXAMPLE_CONTENT: &str = "This is an example resource served by toolhost.";

/// Serves a single static resource. Each fetch sleeps for a configurable
/// delay to stand in for real I/O.
#[derive(Debug)]
pub struct ExampleResourceProvider {
    delay: Duration,
    fetches: AtomicUsize,
}

impl Default for ExampleResourceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ExampleResourceProvider {
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(100))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of reads that reached the (simulated) backing store
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn info() -> ResourceInfo {
        ResourceInfo::new("Example Resource", EXAMPLE_RESOURCE_URI, "An example resource")
            .with_mime_type("text/plain")
            .with_size(EXAMPLE_CONTENT.len() as u64)
            .with_metadata("source", "memory")
    }
}

#[async_trait::async_trait]
impl ResourceProvider for ExampleResourceProvider {
    fn scheme(&self) -> &str {
        EXAMPLE_SCHEME
    }

    async fn list_resources(&self) -> ToolhostResult<Vec<ResourceInfo>> {
        Ok(vec![Self::info()])
    }

    async fn get_resource_info(&self, uri: &str) -> ToolhostResult<ResourceInfo> {
        let parsed = ensure_scheme(uri, EXAMPLE_SCHEME)?;
        if parsed.identifier() != "resource" {
            return Err(ToolhostError::not_found(uri));
        }
        Ok(Self::info())
    }

    async fn read_resource(&self, uri: &str) -> ToolhostResult<Bytes> {
        self.get_resource_info(uri).await?;

        tokio::time::sleep(self.delay).await;
        self.fetches.fetch_add(1, Ordering::SeqCst);

        Ok(Bytes::from_static(EXAMPLE_CONTENT.as_bytes()))
    }
}
