// Example plugin: a cached example resource, the example tool and a
// background task that records a bounded history of samples.

use super::{LifecycleState, Plugin, PluginRuntime};
use crate::resources::{ensure_scheme, CachedProvider, ExampleResourceProvider, ResourceProvider};
use crate::tools::{ExampleTool, Tool};
use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use toolhost_core::{PluginConfig, ResourceInfo, ToolhostError, ToolhostResult};

pub const EXAMPLE_PLUGIN_NAME: &str = "example-plugin";
pub const SAMPLES_SCHEME: &str = "plugin";
pub const SAMPLES_RESOURCE_URI: &str = "plugin://samples";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;
type SampleLog = Arc<RwLock<VecDeque<Sample>>>;

/// One background cycle's record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub cycle: u64,
    pub recorded_at: DateTime<Utc>,
}

pub struct ExamplePlugin {
    runtime: PluginRuntime,
    base_config: PluginConfig,
    env: EnvLookup,
    samples: SampleLog,
    cycles: Arc<AtomicU64>,
    example_resource: Arc<CachedProvider<ExampleResourceProvider>>,
}

impl Default for ExamplePlugin {
    fn default() -> Self {
        Self::new(PluginConfig::default())
    }
}

impl ExamplePlugin {
    /// `base_config` is what the config file said; environment overrides are
    /// applied on every `setup()`.
    pub fn new(base_config: PluginConfig) -> Self {
        Self {
            runtime: PluginRuntime::new(EXAMPLE_PLUGIN_NAME),
            base_config,
            env: Arc::new(|key: &str| std::env::var(key).ok()),
            samples: Arc::new(RwLock::new(VecDeque::new())),
            cycles: Arc::new(AtomicU64::new(0)),
            example_resource: Arc::new(CachedProvider::new(ExampleResourceProvider::new())),
        }
    }

    /// Replace the process environment as the source of overrides
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Swap the example resource backend, e.g. for one without the fetch delay
    pub fn with_example_resource(mut self, provider: ExampleResourceProvider) -> Self {
        self.example_resource = Arc::new(CachedProvider::new(provider));
        self
    }

    /// Configuration installed by the last `setup()`
    pub async fn config(&self) -> Option<PluginConfig> {
        self.runtime.config().await
    }

    pub async fn samples(&self) -> Vec<Sample> {
        self.samples.read().await.iter().cloned().collect()
    }

    /// Cycles completed since construction
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Run one unit of background work immediately
    pub async fn run_cycle_now(&self) -> anyhow::Result<()> {
        let config = self
            .runtime
            .config()
            .await
            .context("plugin has not been set up")?;
        self.worker(config).run_cycle().await
    }

    fn resolved_config(&self) -> PluginConfig {
        let env = self.env.clone();
        self.base_config.clone().with_overrides(move |key| env(key))
    }

    fn worker(&self, config: PluginConfig) -> Worker {
        Worker {
            name: EXAMPLE_PLUGIN_NAME.to_string(),
            max_items: config.max_items,
            data_dir: config.data_dir,
            samples: self.samples.clone(),
            cycles: self.cycles.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Plugin for ExamplePlugin {
    fn name(&self) -> &str {
        self.runtime.name()
    }

    async fn setup(&self) -> ToolhostResult<()> {
        let config = self.resolved_config();
        config.validate()?;

        if let Some(dir) = &config.data_dir {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ToolhostError::Configuration(format!(
                    "cannot create data directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        tracing::debug!(
            plugin = EXAMPLE_PLUGIN_NAME,
            update_interval = config.update_interval,
            max_items = config.max_items,
            "Plugin setup"
        );
        self.runtime.configure(config).await
    }

    async fn start(&self) -> ToolhostResult<()> {
        let Some(config) = self.runtime.config().await else {
            return Err(ToolhostError::Configuration(format!(
                "plugin {} must be set up before it is started",
                EXAMPLE_PLUGIN_NAME
            )));
        };

        let worker = self.worker(config);
        self.runtime
            .start(move || {
                let worker = worker.clone();
                async move { worker.run_cycle().await }
            })
            .await
    }

    async fn stop(&self) {
        self.runtime.stop().await
    }

    async fn state(&self) -> LifecycleState {
        self.runtime.state().await
    }

    async fn active_tasks(&self) -> usize {
        self.runtime.active_tasks().await
    }

    fn register_resources(&self) -> Vec<Arc<dyn ResourceProvider>> {
        let samples: Arc<dyn ResourceProvider> = Arc::new(SamplesProvider::new(self.samples.clone()));
        vec![self.example_resource.clone() as Arc<dyn ResourceProvider>, samples]
    }

    fn register_tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(ExampleTool) as Arc<dyn Tool>]
    }
}

/// The unit of work run once per background cycle
#[derive(Clone)]
struct Worker {
    name: String,
    max_items: usize,
    data_dir: Option<PathBuf>,
    samples: SampleLog,
    cycles: Arc<AtomicU64>,
}

impl Worker {
    async fn run_cycle(&self) -> anyhow::Result<()> {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;

        let snapshot: Vec<Sample> = {
            let mut samples = self.samples.write().await;
            samples.push_back(Sample {
                cycle,
                recorded_at: Utc::now(),
            });
            while samples.len() > self.max_items {
                samples.pop_front();
            }
            samples.iter().cloned().collect()
        };

        if let Some(dir) = &self.data_dir {
            persist_samples(dir, &self.name, &snapshot).await?;
        }

        tracing::debug!(plugin = %self.name, cycle, kept = snapshot.len(), "Recorded sample");
        Ok(())
    }
}

/// Write `<dir>/<name>-samples.json` through a temp file and rename
async fn persist_samples(dir: &Path, name: &str, samples: &[Sample]) -> anyhow::Result<()> {
    let path = dir.join(format!("{}-samples.json", name));
    let temp_path = path.with_extension("tmp");

    let json = serde_json::to_vec_pretty(samples).context("Failed to serialize samples")?;
    tokio::fs::write(&temp_path, json)
        .await
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    tokio::fs::rename(&temp_path, &path)
        .await
        .with_context(|| format!("Failed to rename samples file to {}", path.display()))?;

    Ok(())
}

/// Exposes the recorded samples as `plugin://samples` (JSON, never cached)
pub struct SamplesProvider {
    samples: SampleLog,
}

impl SamplesProvider {
    fn new(samples: SampleLog) -> Self {
        Self { samples }
    }

    async fn info(&self) -> ResourceInfo {
        let count = self.samples.read().await.len();
        ResourceInfo::new(
            "Plugin Samples",
            SAMPLES_RESOURCE_URI,
            "Samples recorded by the example plugin's background task",
        )
        .with_mime_type("application/json")
        .with_metadata("count", count.to_string())
    }
}

#[async_trait::async_trait]
impl ResourceProvider for SamplesProvider {
    fn scheme(&self) -> &str {
        SAMPLES_SCHEME
    }

    async fn list_resources(&self) -> ToolhostResult<Vec<ResourceInfo>> {
        Ok(vec![self.info().await])
    }

    async fn get_resource_info(&self, uri: &str) -> ToolhostResult<ResourceInfo> {
        let parsed = ensure_scheme(uri, SAMPLES_SCHEME)?;
        if parsed.identifier() != "samples" {
            return Err(ToolhostError::not_found(uri));
        }
        Ok(self.info().await)
    }

    async fn read_resource(&self, uri: &str) -> ToolhostResult<Bytes> {
        self.get_resource_info(uri).await?;

        let samples: Vec<Sample> = self.samples.read().await.iter().cloned().collect();
        let json = serde_json::to_vec(&samples)
            .map_err(|e| ToolhostError::Execution(format!("failed to encode samples: {}", e)))?;
        Ok(Bytes::from(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::run_scoped;
    use futures::FutureExt;
    use std::panic::AssertUnwindSafe;
    use std::time::Duration;
    use tempfile::TempDir;

    fn plugin() -> ExamplePlugin {
        ExamplePlugin::default()
            .with_env_lookup(|_| None)
            .with_example_resource(ExampleResourceProvider::with_delay(Duration::ZERO))
    }

    fn plugin_with_env(vars: &'static [(&'static str, &'static str)]) -> ExamplePlugin {
        plugin().with_env_lookup(move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle() {
        let plugin = plugin();
        assert_eq!(plugin.state().await, LifecycleState::Idle);

        plugin.setup().await.unwrap();
        assert_eq!(plugin.state().await, LifecycleState::Configured);
        assert_eq!(plugin.active_tasks().await, 0);

        plugin.start().await.unwrap();
        assert!(plugin.is_running().await);
        assert_eq!(plugin.active_tasks().await, 1);

        plugin.stop().await;
        assert!(!plugin.is_running().await);
        assert_eq!(plugin.active_tasks().await, 0);

        plugin.stop().await;
        assert_eq!(plugin.state().await, LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_start_requires_setup() {
        let plugin = plugin();
        let err = plugin.start().await.unwrap_err();
        assert!(matches!(err, ToolhostError::Configuration(_)));
        assert_eq!(plugin.active_tasks().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_while_running_stops_task() {
        let plugin = plugin();
        plugin.setup().await.unwrap();
        plugin.start().await.unwrap();

        plugin.setup().await.unwrap();
        assert_eq!(plugin.state().await, LifecycleState::Configured);
        assert_eq!(plugin.active_tasks().await, 0);
    }

    #[tokio::test]
    async fn test_setup_is_idempotent_and_env_wins() {
        let plugin = plugin_with_env(&[("UPDATE_INTERVAL", "5"), ("MAX_ITEMS", "7")]);

        plugin.setup().await.unwrap();
        let first = plugin.config().await.unwrap();
        plugin.setup().await.unwrap();
        let second = plugin.config().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.update_interval, 5);
        assert_eq!(first.max_items, 7);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_setup() {
        let plugin = ExamplePlugin::new(PluginConfig {
            max_items: 0,
            ..PluginConfig::default()
        })
        .with_env_lookup(|_| None);

        let err = plugin.setup().await.unwrap_err();
        assert!(matches!(err, ToolhostError::Configuration(_)));
        assert_eq!(plugin.state().await, LifecycleState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_runs_each_interval() {
        let plugin = Arc::new(plugin_with_env(&[("UPDATE_INTERVAL", "1")]));

        run_scoped(plugin.clone(), |plugin| async move {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            assert_eq!(plugin.active_tasks().await, 1);
            anyhow::Ok(())
        })
        .await
        .unwrap();

        assert_eq!(plugin.cycles(), 3);
        assert_eq!(plugin.samples().await.len(), 3);
        assert_eq!(plugin.active_tasks().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_scoped_stops_on_error() {
        let plugin = Arc::new(plugin());

        let result: anyhow::Result<()> = run_scoped(plugin.clone(), |plugin| async move {
            assert!(plugin.is_running().await);
            anyhow::bail!("body failed")
        })
        .await;

        assert!(result.is_err());
        assert!(!plugin.is_running().await);
        assert_eq!(plugin.active_tasks().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_scoped_stops_on_panic() {
        let plugin = Arc::new(plugin());
        let explode = true;

        let outcome = AssertUnwindSafe(run_scoped(plugin.clone(), |_| async move {
            if explode {
                panic!("body panicked");
            }
            anyhow::Ok(())
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert!(!plugin.is_running().await);
        assert_eq!(plugin.active_tasks().await, 0);
    }

    #[tokio::test]
    async fn test_run_scoped_reports_setup_failure() {
        let plugin = Arc::new(plugin_with_env(&[("MAX_ITEMS", "0")]));

        let result = run_scoped(plugin.clone(), |_| async { anyhow::Ok(()) }).await;
        assert!(result.is_err());
        assert_eq!(plugin.state().await, LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_samples_are_trimmed_and_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("data");
        let plugin = ExamplePlugin::new(PluginConfig {
            max_items: 2,
            data_dir: Some(data_dir.clone()),
            ..PluginConfig::default()
        })
        .with_env_lookup(|_| None);

        plugin.setup().await.unwrap();
        assert!(data_dir.is_dir());

        for _ in 0..3 {
            plugin.run_cycle_now().await.unwrap();
        }

        let cycles: Vec<u64> = plugin.samples().await.iter().map(|s| s.cycle).collect();
        assert_eq!(cycles, vec![2, 3]);

        let path = data_dir.join("example-plugin-samples.json");
        let stored: Vec<Sample> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(stored, plugin.samples().await);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_registrations() {
        let plugin = plugin();
        plugin.setup().await.unwrap();
        plugin.run_cycle_now().await.unwrap();

        let schemes: Vec<String> = plugin
            .register_resources()
            .iter()
            .map(|p| p.scheme().to_string())
            .collect();
        assert_eq!(schemes, vec!["example", "plugin"]);

        let tools: Vec<String> = plugin
            .register_tools()
            .iter()
            .map(|t| t.schema().name)
            .collect();
        assert_eq!(tools, vec!["example-tool"]);

        let provider = SamplesProvider::new(plugin.samples.clone());
        let content = provider.read_resource(SAMPLES_RESOURCE_URI).await.unwrap();
        let samples: Vec<Sample> = serde_json::from_slice(&content).unwrap();
        assert_eq!(samples.len(), 1);

        let err = provider.read_resource("plugin://other").await.unwrap_err();
        assert!(matches!(err, ToolhostError::ResourceNotFound(_)));
    }
}
