// Server context: everything one `toolhost serve` process owns

use crate::api::{self, AppState};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use toolhost_core::{ServerConfig, ToolhostResult};
use toolhost_mcp::protocol::ServerInfo;
use toolhost_mcp::resources::{LocalFileProvider, ResourceProvider};
use toolhost_mcp::{run_scoped, ExamplePlugin, McpServer, Plugin};

/// Built in order config, plugin, protocol server. Listeners are attached
/// by `run`. Shutdown goes the other way: cancel the token, let the
/// transports drain, then stop the plugin.
pub struct ServerContext {
    config: ServerConfig,
    plugin: Arc<dyn Plugin>,
    mcp: Arc<McpServer>,
    shutdown: CancellationToken,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> ToolhostResult<Self> {
        let plugin = Arc::new(ExamplePlugin::new(config.plugin.clone()));
        Self::with_plugin(config, plugin)
    }

    pub fn with_plugin(config: ServerConfig, plugin: Arc<dyn Plugin>) -> ToolhostResult<Self> {
        let mut extra_providers: Vec<Arc<dyn ResourceProvider>> = Vec::new();
        if !config.resource_paths.is_empty() {
            let files = LocalFileProvider::new(&config.resource_paths)?;
            tracing::info!(roots = ?files.roots(), "Serving local files");
            extra_providers.push(Arc::new(files));
        }

        let info = ServerInfo {
            name: config.name.clone(),
            version: config.version.clone(),
        };
        let mcp = Arc::new(McpServer::from_plugin(info, plugin.as_ref(), extra_providers));

        Ok(Self {
            config,
            plugin,
            mcp,
            shutdown: CancellationToken::new(),
        })
    }

    /// Cancelling this token shuts the whole server down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind the configured address and serve HTTP, plus the protocol on
    /// stdin/stdout when enabled
    pub async fn run(self) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        if self.config.stdio {
            self.run_with(listener, Some((tokio::io::stdin(), tokio::io::stdout())))
                .await
        } else {
            self.run_with(listener, None::<(tokio::io::Stdin, tokio::io::Stdout)>)
                .await
        }
    }

    /// Serve on an already bound listener and an optional protocol stream.
    /// Returns once both transports ended and the plugin is stopped.
    pub async fn run_with<R, W>(self, listener: TcpListener, protocol_io: Option<(R, W)>) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let context = Arc::new(self);
        let plugin = context.plugin.clone();

        run_scoped(plugin, |plugin| async move {
            let shutdown = context.shutdown.clone();
            let state = AppState {
                service: context.config.name.clone(),
                version: context.config.version.clone(),
                plugin,
            };

            // Either transport ending takes the other one down with it
            let http = async {
                let result = api::serve(listener, state, shutdown.clone()).await;
                shutdown.cancel();
                result
            };

            let protocol = async {
                let result = match protocol_io {
                    Some((reader, writer)) => {
                        tracing::info!("MCP server listening on stdio");
                        context.mcp.serve(reader, writer, shutdown.clone()).await
                    }
                    None => {
                        shutdown.cancelled().await;
                        Ok(())
                    }
                };
                shutdown.cancel();
                result
            };

            let (http_result, protocol_result) = tokio::join!(http, protocol);
            tracing::info!("Transports stopped, stopping plugin");

            http_result?;
            protocol_result.context("MCP transport failed")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use toolhost_core::ToolhostError;
    use toolhost_mcp::LifecycleState;

    fn config() -> ServerConfig {
        ServerConfig {
            stdio: false,
            ..ServerConfig::default()
        }
    }

    fn plugin() -> Arc<ExamplePlugin> {
        Arc::new(ExamplePlugin::default().with_env_lookup(|_| None))
    }

    #[test]
    fn test_missing_resource_path_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config();
        config.resource_paths = vec![temp_dir.path().join("missing")];

        let err = ServerContext::new(config).err().unwrap();
        assert!(matches!(err, ToolhostError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_resource_paths_add_file_provider() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("hello.txt"), "hi").unwrap();
        let mut config = config();
        config.resource_paths = vec![temp_dir.path().to_path_buf()];

        let context = ServerContext::with_plugin(config, plugin()).unwrap();
        let read = context.mcp.read_resource("file://hello.txt").await.unwrap();
        assert_eq!(read.contents[0].text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_run_serves_http_and_stops_plugin_on_shutdown() {
        let plugin = plugin();
        let context = ServerContext::with_plugin(config(), plugin.clone()).unwrap();
        let shutdown = context.shutdown_token();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(
            context.run_with(listener, None::<(tokio::io::Empty, tokio::io::Sink)>),
        );

        let client = reqwest::Client::new();
        let mut ready = false;
        for _ in 0..50 {
            if let Ok(response) = client.get(format!("http://{}/ready", addr)).send().await {
                if response.status().is_success() {
                    ready = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(ready, "server never became ready");

        let health = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();
        assert!(health.status().is_success());

        shutdown.cancel();
        server.await.unwrap().unwrap();

        assert_eq!(plugin.state().await, LifecycleState::Idle);
        assert_eq!(plugin.active_tasks().await, 0);
    }

    #[tokio::test]
    async fn test_protocol_eof_shuts_down() {
        let plugin = plugin();
        let context = ServerContext::with_plugin(config(), plugin.clone()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let (client, server_io) = tokio::io::duplex(16 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = tokio::spawn(context.run_with(listener, Some((server_read, server_write))));

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        let mut lines = BufReader::new(client_read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert!(line.contains("\"result\""));

        client_write.shutdown().await.unwrap();
        drop(client_write);
        drop(lines);

        server.await.unwrap().unwrap();
        assert!(!plugin.is_running().await);
    }
}
