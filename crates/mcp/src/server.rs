// MCP server: JSON-RPC dispatch over the resource and tool registries,
// served as newline-delimited JSON on any async byte stream.

use crate::codec::{RequestFrame, RequestLineCodec};
use crate::plugin::Plugin;
use crate::protocol::*;
use crate::resources::{ResourceProvider, ResourceRegistry};
use crate::tools::ToolRegistry;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use toolhost_core::{ToolhostError, ToolhostResult};

/// Longest request line accepted from a client
const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

pub struct McpServer {
    info: ServerInfo,
    resources: ResourceRegistry,
    tools: ToolRegistry,
}

impl McpServer {
    pub fn new(info: ServerInfo, resources: ResourceRegistry, tools: ToolRegistry) -> Self {
        Self {
            info,
            resources,
            tools,
        }
    }

    /// Build registries from a plugin's registrations plus host-level providers
    pub fn from_plugin<I>(info: ServerInfo, plugin: &dyn Plugin, extra_providers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ResourceProvider>>,
    {
        let resources: ResourceRegistry = plugin
            .register_resources()
            .into_iter()
            .chain(extra_providers)
            .collect();
        let tools: ToolRegistry = plugin.register_tools().into_iter().collect();

        tracing::info!(
            plugin = plugin.name(),
            schemes = ?resources.schemes(),
            tools = tools.len(),
            "MCP server assembled"
        );

        Self::new(info, resources, tools)
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub async fn list_resources(&self) -> ListResourcesResult {
        let resources = self
            .resources
            .list_resources()
            .await
            .into_iter()
            .map(ResourceDescriptor::from)
            .collect();
        ListResourcesResult { resources }
    }

    pub async fn read_resource(&self, uri: &str) -> ToolhostResult<ReadResourceResult> {
        let info = self.resources.get_resource_info(uri).await?;
        let content = self.resources.read_resource(uri).await?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::from_bytes(uri, info.mime_type, &content)],
        })
    }

    pub fn list_tools(&self) -> ListToolsResult {
        ListToolsResult {
            tools: self.tools.list_schemas(),
        }
    }

    /// Run a tool. Execution failures become an `isError` result; unknown
    /// tools and bad arguments stay errors.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> ToolhostResult<CallToolResult> {
        match self.tools.call(name, arguments).await {
            Err(e @ ToolhostError::Execution(_)) => {
                tracing::warn!(tool = name, "Tool execution failed: {}", e);
                Ok(CallToolResult::error(e.to_string()))
            }
            other => other,
        }
    }

    /// Dispatch one request. Notifications produce no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(id, JsonRpcError::invalid_request()));
        }

        tracing::debug!(method = %request.method, %id, "Handling request");

        let result = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" => Ok(serde_json::json!({})),
            "resources/list" => to_value(self.list_resources().await),
            "resources/read" => match parse_params::<ReadResourceParams>(request.params) {
                Ok(params) => self
                    .read_resource(&params.uri)
                    .await
                    .map_err(|e| JsonRpcError::from(&e))
                    .and_then(to_value),
                Err(e) => Err(e),
            },
            "tools/list" => to_value(self.list_tools()),
            "tools/call" => match parse_params::<CallToolParams>(request.params) {
                Ok(params) => self
                    .call_tool(&params.name, params.arguments)
                    .await
                    .map_err(|e| JsonRpcError::from(&e))
                    .and_then(to_value),
                Err(e) => Err(e),
            },
            method => Err(JsonRpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => {
                tracing::debug!(method = %request.method, code = error.code, "Request failed: {}", error.message);
                JsonRpcResponse::error(id, error)
            }
        })
    }

    /// Parse and dispatch one line of input, returning the serialized response.
    /// Bytes that are not UTF-8 JSON get a parse error.
    pub async fn handle_line(&self, line: &[u8]) -> Option<String> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        let response = match serde_json::from_slice::<serde_json::Value>(line) {
            Err(e) => {
                tracing::warn!("Unparseable request: {}", e);
                Some(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    JsonRpcError::parse_error(),
                ))
            }
            Ok(value) => {
                // A present `"id": null` still makes this a request
                let id = value.get("id").cloned();
                match serde_json::from_value::<JsonRpcRequest>(value) {
                    Ok(mut request) => {
                        if request.id.is_none() {
                            request.id = id;
                        }
                        self.handle_request(request).await
                    }
                    Err(e) => {
                        tracing::warn!("Malformed request: {}", e);
                        Some(JsonRpcResponse::error(
                            id.unwrap_or(serde_json::Value::Null),
                            JsonRpcError::invalid_request(),
                        ))
                    }
                }
            }
        }?;

        match serde_json::to_string(&response) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                tracing::error!("Failed to encode response: {}", e);
                None
            }
        }
    }

    /// Serve newline-delimited JSON-RPC until EOF or cancellation
    pub async fn serve<R, W>(
        &self,
        reader: R,
        writer: W,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut frames = FramedRead::new(reader, RequestLineCodec::new_with_max_length(MAX_LINE_LENGTH));
        let mut sink = FramedWrite::new(writer, LinesCodec::new());

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("MCP transport cancelled");
                    break;
                }
                next = frames.next() => next,
            };

            let line = match next {
                None => {
                    tracing::debug!("MCP client closed the stream");
                    break;
                }
                Some(Ok(RequestFrame::Line(line))) => line,
                Some(Ok(RequestFrame::Oversized)) => {
                    tracing::warn!("Request exceeds {} bytes, discarded", MAX_LINE_LENGTH);
                    let response =
                        JsonRpcResponse::error(serde_json::Value::Null, JsonRpcError::parse_error());
                    sink.send(serde_json::to_string(&response)?).await?;
                    continue;
                }
                Some(Err(e)) => return Err(e.into()),
            };

            if let Some(response) = self.handle_line(&line).await {
                sink.send(response).await?;
            }
        }

        Ok(())
    }

    pub async fn serve_stdio(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        tracing::info!("MCP server listening on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout(), cancel).await
    }

    fn initialize(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value, JsonRpcError> {
        if let Some(params) = params {
            let params: InitializeParams = parse_params(Some(params))?;
            tracing::info!(
                client = %params.client_info.name,
                client_version = %params.client_info.version,
                protocol = %params.protocol_version,
                "MCP client connected"
            );
        }

        to_value(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                resources: Some(ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                }),
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                experimental: serde_json::json!({}),
            },
            server_info: self.info.clone(),
        })
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => tracing::debug!("MCP client initialized"),
            "notifications/cancelled" => tracing::debug!("MCP client cancelled a request"),
            method => tracing::debug!(method, "Ignoring notification"),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T, JsonRpcError> {
    let params = params.unwrap_or_else(|| serde_json::json!({}));
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
