//! MCP client over a child process's stdio

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, Implementation, InitializeParams,
    InitializeResult, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, ListResourcesResult,
    ListToolsResult, MCP_VERSION, ReadResourceParams, ReadResourceResult, Resource, RequestId, Tool,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Talks JSON-RPC to a spawned MCP server
pub struct McpClient {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: i64,
    timeout: Duration,
    server_info: Option<Implementation>,
}

impl McpClient {
    /// Start `program args...` with piped stdin/stdout; stderr is inherited
    #[inline]
    pub fn spawn<S: AsRef<str>>(program: &str, args: &[S]) -> McpResult<Self> {
        let mut child = Command::new(program)
            .args(args.iter().map(AsRef::as_ref))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::InternalError {
                message: format!("Failed to start MCP server '{}': {}", program, e),
            })?;

        let stdin = child.stdin.take().ok_or(McpError::ConnectionClosed)?;
        let stdout = child.stdout.take().ok_or(McpError::ConnectionClosed)?;

        info!("Spawned MCP server: {}", program);
        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            server_info: None,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Server identity reported during `initialize`
    #[inline]
    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    async fn write_message<T: Serialize>(&mut self, message: &T) -> McpResult<()> {
        let stdin = self.stdin.as_mut().ok_or(McpError::ConnectionClosed)?;
        let mut json = serde_json::to_string(message)?;
        json.push('\n');
        stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|_| McpError::ConnectionClosed)?;
        stdin.flush().await.map_err(|_| McpError::ConnectionClosed)?;
        Ok(())
    }

    async fn read_reply(&mut self, id: &RequestId) -> McpResult<Value> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|_| McpError::ConnectionClosed)?
                .ok_or(McpError::ConnectionClosed)?;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message: JsonRpcMessage = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Ignoring unparseable server output: {}", e);
                    continue;
                }
            };

            match message {
                JsonRpcMessage::Response(response) if response.id == *id => {
                    return Ok(response.result);
                }
                JsonRpcMessage::ErrorResponse(response)
                    if response.id.as_ref().is_none_or(|rid| rid == id) =>
                {
                    return Err(response.error.into());
                }
                JsonRpcMessage::Notification(notification) => {
                    debug!("Server notification: {}", notification.method);
                }
                other => {
                    debug!("Skipping unrelated message: {:?}", other);
                }
            }
        }
    }

    /// Send a request and wait for the matching response
    #[inline]
    pub async fn request<P, R>(&mut self, method: &str, params: Option<P>) -> McpResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;

        let params = params.map(serde_json::to_value).transpose()?;
        let request = JsonRpcRequest::new(method, params, id.clone());
        debug!("→ {} ({})", method, id);
        self.write_message(&request).await?;

        let result = tokio::time::timeout(self.timeout, self.read_reply(&id))
            .await
            .map_err(|_| McpError::Timeout {
                operation: method.to_string(),
            })??;

        serde_json::from_value(result).map_err(|e| McpError::InvalidRequest {
            message: format!("Malformed {} result: {}", method, e),
        })
    }

    #[inline]
    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.write_message(&JsonRpcNotification::new(method, params))
            .await
    }

    /// Handshake: `initialize` followed by `notifications/initialized`
    #[inline]
    pub async fn initialize(&mut self) -> McpResult<InitializeResult> {
        let params = InitializeParams {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let result: InitializeResult = self.request("initialize", Some(params)).await?;
        self.notify("notifications/initialized", None).await?;

        info!(
            "Connected to {} {} (protocol {})",
            result.server_info.name, result.server_info.version, result.protocol_version
        );
        self.server_info = Some(result.server_info.clone());
        Ok(result)
    }

    #[inline]
    pub async fn list_tools(&mut self) -> McpResult<Vec<Tool>> {
        let result: ListToolsResult = self.request::<Value, _>("tools/list", None).await?;
        Ok(result.tools)
    }

    /// Call a tool; `arguments` must be a JSON object or null
    #[inline]
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> McpResult<CallToolResult> {
        let arguments = match arguments {
            Value::Null => None,
            Value::Object(map) => Some(map.into_iter().collect::<HashMap<_, _>>()),
            other => {
                return Err(McpError::InvalidParameters {
                    message: format!("Tool arguments must be an object, got {}", other),
                });
            }
        };

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request("tools/call", Some(params)).await
    }

    #[inline]
    pub async fn list_resources(&mut self) -> McpResult<Vec<Resource>> {
        let result: ListResourcesResult =
            self.request::<Value, _>("resources/list", None).await?;
        Ok(result.resources)
    }

    #[inline]
    pub async fn read_resource(&mut self, uri: &str) -> McpResult<ReadResourceResult> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.request("resources/read", Some(params)).await
    }

    #[inline]
    pub async fn ping(&mut self) -> McpResult<()> {
        let _: Value = self.request::<Value, _>("ping", None).await?;
        Ok(())
    }

    /// Close stdin so the server sees EOF, then wait for it to exit.
    /// A server that does not exit in time is killed.
    #[inline]
    pub async fn shutdown(mut self) -> McpResult<()> {
        drop(self.stdin.take());

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!("MCP server exited with {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(McpError::InternalError {
                message: format!("Failed to wait for MCP server: {}", e),
            }),
            Err(_) => {
                warn!("MCP server did not exit, killing it");
                self.child
                    .kill()
                    .await
                    .map_err(|e| McpError::InternalError {
                        message: format!("Failed to kill MCP server: {}", e),
                    })
            }
        }
    }
}
