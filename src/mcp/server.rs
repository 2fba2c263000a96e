//! MCP Server Implementation
//!
//! Tool and resource registries, connection state, and newline-delimited
//! JSON-RPC routing over any async reader/writer pair (stdio in practice).

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::{
    CallToolParams, CallToolResult, CancelledParams, InitializeParams, InitializeResult,
    Implementation, JsonRpcErrorResponse, JsonRpcError, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListResourcesResult, ListToolsResult, ReadResourceParams,
    ReadResourceResult, Resource, ResourceContents, ResourcesCapability, ServerCapabilities, Tool,
    ToolsCapability,
};
use crate::mcp::validation::McpValidator;
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

type Registry<T> = Arc<RwLock<HashMap<String, T>>>;

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    instructions: Option<String>,
    /// Tool definitions in registration order
    tools: Arc<RwLock<Vec<Tool>>>,
    /// Resource definitions in registration order
    resources: Arc<RwLock<Vec<Resource>>>,
    tool_handlers: Registry<Box<dyn ToolHandler>>,
    resource_handlers: Registry<Box<dyn ResourceHandler>>,
    /// URI prefix → handler, consulted when no exact resource matches
    resource_templates: Registry<Box<dyn ResourceHandler>>,
    connection_state: Arc<RwLock<ConnectionState>>,
    validator: Arc<McpValidator>,
}

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// Resource handler trait for implementing resource access
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn handle(&self, uri: &str) -> Result<ResourceContents>;
}

/// Routes one incoming message to the server's handlers
pub struct MessageHandler {
    server: Arc<McpServer>,
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(name: &str, version: &str) -> Result<Self> {
        let server_info = Implementation {
            name: name.to_string(),
            version: version.to_string(),
        };

        let capabilities = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: Some(false),
                list_changed: Some(false),
            }),
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        let validator = McpValidator::new()?;

        Ok(Self {
            server_info,
            capabilities,
            instructions: None,
            tools: Arc::new(RwLock::new(Vec::new())),
            resources: Arc::new(RwLock::new(Vec::new())),
            tool_handlers: Arc::new(RwLock::new(HashMap::new())),
            resource_handlers: Arc::new(RwLock::new(HashMap::new())),
            resource_templates: Arc::new(RwLock::new(HashMap::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
            validator: Arc::new(validator),
        })
    }

    #[inline]
    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    /// Register a tool; a tool with the same name is replaced
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();

        {
            let mut tools = self.tools.write().await;
            match tools.iter_mut().find(|t| t.name == tool_name) {
                Some(existing) => *existing = tool,
                None => tools.push(tool),
            }
        }

        self.tool_handlers
            .write()
            .await
            .insert(tool_name.clone(), Box::new(handler));

        debug!("Registered tool: {}", tool_name);
    }

    /// Register a resource under its exact URI
    #[inline]
    pub async fn register_resource<H>(&self, resource: Resource, handler: H)
    where
        H: ResourceHandler + 'static,
    {
        let resource_uri = resource.uri.clone();

        {
            let mut resources = self.resources.write().await;
            match resources.iter_mut().find(|r| r.uri == resource_uri) {
                Some(existing) => *existing = resource,
                None => resources.push(resource),
            }
        }

        self.resource_handlers
            .write()
            .await
            .insert(resource_uri.clone(), Box::new(handler));

        debug!("Registered resource: {}", resource_uri);
    }

    /// Handle every URI starting with `prefix` that has no exact registration.
    /// The longest matching prefix wins.
    #[inline]
    pub async fn register_resource_template<H>(&self, prefix: &str, handler: H)
    where
        H: ResourceHandler + 'static,
    {
        self.resource_templates
            .write()
            .await
            .insert(prefix.to_string(), Box::new(handler));
        debug!("Registered resource template: {}*", prefix);
    }

    #[inline]
    pub async fn tool_names(&self) -> Vec<String> {
        self.tools
            .read()
            .await
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(io::stdin(), io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC until the reader reaches EOF
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {
                    if let Some(reply) = self.handle_line(&line).await {
                        Self::send_message(&mut writer, &reply).await?;
                    }
                }
                Err(e) => {
                    error!("Error reading from transport: {}", e);
                    break;
                }
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;

        info!("MCP server stopped");
        Ok(())
    }

    /// Process one line of input, returning the reply to send, if any
    #[inline]
    pub async fn handle_line(self: &Arc<Self>, line: &str) -> Option<JsonRpcMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let raw_value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse JSON: {}", e);
                return Some(JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(
                    JsonRpcError::parse_error(),
                    None,
                )));
            }
        };

        match self.validator.validate_raw_message(&raw_value) {
            Ok(message) => {
                MessageHandler::new(Arc::clone(self))
                    .process_message(message)
                    .await
            }
            Err(e) => {
                warn!("Message validation failed: {}", e);
                Some(JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(
                    JsonRpcError::invalid_request(),
                    None,
                )))
            }
        }
    }

    async fn send_message<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let json = serde_json::to_string(message)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.connection_state.write().await = state;
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>, method: &str) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::InvalidParameters {
        message: format!("{} request missing parameters", method),
    })?;
    Ok(serde_json::from_value(params)?)
}

impl MessageHandler {
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Process an incoming message; notifications and stray responses get no reply
    #[inline]
    pub async fn process_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => Some(self.handle_request(request).await),
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        let JsonRpcRequest {
            method, params, id, ..
        } = request;

        let result = match self.dispatch(&method, params).await {
            Ok(result) => result,
            Err(e) => {
                e.log();
                return e.to_error_response(Some(id));
            }
        };

        JsonRpcMessage::Response(JsonRpcResponse::new(result, id))
    }

    async fn dispatch(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        if let Some(params) = &params {
            self.server
                .validator
                .validate_params(method, params)
                .map_err(|e| McpError::InvalidParameters {
                    message: e.to_string(),
                })?;
        }

        match method {
            "initialize" => self.handle_initialize(params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(params).await,
            "resources/list" => self.handle_list_resources().await,
            "resources/read" => self.handle_read_resource(params).await,
            "ping" => Ok(serde_json::json!({})),
            _ => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                self.server.set_state(ConnectionState::Ready).await;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => {
                let cancelled = notification
                    .params
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
                match cancelled {
                    Some(c) => debug!(
                        "Request {} cancelled: {}",
                        c.request_id,
                        c.reason.as_deref().unwrap_or("no reason")
                    ),
                    None => debug!("Received cancellation notification"),
                }
            }
            other => {
                warn!("Unknown notification method: {}", other);
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let params: InitializeParams = parse_params(params, "initialize")?;

        let validator = &self.server.validator;
        if !validator.is_protocol_version_supported(&params.protocol_version) {
            return Err(McpError::UnsupportedProtocolVersion {
                version: params.protocol_version,
                supported: validator
                    .supported_protocol_versions()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            });
        }

        self.server.set_state(ConnectionState::Initializing).await;

        let result = InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
            instructions: self.server.instructions.clone(),
        };

        info!("Client initialized: {}", params.client_info.name);
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_tools(&self) -> McpResult<Value> {
        let tools = self.server.tools.read().await.clone();
        Ok(serde_json::to_value(ListToolsResult { tools })?)
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> McpResult<Value> {
        let params: CallToolParams = parse_params(params, "tools/call")?;
        let name = params.name.clone();

        let handlers = self.server.tool_handlers.read().await;
        let handler = handlers
            .get(&name)
            .ok_or_else(|| McpError::ToolNotFound { name: name.clone() })?;

        debug!("Calling tool {}", name);
        let result = handler
            .handle(params)
            .await
            .map_err(|e| McpError::ToolExecutionFailed {
                tool: name,
                message: format!("{:#}", e),
            })?;
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_resources(&self) -> McpResult<Value> {
        let resources = self.server.resources.read().await.clone();
        Ok(serde_json::to_value(ListResourcesResult { resources })?)
    }

    async fn handle_read_resource(&self, params: Option<Value>) -> McpResult<Value> {
        let params: ReadResourceParams = parse_params(params, "resources/read")?;
        let uri = params.uri;

        let access_failed = |e: anyhow::Error| McpError::ResourceAccessFailed {
            uri: uri.clone(),
            message: format!("{:#}", e),
        };

        let exact = self.server.resource_handlers.read().await;
        let contents = if let Some(handler) = exact.get(&uri) {
            handler.handle(&uri).await.map_err(access_failed)?
        } else {
            let templates = self.server.resource_templates.read().await;
            let handler = templates
                .iter()
                .filter(|(prefix, _)| uri.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, handler)| handler)
                .ok_or_else(|| McpError::ResourceNotFound { uri: uri.clone() })?;
            handler.handle(&uri).await.map_err(access_failed)?
        };

        Ok(serde_json::to_value(ReadResourceResult {
            contents: vec![contents],
        })?)
    }
}
