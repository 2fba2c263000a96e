//! Errors raised on either side of an MCP connection and their JSON-RPC codes.

use crate::mcp::protocol::{JsonRpcError, JsonRpcErrorResponse, JsonRpcMessage, RequestId, error_codes};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unsupported protocol version: {version}. Supported: {}", .supported.join(", "))]
    UnsupportedProtocolVersion {
        version: String,
        supported: Vec<String>,
    },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Resource not found: {uri}")]
    ResourceNotFound { uri: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("Resource '{uri}' could not be read: {message}")]
    ResourceAccessFailed { uri: String, message: String },

    #[error("{message}")]
    InvalidRequest { message: String },

    #[error("{message}")]
    InternalError { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("{message}")]
    InvalidParameters { message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timed out waiting for {operation}")]
    Timeout { operation: String },

    /// Error object sent back by the peer
    #[error("Server returned error {code}: {message}")]
    Remote { code: i32, message: String },
}

impl McpError {
    #[inline]
    pub fn code(&self) -> i32 {
        match self {
            Self::UnsupportedProtocolVersion { .. } => error_codes::INVALID_PROTOCOL_VERSION,
            Self::ToolNotFound { .. } => error_codes::TOOL_NOT_FOUND,
            Self::ResourceNotFound { .. } => error_codes::RESOURCE_NOT_FOUND,
            Self::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            Self::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParameters { .. } => error_codes::INVALID_PARAMS,
            Self::Remote { code, .. } => *code,
            Self::ToolExecutionFailed { .. }
            | Self::ResourceAccessFailed { .. }
            | Self::InternalError { .. }
            | Self::ConnectionClosed
            | Self::Timeout { .. } => error_codes::INTERNAL_ERROR,
        }
    }

    /// Caused by what the client sent rather than by the server
    #[inline]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedProtocolVersion { .. }
                | Self::ToolNotFound { .. }
                | Self::ResourceNotFound { .. }
                | Self::InvalidRequest { .. }
                | Self::MethodNotFound { .. }
                | Self::InvalidParameters { .. }
        )
    }

    #[inline]
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        let message = match self {
            Self::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        };
        JsonRpcError::new(self.code(), message, None)
    }

    #[inline]
    pub fn to_error_response(&self, id: Option<RequestId>) -> JsonRpcMessage {
        JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(self.to_jsonrpc_error(), id))
    }

    #[inline]
    pub fn log(&self) {
        if self.is_client_error() {
            warn!("Rejected request: {}", self);
        } else {
            error!("MCP error: {}", self);
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;

impl From<anyhow::Error> for McpError {
    #[inline]
    fn from(error: anyhow::Error) -> Self {
        Self::InternalError {
            message: format!("{:#}", error),
        }
    }
}

impl From<serde_json::Error> for McpError {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidParameters {
            message: error.to_string(),
        }
    }
}

impl From<JsonRpcError> for McpError {
    #[inline]
    fn from(error: JsonRpcError) -> Self {
        Self::Remote {
            code: error.code,
            message: error.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_specific_codes() {
        let missing_tool = McpError::ToolNotFound {
            name: "sqrt".to_string(),
        };
        assert_eq!(missing_tool.code(), -32001);
        assert!(missing_tool.to_jsonrpc_error().message.contains("sqrt"));

        let missing_resource = McpError::ResourceNotFound {
            uri: "rag://missing".to_string(),
        };
        assert_eq!(missing_resource.code(), -32002);

        let version = McpError::UnsupportedProtocolVersion {
            version: "1999-01-01".to_string(),
            supported: vec!["2024-11-05".to_string(), "2025-06-18".to_string()],
        };
        assert_eq!(version.code(), -32000);
        assert_eq!(
            version.to_string(),
            "Unsupported protocol version: 1999-01-01. Supported: 2024-11-05, 2025-06-18"
        );
    }

    #[test]
    fn failures_are_internal_errors() {
        let failed = McpError::ToolExecutionFailed {
            tool: "broken".to_string(),
            message: "disk on fire".to_string(),
        };
        assert_eq!(failed.code(), error_codes::INTERNAL_ERROR);
        assert!(!failed.is_client_error());
        assert_eq!(failed.to_string(), "Tool 'broken' failed: disk on fire");

        let error: McpError = anyhow::anyhow!("disk full").into();
        assert_eq!(error.code(), error_codes::INTERNAL_ERROR);
    }

    #[test]
    fn error_response_keeps_request_id() {
        let error = McpError::MethodNotFound {
            method: "prompts/list".to_string(),
        };
        assert!(error.is_client_error());

        match error.to_error_response(Some(RequestId::String("req".to_string()))) {
            JsonRpcMessage::ErrorResponse(response) => {
                assert_eq!(response.error.code, error_codes::METHOD_NOT_FOUND);
                assert_eq!(response.error.message, "Method not found: prompts/list");
                assert_eq!(response.id, Some(RequestId::String("req".to_string())));
            }
            other => panic!("expected an error response, got {:?}", other),
        }
    }

    #[test]
    fn remote_error_round_trips_unchanged() {
        let error: McpError = JsonRpcError::new(-32601, "Method not found: nope".to_string(), None).into();
        assert_eq!(error.code(), error_codes::METHOD_NOT_FOUND);
        assert_eq!(error.to_jsonrpc_error().message, "Method not found: nope");
        assert!(error.to_string().contains("-32601"));
    }
}
