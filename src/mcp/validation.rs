//! Incoming-message checks
//!
//! Every line read from the transport is matched against a draft-7 schema
//! for its envelope before it is deserialized, and the params of the few
//! methods that carry structured input are checked before dispatch.

use crate::mcp::protocol::{
    JsonRpcErrorResponse, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    SUPPORTED_PROTOCOL_VERSIONS,
};
use anyhow::{Result, anyhow, bail};
use jsonschema::{Draft, JSONSchema};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Shape {
    Request,
    Notification,
    Response,
    ErrorResponse,
    InitializeParams,
    CallToolParams,
    ReadResourceParams,
}

impl Shape {
    const ALL: [Self; 7] = [
        Self::Request,
        Self::Notification,
        Self::Response,
        Self::ErrorResponse,
        Self::InitializeParams,
        Self::CallToolParams,
        Self::ReadResourceParams,
    ];

    fn label(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Notification => "notification",
            Self::Response => "response",
            Self::ErrorResponse => "error response",
            Self::InitializeParams => "initialize params",
            Self::CallToolParams => "tools/call params",
            Self::ReadResourceParams => "resources/read params",
        }
    }

    fn for_method(method: &str) -> Option<Self> {
        match method {
            "initialize" => Some(Self::InitializeParams),
            "tools/call" => Some(Self::CallToolParams),
            "resources/read" => Some(Self::ReadResourceParams),
            _ => None,
        }
    }

    /// Picks the envelope by which members are present; the schema check
    /// decides whether the members are well formed.
    fn envelope_of(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.contains_key("method") {
            Some(if object.contains_key("id") {
                Self::Request
            } else {
                Self::Notification
            })
        } else if object.contains_key("error") {
            Some(Self::ErrorResponse)
        } else if object.contains_key("result") {
            Some(Self::Response)
        } else {
            None
        }
    }

    fn schema(self) -> Value {
        let version = json!({"type": "string", "const": "2.0"});
        let id = json!({"oneOf": [{"type": "string"}, {"type": "integer"}]});
        match self {
            Self::Request => json!({
                "type": "object",
                "properties": {
                    "jsonrpc": version,
                    "id": id,
                    "method": {"type": "string"},
                    "params": {"type": ["object", "array"]}
                },
                "required": ["jsonrpc", "id", "method"]
            }),
            Self::Notification => json!({
                "type": "object",
                "properties": {
                    "jsonrpc": version,
                    "method": {"type": "string"},
                    "params": {"type": ["object", "array"]}
                },
                "required": ["jsonrpc", "method"]
            }),
            Self::Response => json!({
                "type": "object",
                "properties": {"jsonrpc": version, "id": id, "result": {}},
                "required": ["jsonrpc", "id", "result"]
            }),
            Self::ErrorResponse => json!({
                "type": "object",
                "properties": {
                    "jsonrpc": version,
                    "id": {"oneOf": [{"type": "string"}, {"type": "integer"}, {"type": "null"}]},
                    "error": {
                        "type": "object",
                        "properties": {
                            "code": {"type": "integer"},
                            "message": {"type": "string"},
                            "data": {}
                        },
                        "required": ["code", "message"]
                    }
                },
                "required": ["jsonrpc", "id", "error"]
            }),
            Self::InitializeParams => json!({
                "type": "object",
                "properties": {
                    "protocolVersion": {"type": "string"},
                    "capabilities": {"type": "object"},
                    "clientInfo": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "version": {"type": "string"}
                        },
                        "required": ["name", "version"]
                    }
                },
                "required": ["protocolVersion", "capabilities", "clientInfo"]
            }),
            Self::CallToolParams => json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "arguments": {"type": "object"}
                },
                "required": ["name"]
            }),
            Self::ReadResourceParams => json!({
                "type": "object",
                "properties": {"uri": {"type": "string", "minLength": 1}},
                "required": ["uri"]
            }),
        }
    }
}

/// Compiled schemas for the envelopes and routed params the server accepts
#[derive(Debug)]
pub struct McpValidator {
    compiled: HashMap<Shape, JSONSchema>,
}

impl McpValidator {
    #[inline]
    pub fn new() -> Result<Self> {
        let mut compiled = HashMap::with_capacity(Shape::ALL.len());
        for shape in Shape::ALL {
            let schema = shape.schema();
            let checker = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&schema)
                .map_err(|e| anyhow!("{} schema does not compile: {}", shape.label(), e))?;
            compiled.insert(shape, checker);
        }
        debug!("Compiled {} message schemas", compiled.len());
        Ok(Self { compiled })
    }

    fn check(&self, shape: Shape, value: &Value) -> Result<()> {
        let checker = self
            .compiled
            .get(&shape)
            .ok_or_else(|| anyhow!("no schema for {}", shape.label()))?;

        if let Err(violations) = checker.validate(value) {
            let details: Vec<String> = violations
                .map(|v| {
                    let at = v.instance_path.to_string();
                    if at.is_empty() {
                        v.to_string()
                    } else {
                        format!("{} ({})", v, at)
                    }
                })
                .collect();
            bail!("Invalid {}: {}", shape.label(), details.join("; "));
        }
        Ok(())
    }

    /// Checks params for `initialize`, `tools/call` and `resources/read`.
    /// Other methods are passed through.
    #[inline]
    pub fn validate_params(&self, method: &str, params: &Value) -> Result<()> {
        Shape::for_method(method).map_or(Ok(()), |shape| self.check(shape, params))
    }

    /// Turns one decoded line into a typed message, rejecting anything that
    /// is not a well-formed JSON-RPC 2.0 envelope.
    #[inline]
    pub fn validate_raw_message(&self, value: &Value) -> Result<JsonRpcMessage> {
        let Some(shape) = Shape::envelope_of(value) else {
            bail!("Not a JSON-RPC message");
        };
        self.check(shape, value)?;

        let value = value.clone();
        let message = match shape {
            Shape::Request => JsonRpcMessage::Request(serde_json::from_value::<JsonRpcRequest>(value)?),
            Shape::Notification => {
                JsonRpcMessage::Notification(serde_json::from_value::<JsonRpcNotification>(value)?)
            }
            Shape::Response => JsonRpcMessage::Response(serde_json::from_value::<JsonRpcResponse>(value)?),
            Shape::ErrorResponse => {
                JsonRpcMessage::ErrorResponse(serde_json::from_value::<JsonRpcErrorResponse>(value)?)
            }
            other => bail!("{} is not an envelope", other.label()),
        };
        Ok(message)
    }

    #[inline]
    pub fn is_protocol_version_supported(&self, version: &str) -> bool {
        SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
    }

    /// Newest first
    #[inline]
    pub fn supported_protocol_versions(&self) -> Vec<&'static str> {
        SUPPORTED_PROTOCOL_VERSIONS.to_vec()
    }
}
