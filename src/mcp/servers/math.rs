//! `math-calculator`: add, multiply, divide and power over two numbers

use crate::mcp::protocol::{CallToolParams, CallToolResult, Tool};
use crate::mcp::server::{McpServer, ToolHandler};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Number, Value, json};
use std::sync::Arc;

pub const SERVER_NAME: &str = "math-calculator";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Multiply,
    Divide,
    Power,
}

impl MathOp {
    pub const ALL: [Self; 4] = [Self::Add, Self::Multiply, Self::Divide, Self::Power];

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Power => "power",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Multiply => "×",
            Self::Divide => "÷",
            Self::Power => "^",
        }
    }

    #[inline]
    pub fn tool_definition(self) -> Tool {
        let (description, a, b) = match self {
            Self::Add => ("将两个数字相加", "第一个数", "第二个数"),
            Self::Multiply => ("将两个数字相乘", "第一个数", "第二个数"),
            Self::Divide => ("将第一个数除以第二个数", "被除数", "除数（不能为0）"),
            Self::Power => ("计算a的b次方", "底数", "指数"),
        };
        Tool::new(
            self.name(),
            description,
            json!({
                "type": "object",
                "properties": {
                    "a": {"type": "number", "description": a},
                    "b": {"type": "number", "description": b}
                },
                "required": ["a", "b"]
            }),
        )
    }

    /// Result as display text; integers stay integral where the operation allows
    #[inline]
    pub fn apply(self, a: &Number, b: &Number) -> std::result::Result<String, String> {
        let (x, y) = (as_f64(a), as_f64(b));
        let exact = match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => match self {
                Self::Add => a.checked_add(b),
                Self::Multiply => a.checked_mul(b),
                Self::Power => u32::try_from(b).ok().and_then(|e| a.checked_pow(e)),
                Self::Divide => None,
            },
            _ => None,
        };

        if let Some(value) = exact {
            return Ok(value.to_string());
        }

        let value = match self {
            Self::Add => x + y,
            Self::Multiply => x * y,
            Self::Divide => {
                if y == 0.0 {
                    return Err("错误：除数不能为0".to_string());
                }
                x / y
            }
            Self::Power => x.powf(y),
        };
        if !value.is_finite() {
            return Err(format!("计算错误: {} {} {} 的结果超出数值范围", a, self.symbol(), b));
        }
        Ok(format_float(value))
    }
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

/// Floats always show a fractional part (`25.0`)
#[inline]
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn number_arg<'a>(params: &'a CallToolParams, key: &str) -> std::result::Result<&'a Number, String> {
    match params.argument(key) {
        Some(Value::Number(n)) => Ok(n),
        Some(_) => Err(format!("参数 '{}' 必须是数字", key)),
        None => Err(format!("缺少参数 '{}'", key)),
    }
}

pub struct MathToolHandler {
    op: MathOp,
}

impl MathToolHandler {
    #[inline]
    pub fn new(op: MathOp) -> Self {
        Self { op }
    }
}

#[async_trait]
impl ToolHandler for MathToolHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let (a, b) = match (number_arg(&params, "a"), number_arg(&params, "b")) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                return Ok(CallToolResult::error(format!("错误：执行工具时出错 - {}", e)));
            }
        };

        Ok(match self.op.apply(a, b) {
            Ok(result) => CallToolResult::text(format!("{} {} {} = {}", a, self.op.symbol(), b, result)),
            Err(message) => CallToolResult::error(message),
        })
    }
}

/// Build the math server with its four tools registered
#[inline]
pub async fn build_server() -> Result<Arc<McpServer>> {
    let server = McpServer::new(SERVER_NAME, env!("CARGO_PKG_VERSION"))?
        .with_instructions("Basic arithmetic: add, multiply, divide, power");

    for op in MathOp::ALL {
        server
            .register_tool(op.tool_definition(), MathToolHandler::new(op))
            .await;
    }

    Ok(Arc::new(server))
}
