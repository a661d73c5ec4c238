//! Message types for the stdio transport.
//!
//! JSON Lines (newline-delimited JSON): one request object per line in, one
//! response object per line out. Field names follow the familiar
//! `id`/`method`/`params`/`result`/`error` shape without claiming JSON-RPC 2.0.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ShimError;

/// Request read from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen id echoed in the response.
    pub id: u64,
    /// Method name (e.g. "tools/call").
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// Response written back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Error details in a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(ErrorCode::METHOD_NOT_FOUND, format!("Unknown method: {}", method.into()))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }

    /// No handler registered under `name` (1001).
    pub fn tool_not_found(name: &str) -> Self {
        Self::with_data(
            ErrorCode::TOOL_NOT_FOUND,
            format!("Unknown tool: {}", name),
            serde_json::json!({ "tool": name }),
        )
    }

    /// The ledger rejected a write or read (1002).
    pub fn storage_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::STORAGE_FAILURE, message)
    }
}

impl From<ShimError> for RpcError {
    fn from(err: ShimError) -> Self {
        match err {
            ShimError::UnknownTool(name) => Self::tool_not_found(&name),
            ShimError::Storage(e) => Self::storage_failure(e.to_string()),
            other => Self::internal_error(other.to_string()),
        }
    }
}

/// Error codes.
pub struct ErrorCode;

impl ErrorCode {
    /// Line is not valid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// JSON is not a request object.
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Tool name is not registered.
    pub const TOOL_NOT_FOUND: i32 = 1001;
    /// Ledger read or write failed.
    pub const STORAGE_FAILURE: i32 = 1002;
}

/// Known method names.
pub struct Methods;

impl Methods {
    pub const TOOLS_LIST: &'static str = "tools/list";
    pub const TOOLS_CALL: &'static str = "tools/call";
    pub const HISTORY: &'static str = "history";
}
