//! JSON-RPC 2.0 wire types
//!
//! This module provides the request/response framing shared by the dispatch
//! core, the HTTP server, and the client-side remote proxy:
//! - [`RpcRequest`]: an incoming or outgoing JSON-RPC 2.0 call
//! - [`RpcResponse`]: the matching response, carrying either `result` or `error`
//! - [`RpcError`]: a structured JSON-RPC error with code, message, and data
//!
//! A response always echoes the request's `id` verbatim (including `null`),
//! and `result`/`error` are mutually exclusive.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only protocol version this SDK speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes plus the ANP-reserved range.
pub mod code {
    /// Invalid JSON was received by the server.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Generic server error.
    pub const SERVER_ERROR: i64 = -32000;
    /// The caller could not be authenticated.
    pub const AUTHENTICATION_ERROR: i64 = -32001;
    /// The caller is authenticated but not allowed to perform the call.
    pub const AUTHORIZATION_ERROR: i64 = -32002;
}

/// A JSON-RPC 2.0 request.
///
/// `id` is `None` when the field was absent; an explicit `null` id is kept as
/// `Some(Value::Null)` so it can be echoed back verbatim.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl RpcRequest {
    /// Creates a request with the given id.
    pub fn new(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// Checks the envelope fields required by the JSON-RPC 2.0 spec.
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(RpcError::invalid_request(format!(
                "unsupported jsonrpc version {:?}",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(RpcError::invalid_request("method must not be empty"));
        }
        if let Some(params) = &self.params {
            if !params.is_object() && !params.is_array() {
                return Err(RpcError::invalid_request(
                    "params must be an object or an array",
                ));
            }
        }
        Ok(())
    }
}

/// A JSON-RPC 2.0 response. Exactly one of `result`/`error` is present.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Builds a success response echoing the request id.
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds an error response echoing the request id.
    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A structured JSON-RPC error.
///
/// Implements [`std::error::Error`] so method handlers can return it through
/// a `BoxError` and have the dispatcher propagate code, message, and data
/// unchanged instead of wrapping them in a generic server error.
#[derive(Clone, Debug, Deserialize, Serialize, thiserror::Error)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(code::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(code::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(code::METHOD_NOT_FOUND, format!("method {method} not found"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(code::INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(code::INTERNAL_ERROR, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(code::SERVER_ERROR, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(code::AUTHENTICATION_ERROR, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(code::AUTHORIZATION_ERROR, message)
    }
}
