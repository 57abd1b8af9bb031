// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transports for talking to tool servers.
//!
//! A [`Transport`] owns one channel to one server: either a spawned child
//! process speaking newline-delimited JSON-RPC over stdio, or an HTTP endpoint
//! speaking streamable HTTP with a one-shot fallback to the legacy SSE
//! sub-protocol. Construction happens at a single point,
//! [`for_endpoint`], which matches exhaustively on the endpoint variant.

pub mod http;
pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ServerEndpoint;
use crate::error::TransportError;
use crate::types::{ServerInfo, ToolCallResult, ToolInfo};

pub use http::HttpTransport;
pub use stdio::StdioTransport;

/// Protocol version sent during the initialize handshake.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Uniform client abstraction over one server channel.
///
/// `list_tools` and `call_tool` require a prior successful `connect`; `close`
/// is idempotent and must never surface teardown errors in place of an
/// operation's own outcome (the session layer relies on this).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Open the channel and perform the protocol handshake. Idempotent while
    /// already connected.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear down the channel. Idempotent; termination errors are swallowed by
    /// implementations where possible and ignored by callers otherwise.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// List the tools the server currently exposes.
    async fn list_tools(&mut self) -> Result<Vec<ToolInfo>, TransportError>;

    /// Invoke one tool with already-structured arguments.
    async fn call_tool(&mut self, name: &str, args: Value)
        -> Result<ToolCallResult, TransportError>;

    /// Identity the server reported during the handshake, if connected.
    fn server_info(&self) -> Option<ServerInfo>;

    /// Whether `connect` has succeeded and `close` has not yet run.
    fn is_connected(&self) -> bool;
}

/// Construct the transport implementation for a resolved endpoint.
///
/// This is the single point where the endpoint variant tag is inspected.
pub fn for_endpoint(server: &str, endpoint: &ServerEndpoint) -> Box<dyn Transport + Send> {
    match endpoint {
        ServerEndpoint::Stdio {
            command,
            args,
            env,
            cwd,
        } => Box::new(StdioTransport::new(
            server,
            command,
            args.clone(),
            env.clone(),
            cwd.clone(),
        )),
        ServerEndpoint::Http { url, headers } => {
            Box::new(HttpTransport::new(server, url, headers.clone()))
        }
    }
}

/// Extract the `result` member of a JSON-RPC response, mapping a JSON-RPC
/// `error` member to [`TransportError::Protocol`].
pub(crate) fn rpc_result(response: Value) -> Result<Value, TransportError> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error");
        return Err(TransportError::protocol(code, message));
    }

    response
        .get("result")
        .cloned()
        .ok_or_else(|| TransportError::InvalidResponse("missing result member".to_string()))
}

/// Parse the tool list out of a `tools/list` result.
pub(crate) fn parse_tools(result: &Value) -> Result<Vec<ToolInfo>, TransportError> {
    let tools = result
        .get("tools")
        .and_then(|t| t.as_array())
        .ok_or_else(|| {
            TransportError::InvalidResponse("missing tools array in tools/list result".to_string())
        })?;

    tools
        .iter()
        .map(|t| serde_json::from_value(t.clone()).map_err(TransportError::from))
        .collect()
}

/// Parse the server identity out of an `initialize` result.
pub(crate) fn parse_server_info(result: &Value) -> ServerInfo {
    let name = result
        .get("serverInfo")
        .and_then(|s| s.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    let version = result
        .get("serverInfo")
        .and_then(|s| s.get("version"))
        .and_then(|v| v.as_str())
        .unwrap_or("0.0.0")
        .to_string();
    let protocol_version = result
        .get("protocolVersion")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    ServerInfo {
        name,
        version,
        protocol_version,
    }
}

/// Build the initialize request parameters shared by both transports.
pub(crate) fn initialize_params() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "clientInfo": {
            "name": "toolgate",
            "version": crate::VERSION
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_endpoint_variants() {
        let stdio = ServerEndpoint::stdio("echo");
        let transport = for_endpoint("local", &stdio);
        assert!(!transport.is_connected());

        let http = ServerEndpoint::http("https://example.com/mcp");
        let transport = for_endpoint("remote", &http);
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_rpc_result_extracts_result() {
        let response = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "ok": true }
        });
        let result = rpc_result(response).unwrap();
        assert_eq!(result.get("ok"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn test_rpc_result_maps_error() {
        let response = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32601, "message": "method not found" }
        });
        match rpc_result(response) {
            Err(TransportError::Protocol { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "method not found");
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_rpc_result_missing_result() {
        let response = serde_json::json!({ "jsonrpc": "2.0", "id": 1 });
        assert!(matches!(
            rpc_result(response),
            Err(TransportError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_tools() {
        let result = serde_json::json!({
            "tools": [
                { "name": "echo", "description": "Echo back", "inputSchema": {} },
                { "name": "add", "inputSchema": { "type": "object" } }
            ]
        });
        let tools = parse_tools(&result).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "echo");
        assert!(tools[1].description.is_none());
    }

    #[test]
    fn test_parse_server_info_defaults() {
        let info = parse_server_info(&serde_json::json!({}));
        assert_eq!(info.name, "unknown");
        assert_eq!(info.version, "0.0.0");
        assert!(info.protocol_version.is_none());

        let info = parse_server_info(&serde_json::json!({
            "protocolVersion": "2025-03-26",
            "serverInfo": { "name": "files", "version": "1.2.0" }
        }));
        assert_eq!(info.name, "files");
        assert_eq!(info.version, "1.2.0");
        assert_eq!(info.protocol_version.as_deref(), Some("2025-03-26"));
    }
}
