// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Child-process transport speaking newline-delimited JSON-RPC over stdio.
//!
//! Standard error is captured on its own pipe and drained to the log so
//! server diagnostics never interleave with the protocol stream.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::TransportError;
use crate::types::{ServerInfo, ToolCallResult, ToolInfo};

use super::{initialize_params, parse_server_info, parse_tools, rpc_result, Transport};

/// Default bound on the connect handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Merge an environment overlay over the ambient environment.
///
/// Overlay entries override ambient entries with the same key.
pub fn merged_env(
    ambient: &HashMap<String, String>,
    overlay: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = ambient.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Transport over a spawned child process.
pub struct StdioTransport {
    /// Server name, used in error reporting.
    server: String,

    /// Executable to spawn.
    command: String,

    /// Arguments for the executable.
    args: Vec<String>,

    /// Environment overlay merged over the ambient environment.
    env: HashMap<String, String>,

    /// Optional working directory.
    cwd: Option<String>,

    /// Running child process, present while connected.
    child: Option<Child>,

    /// Protocol write half.
    stdin: Option<ChildStdin>,

    /// Protocol read half.
    reader: Option<BufReader<ChildStdout>>,

    /// Task draining the child's stderr to the log.
    stderr_task: Option<JoinHandle<()>>,

    /// Identity reported during the handshake.
    server_info: Option<ServerInfo>,

    /// Request ID counter.
    request_id: u64,

    /// Bound on the connect handshake.
    connect_timeout: Duration,

    /// Bound on a single request/response exchange.
    call_timeout: Duration,
}

impl StdioTransport {
    /// Create an unconnected stdio transport.
    pub fn new(
        server: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        env: HashMap<String, String>,
        cwd: Option<String>,
    ) -> Self {
        Self {
            server: server.into(),
            command: command.into(),
            args,
            env,
            cwd,
            child: None,
            stdin: None,
            reader: None,
            stderr_task: None,
            server_info: None,
            request_id: 0,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn next_request_id(&mut self) -> u64 {
        self.request_id += 1;
        self.request_id
    }

    /// Spawn the child with the merged environment and piped stdio.
    fn spawn_child(&self) -> Result<Child, TransportError> {
        let ambient: HashMap<String, String> = std::env::vars().collect();

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        cmd.env_clear();
        cmd.envs(merged_env(&ambient, &self.env));

        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        cmd.spawn()
            .map_err(|e| TransportError::spawn(&self.server, e.to_string()))
    }

    /// Write one JSON-RPC message followed by a newline.
    async fn write_message(&mut self, message: &Value) -> Result<(), TransportError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected(self.server.clone()))?;

        let line = serde_json::to_string(message)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read protocol lines until a response with the given ID arrives.
    ///
    /// Server-initiated notifications and unrelated messages are skipped.
    async fn read_response(&mut self, id: u64) -> Result<Value, TransportError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected(self.server.clone()))?;

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(TransportError::InvalidResponse(format!(
                    "server '{}' closed the protocol stream",
                    self.server
                )));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let message: Value = match serde_json::from_str(trimmed) {
                Ok(v) => v,
                Err(e) => {
                    return Err(TransportError::InvalidResponse(format!(
                        "unparsable protocol line: {}",
                        e
                    )))
                }
            };

            if message.get("id").and_then(|v| v.as_u64()) == Some(id) {
                return Ok(message);
            }

            debug!(server = %self.server, "skipping unrelated protocol message");
        }
    }

    /// One request/response exchange.
    async fn rpc(&mut self, method: &str, params: Option<Value>) -> Result<Value, TransportError> {
        let id = self.next_request_id();
        let mut request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        if let Some(params) = params {
            request["params"] = params;
        }

        self.write_message(&request).await?;
        let response = self.read_response(id).await?;
        rpc_result(response)
    }

    /// Fire-and-forget notification.
    async fn notify(&mut self, method: &str) -> Result<(), TransportError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        self.write_message(&notification).await
    }

    /// Initialize handshake: spawn, initialize, initialized notification.
    async fn handshake(&mut self) -> Result<(), TransportError> {
        let mut child = self.spawn_child()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::spawn(&self.server, "failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::spawn(&self.server, "failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::spawn(&self.server, "failed to capture stderr"))?;

        // Diagnostic noise goes to the log, never the protocol channel.
        let server = self.server.clone();
        self.stderr_task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = %server, "stderr: {}", line);
            }
        }));

        self.stdin = Some(stdin);
        self.reader = Some(BufReader::new(stdout));
        self.child = Some(child);

        let result = self.rpc("initialize", Some(initialize_params())).await?;
        self.server_info = Some(parse_server_info(&result));
        self.notify("notifications/initialized").await?;

        Ok(())
    }

    /// Tear down the child and both pipe halves. Never fails.
    async fn teardown(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        self.stdin = None;
        self.reader = None;
        if let Some(mut child) = self.child.take() {
            // Termination errors are swallowed; the process is gone either way.
            let _ = child.kill().await;
        }
        self.server_info = None;
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let timeout_secs = self.connect_timeout.as_secs();
        let handshake = tokio::time::timeout(self.connect_timeout, self.handshake()).await;

        match handshake {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.teardown().await;
                Err(e)
            }
            Err(_) => {
                self.teardown().await;
                Err(TransportError::ConnectTimeout {
                    server: self.server.clone(),
                    timeout_secs,
                })
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.teardown().await;
        Ok(())
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolInfo>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected(self.server.clone()));
        }

        // Follow pagination cursors until the server stops returning one.
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor
                .take()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = self.rpc("tools/list", params).await?;
            tools.extend(parse_tools(&result)?);

            match result.get("nextCursor").and_then(|v| v.as_str()) {
                Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(tools)
    }

    async fn call_tool(
        &mut self,
        name: &str,
        args: Value,
    ) -> Result<ToolCallResult, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected(self.server.clone()));
        }

        let params = serde_json::json!({
            "name": name,
            "arguments": args,
        });

        let timeout_secs = self.call_timeout.as_secs();
        let result = tokio::time::timeout(self.call_timeout, self.rpc("tools/call", Some(params)))
            .await
            .map_err(|_| TransportError::CallTimeout {
                tool: name.to_string(),
                timeout_secs,
            })??;

        serde_json::from_value(result).map_err(TransportError::from)
    }

    fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.clone()
    }

    fn is_connected(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        // kill_on_drop covers the child; the stderr task must not outlive us.
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashmap(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_merged_env_overlay_wins() {
        let ambient = hashmap(&[("PATH", "/usr/bin"), ("HOME", "/home/u")]);
        let overlay = hashmap(&[("PATH", "/opt/bin"), ("EXTRA", "1")]);

        let merged = merged_env(&ambient, &overlay);
        assert_eq!(merged.get("PATH").map(|s| s.as_str()), Some("/opt/bin"));
        assert_eq!(merged.get("HOME").map(|s| s.as_str()), Some("/home/u"));
        assert_eq!(merged.get("EXTRA").map(|s| s.as_str()), Some("1"));
    }

    #[test]
    fn test_merged_env_empty_overlay() {
        let ambient = hashmap(&[("A", "1")]);
        let merged = merged_env(&ambient, &HashMap::new());
        assert_eq!(merged, ambient);
    }

    #[tokio::test]
    async fn test_not_connected_errors() {
        let mut transport =
            StdioTransport::new("test", "echo", Vec::new(), HashMap::new(), None);

        assert!(!transport.is_connected());
        assert!(matches!(
            transport.list_tools().await,
            Err(TransportError::NotConnected(_))
        ));
        assert!(matches!(
            transport.call_tool("x", serde_json::json!({})).await,
            Err(TransportError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces() {
        let mut transport = StdioTransport::new(
            "missing",
            "/nonexistent/toolgate-test-binary",
            Vec::new(),
            HashMap::new(),
            None,
        );

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Spawn { .. }));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut transport =
            StdioTransport::new("test", "echo", Vec::new(), HashMap::new(), None);

        assert!(transport.close().await.is_ok());
        assert!(transport.close().await.is_ok());
        assert!(!transport.is_connected());
    }
}
