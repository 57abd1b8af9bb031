// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Connect-once-per-operation sessions.
//!
//! A [`ServerSession`] is cheap to hold: it owns nothing but a name and an
//! endpoint. Every logical operation opens a fresh transport, runs, and
//! closes it again, so no two operations ever share connection state. There
//! is no pooling and no retry beyond the HTTP transport's own internal
//! sub-protocol fallback; every call is independent and side-effect-isolated
//! from every other call.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::debug;

use crate::config::ServerEndpoint;
use crate::error::TransportError;
use crate::transport::{self, Transport};
use crate::types::{ServerInfo, ToolCallResult, ToolInfo};

/// Future returned by a session operation closure.
pub type OpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// One server's identity plus its resolved endpoint.
#[derive(Debug, Clone)]
pub struct ServerSession {
    name: String,
    endpoint: ServerEndpoint,
}

impl ServerSession {
    /// Create a session handle for a named server.
    pub fn new(name: impl Into<String>, endpoint: ServerEndpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
        }
    }

    /// The server name this session targets.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect, run `op`, and unconditionally close afterwards.
    ///
    /// The operation's outcome is returned as-is; close failures are logged
    /// and dropped so teardown can never mask the real result. `arg` carries
    /// owned data into the operation so the closure itself stays borrow-free.
    pub async fn with_connection<T, A>(
        &self,
        arg: A,
        op: impl for<'a> FnOnce(&'a mut (dyn Transport + Send), A) -> OpFuture<'a, T>,
    ) -> Result<T, TransportError>
    where
        A: Send,
    {
        let transport = transport::for_endpoint(&self.name, &self.endpoint);
        Self::run(transport, arg, op).await
    }

    /// Lifecycle driver, separated from transport construction so tests can
    /// supply their own transport.
    async fn run<T, A>(
        mut transport: Box<dyn Transport + Send>,
        arg: A,
        op: impl for<'a> FnOnce(&'a mut (dyn Transport + Send), A) -> OpFuture<'a, T>,
    ) -> Result<T, TransportError>
    where
        A: Send,
    {
        if let Err(connect_err) = transport.connect().await {
            // Even a failed connect may hold resources worth releasing.
            if let Err(close_err) = transport.close().await {
                debug!(error = %close_err, "ignoring close error after failed connect");
            }
            return Err(connect_err);
        }

        let result = op(transport.as_mut(), arg).await;

        if let Err(close_err) = transport.close().await {
            debug!(error = %close_err, "ignoring close error");
        }

        result
    }

    /// List the server's tools in one connect/close cycle.
    pub async fn get_tools(&self) -> Result<Vec<ToolInfo>, TransportError> {
        self.with_connection((), |transport, ()| {
            Box::pin(async move { transport.list_tools().await })
        })
        .await
    }

    /// Call one tool in one connect/close cycle.
    pub async fn call_tool(
        &self,
        name: &str,
        args: Value,
    ) -> Result<ToolCallResult, TransportError> {
        self.with_connection(
            (name.to_string(), args),
            |transport, (name, args)| {
                Box::pin(async move { transport.call_tool(&name, args).await })
            },
        )
        .await
    }

    /// Fetch the server identity in one connect/close cycle.
    pub async fn get_server_info(&self) -> Result<ServerInfo, TransportError> {
        self.with_connection((), |transport, ()| {
            Box::pin(async move {
                transport.server_info().ok_or_else(|| {
                    TransportError::InvalidResponse(
                        "server reported no identity during handshake".to_string(),
                    )
                })
            })
        })
        .await
    }

    /// Fetch the tool list and server identity together, for catalog capture.
    pub async fn get_catalog(
        &self,
    ) -> Result<(Vec<ToolInfo>, Option<ServerInfo>), TransportError> {
        self.with_connection((), |transport, ()| {
            Box::pin(async move {
                let tools = transport.list_tools().await?;
                Ok((tools, transport.server_info()))
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn boxed(mock: MockTransport) -> Box<dyn Transport + Send> {
        Box::new(mock)
    }

    #[tokio::test]
    async fn test_run_closes_after_success() {
        let mut mock = MockTransport::new();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_list_tools()
            .times(1)
            .returning(|| Ok(vec![ToolInfo::new("echo", "Echo back")]));
        mock.expect_close().times(1).returning(|| Ok(()));

        let tools = ServerSession::run(boxed(mock), (), |t, ()| {
            Box::pin(async move { t.list_tools().await })
        })
        .await
        .unwrap();

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    #[tokio::test]
    async fn test_run_closes_after_op_failure() {
        let mut mock = MockTransport::new();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_list_tools()
            .times(1)
            .returning(|| Err(TransportError::InvalidResponse("bad".to_string())));
        mock.expect_close().times(1).returning(|| Ok(()));

        let result = ServerSession::run(boxed(mock), (), |t, ()| {
            Box::pin(async move { t.list_tools().await })
        })
        .await;

        assert!(matches!(result, Err(TransportError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_run_closes_after_connect_failure() {
        let mut mock = MockTransport::new();
        mock.expect_connect()
            .times(1)
            .returning(|| Err(TransportError::connect("test", "refused")));
        mock.expect_close().times(1).returning(|| Ok(()));

        let result = ServerSession::run(boxed(mock), (), |t, ()| {
            Box::pin(async move { t.list_tools().await })
        })
        .await;

        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_close_error_never_replaces_op_result() {
        let mut mock = MockTransport::new();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_list_tools().times(1).returning(|| Ok(vec![]));
        mock.expect_close()
            .times(1)
            .returning(|| Err(TransportError::InvalidResponse("teardown hiccup".to_string())));

        let result = ServerSession::run(boxed(mock), (), |t, ()| {
            Box::pin(async move { t.list_tools().await })
        })
        .await;

        // The op succeeded; the close failure must not be surfaced.
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_call_tool_arg_passthrough() {
        let mut mock = MockTransport::new();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_call_tool()
            .times(1)
            .withf(|name, args| name == "add" && args.get("a") == Some(&serde_json::json!(1)))
            .returning(|_, _| Ok(ToolCallResult::text("2")));
        mock.expect_close().times(1).returning(|| Ok(()));

        let result = ServerSession::run(
            boxed(mock),
            ("add".to_string(), serde_json::json!({"a": 1})),
            |t, (name, args)| Box::pin(async move { t.call_tool(&name, args).await }),
        )
        .await
        .unwrap();

        assert_eq!(result.as_text(), "2");
    }
}
