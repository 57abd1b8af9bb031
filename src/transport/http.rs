// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP transport with streamable-HTTP and legacy SSE sub-protocols.
//!
//! `connect` first attempts the streamable sub-protocol (JSON-RPC POSTed to
//! the base URL, responses either plain JSON or a short event-stream body).
//! A 4xx answer to that initialize is a client-class rejection: the server is
//! reachable but does not speak the modern sub-protocol, so exactly one
//! retry is made over the legacy HTTP+SSE pair (a long-lived GET event stream
//! plus a per-message POST endpoint announced on it). Any other failure is
//! surfaced unchanged; retrying those would dress real outages up as
//! protocol negotiation noise.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;
use crate::types::{ServerInfo, ToolCallResult, ToolInfo};

use super::{initialize_params, parse_server_info, parse_tools, rpc_result, Transport};

/// Default bound on a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Header carrying the streamable-HTTP session ID.
const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Which sub-protocol the connect negotiation settled on.
enum Channel {
    /// Modern streamable HTTP; the session ID (if issued) accompanies every
    /// subsequent request.
    Streamable { session_id: Option<String> },

    /// Legacy HTTP+SSE: requests POST to `endpoint_url`, responses arrive on
    /// the long-lived event stream.
    Sse {
        endpoint_url: Url,
        stream: SseStream,
    },
}

/// Transport over a remote HTTP endpoint.
pub struct HttpTransport {
    /// Server name, used in error reporting.
    server: String,

    /// Base URL of the server.
    url: String,

    /// Headers sent with every request.
    headers: HeaderMap,

    client: Client,

    /// Negotiated channel, present while connected.
    channel: Option<Channel>,

    /// Identity reported during the handshake.
    server_info: Option<ServerInfo>,

    /// Request ID counter.
    request_id: u64,

    /// Bound on a single request.
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create an unconnected HTTP transport.
    pub fn new(
        server: impl Into<String>,
        url: impl Into<String>,
        headers: HashMap<String, String>,
    ) -> Self {
        let mut header_map = HeaderMap::new();
        for (key, value) in &headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                header_map.insert(name, value);
            }
        }

        // No global client timeout: the SSE stream is long-lived. Individual
        // POSTs get a per-request timeout instead.
        let client = Client::builder()
            .build()
            .unwrap_or_default();

        Self {
            server: server.into(),
            url: url.into(),
            headers: header_map,
            client,
            channel: None,
            server_info: None,
            request_id: 0,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn next_request_id(&mut self) -> u64 {
        self.request_id += 1;
        self.request_id
    }

    fn build_request(&mut self, method: &str, params: Option<Value>) -> (u64, Value) {
        let id = self.next_request_id();
        let mut request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        if let Some(params) = params {
            request["params"] = params;
        }
        (id, request)
    }

    /// Map a failed HTTP response to the error taxonomy: 4xx means the server
    /// answered and rejected us, everything else is a connect failure.
    async fn status_error(&self, status: StatusCode, response: reqwest::Response) -> TransportError {
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, truncate(&body, 200))
        };

        if status.is_client_error() {
            TransportError::Rejected {
                server: self.server.clone(),
                status: status.as_u16(),
                message,
            }
        } else {
            TransportError::connect(&self.server, message)
        }
    }

    /// POST one JSON-RPC message over the streamable sub-protocol and parse
    /// the response, which may be plain JSON or a short event-stream body.
    async fn streamable_roundtrip(
        &self,
        message: &Value,
        id: Option<u64>,
        session_id: Option<&str>,
    ) -> Result<(Value, Option<String>), TransportError> {
        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .timeout(self.request_timeout)
            .json(message);

        if let Some(session) = session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::connect(&self.server, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(status, response).await);
        }

        let new_session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Notifications get an empty 202 back; there is nothing to parse.
        let Some(id) = id else {
            return Ok((Value::Null, new_session));
        };

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::connect(&self.server, e.to_string()))?;

        let message = if content_type.starts_with("text/event-stream") {
            find_response_in_sse_body(&body, id).ok_or_else(|| {
                TransportError::InvalidResponse(format!(
                    "no response for request {} in event-stream body",
                    id
                ))
            })?
        } else {
            serde_json::from_str(&body)?
        };

        Ok((message, new_session))
    }

    /// Attempt the modern streamable sub-protocol.
    async fn connect_streamable(&mut self) -> Result<(), TransportError> {
        let (id, request) = self.build_request("initialize", Some(initialize_params()));
        let (response, session_id) = self.streamable_roundtrip(&request, Some(id), None).await?;
        let result = rpc_result(response)?;
        self.server_info = Some(parse_server_info(&result));

        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
        });
        self.streamable_roundtrip(&notification, None, session_id.as_deref())
            .await?;

        self.channel = Some(Channel::Streamable { session_id });
        Ok(())
    }

    /// Attempt the legacy HTTP+SSE sub-protocol.
    async fn connect_sse(&mut self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(&self.url)
            .headers(self.headers.clone())
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::connect(&self.server, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(status, response).await);
        }

        let mut stream = SseStream::new(response);

        // The first event names the endpoint all requests are POSTed to.
        let endpoint = loop {
            match stream.next_event().await? {
                Some(event) if event.name == "endpoint" => break event.data,
                Some(_) => continue,
                None => {
                    return Err(TransportError::connect(
                        &self.server,
                        "event stream closed before announcing an endpoint",
                    ))
                }
            }
        };

        let base = Url::parse(&self.url)
            .map_err(|e| TransportError::InvalidResponse(format!("invalid base URL: {}", e)))?;
        let endpoint_url = base
            .join(endpoint.trim())
            .map_err(|e| TransportError::InvalidResponse(format!("invalid endpoint: {}", e)))?;

        let (id, request) = self.build_request("initialize", Some(initialize_params()));
        self.sse_post(&endpoint_url, &request).await?;
        let response = self.sse_await_response(&mut stream, id).await?;
        let result = rpc_result(response)?;
        self.server_info = Some(parse_server_info(&result));

        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
        });
        self.sse_post(&endpoint_url, &notification).await?;

        self.channel = Some(Channel::Sse {
            endpoint_url,
            stream,
        });
        Ok(())
    }

    /// POST one message to the legacy per-message endpoint.
    async fn sse_post(&self, endpoint: &Url, message: &Value) -> Result<(), TransportError> {
        let response = self
            .client
            .post(endpoint.clone())
            .headers(self.headers.clone())
            .header("Content-Type", "application/json")
            .timeout(self.request_timeout)
            .json(message)
            .send()
            .await
            .map_err(|e| TransportError::connect(&self.server, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(status, response).await);
        }
        Ok(())
    }

    /// Read `message` events off the stream until the matching response.
    async fn sse_await_response(
        &self,
        stream: &mut SseStream,
        id: u64,
    ) -> Result<Value, TransportError> {
        loop {
            match stream.next_event().await? {
                Some(event) if event.name == "message" => {
                    let message: Value = serde_json::from_str(&event.data)?;
                    if message.get("id").and_then(|v| v.as_u64()) == Some(id) {
                        return Ok(message);
                    }
                    debug!(server = %self.server, "skipping unrelated event-stream message");
                }
                Some(_) => continue,
                None => {
                    return Err(TransportError::InvalidResponse(format!(
                        "event stream closed while awaiting response {}",
                        id
                    )))
                }
            }
        }
    }

    /// One request/response exchange over whichever channel is connected.
    async fn rpc(&mut self, method: &str, params: Option<Value>) -> Result<Value, TransportError> {
        if self.channel.is_none() {
            return Err(TransportError::NotConnected(self.server.clone()));
        }

        let (id, request) = self.build_request(method, params);

        // Take the channel so the stream can be borrowed mutably alongside
        // immutable request helpers; it is restored before returning.
        let mut channel = self.channel.take().ok_or_else(|| {
            TransportError::NotConnected(self.server.clone())
        })?;

        let result = match &mut channel {
            Channel::Streamable { session_id } => self
                .streamable_roundtrip(&request, Some(id), session_id.as_deref())
                .await
                .map(|(response, _)| response),
            Channel::Sse {
                endpoint_url,
                stream,
            } => {
                let endpoint = endpoint_url.clone();
                match self.sse_post(&endpoint, &request).await {
                    Ok(()) => self.sse_await_response(stream, id).await,
                    Err(e) => Err(e),
                }
            }
        };

        self.channel = Some(channel);
        rpc_result(result?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let modern_err = match self.connect_streamable().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if !modern_err.is_client_rejection() {
            return Err(modern_err);
        }

        debug!(
            server = %self.server,
            error = %modern_err,
            "streamable HTTP rejected, retrying over SSE"
        );

        match self.connect_sse().await {
            Ok(()) => Ok(()),
            Err(legacy_err) => Err(TransportError::FallbackFailed {
                server: self.server.clone(),
                modern: modern_err.to_string(),
                legacy: legacy_err.to_string(),
            }),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.channel.take() {
            Some(Channel::Streamable {
                session_id: Some(session),
            }) => {
                // Best effort: tell the server the session is over.
                let _ = self
                    .client
                    .delete(&self.url)
                    .headers(self.headers.clone())
                    .header(SESSION_HEADER, &session)
                    .timeout(Duration::from_secs(5))
                    .send()
                    .await;
            }
            // Dropping the SSE stream closes the connection.
            _ => {}
        }
        self.server_info = None;
        Ok(())
    }

    async fn list_tools(&mut self) -> Result<Vec<ToolInfo>, TransportError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
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
        let params = serde_json::json!({
            "name": name,
            "arguments": args,
        });

        let result = self.rpc("tools/call", Some(params)).await?;
        serde_json::from_value(result).map_err(TransportError::from)
    }

    fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.clone()
    }

    fn is_connected(&self) -> bool {
        self.channel.is_some()
    }
}

/// One parsed server-sent event.
#[derive(Debug)]
struct SseEvent {
    name: String,
    data: String,
}

/// Incremental parser over a long-lived `text/event-stream` response.
struct SseStream {
    response: reqwest::Response,
    buffer: String,
    done: bool,
}

impl SseStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
            done: false,
        }
    }

    /// Next complete event, or `None` once the stream ends.
    async fn next_event(&mut self) -> Result<Option<SseEvent>, TransportError> {
        loop {
            if let Some(pos) = self.buffer.find("\n\n") {
                let block = self.buffer[..pos].to_string();
                self.buffer.drain(..pos + 2);
                if let Some(event) = parse_sse_block(&block) {
                    return Ok(Some(event));
                }
                continue;
            }

            if self.done {
                return Ok(None);
            }

            match self
                .response
                .chunk()
                .await
                .map_err(|e| TransportError::InvalidResponse(format!("event stream error: {}", e)))?
            {
                Some(bytes) => {
                    let text = String::from_utf8_lossy(&bytes).replace('\r', "");
                    self.buffer.push_str(&text);
                }
                None => {
                    self.done = true;
                    // A final unterminated block still counts as an event.
                    if !self.buffer.trim().is_empty() {
                        let block = std::mem::take(&mut self.buffer);
                        if let Some(event) = parse_sse_block(&block) {
                            return Ok(Some(event));
                        }
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// Parse one blank-line-delimited SSE block into an event.
///
/// Comment lines (leading `:`) are skipped; multiple `data:` lines join with
/// newlines per the SSE format.
fn parse_sse_block(block: &str) -> Option<SseEvent> {
    let mut name = "message".to_string();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseEvent {
        name,
        data: data_lines.join("\n"),
    })
}

/// Scan a complete event-stream body for the response with the given ID.
fn find_response_in_sse_body(body: &str, id: u64) -> Option<Value> {
    let normalized = body.replace('\r', "");
    for block in normalized.split("\n\n") {
        if let Some(event) = parse_sse_block(block) {
            if event.name != "message" {
                continue;
            }
            if let Ok(message) = serde_json::from_str::<Value>(&event.data) {
                if message.get("id").and_then(|v| v.as_u64()) == Some(id) {
                    return Some(message);
                }
            }
        }
    }
    None
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
