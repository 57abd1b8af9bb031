// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the toolgate client.
//!
//! Strongly-typed errors per area using `thiserror`, with an `anyhow`-based
//! result alias for glue code.

use thiserror::Error;

/// Errors that can occur while talking to a tool server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation attempted before a successful connect.
    #[error("not connected to server '{0}'")]
    NotConnected(String),

    /// Child process failed to start.
    #[error("failed to spawn server '{server}': {message}")]
    Spawn { server: String, message: String },

    /// Endpoint unreachable or handshake failed at the network level.
    #[error("failed to connect to server '{server}': {message}")]
    Connect { server: String, message: String },

    /// The server answered but rejected the attempted sub-protocol.
    #[error("server '{server}' rejected request with status {status}: {message}")]
    Rejected {
        server: String,
        status: u16,
        message: String,
    },

    /// Both HTTP sub-protocols failed.
    #[error("server '{server}' unreachable over streamable HTTP ({modern}) and SSE ({legacy})")]
    FallbackFailed {
        server: String,
        modern: String,
        legacy: String,
    },

    /// Connect handshake exceeded its bounded wait.
    #[error("connection to server '{server}' timed out after {timeout_secs}s")]
    ConnectTimeout { server: String, timeout_secs: u64 },

    /// Tool call exceeded its bounded wait.
    #[error("tool call '{tool}' timed out after {timeout_secs}s")]
    CallTimeout { tool: String, timeout_secs: u64 },

    /// JSON-RPC level error from the server.
    #[error("protocol error: code={code}, message={message}")]
    Protocol { code: i64, message: String },

    /// Response arrived but did not have the expected shape.
    #[error("invalid response from server: {0}")]
    InvalidResponse(String),

    /// IO error on the protocol stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Create a connect error.
    pub fn connect(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a spawn error.
    pub fn spawn(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Whether this failure means the server actively rejected the attempted
    /// sub-protocol, as opposed to being unreachable. Only rejections trigger
    /// the streamable-HTTP to SSE fallback.
    pub fn is_client_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Errors that can occur while persisting or administering the catalog cache.
///
/// Corrupt or expired entries never produce an error on read; they are purged
/// and reported as a miss. These variants cover real IO failures on write and
/// administration paths.
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error reading or writing a cache file.
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be serialized.
    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from mapping schemas and coercing parameter values.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A supplied value could not be coerced to the parameter's type.
    #[error("invalid value for '{name}': expected {expected}, got '{value}'")]
    Coerce {
        name: String,
        expected: String,
        value: String,
    },

    /// A required parameter was not supplied.
    #[error("missing required parameter: {0}")]
    MissingRequired(String),
}

/// Result type alias using anyhow for flexible error handling in glue code.
pub type Result<T> = anyhow::Result<T>;
