// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core types for tools, call results and server metadata.
//!
//! These mirror the shapes MCP servers put on the wire closely enough to
//! deserialize directly from `tools/list` and `tools/call` responses, while
//! staying independent of any particular transport.

use serde::{Deserialize, Serialize};

/// One named, independently invokable capability exposed by a server.
///
/// Immutable once retrieved; the server is the sole source of truth for its
/// tool list within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name, unique within its server.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,

    /// JSON Schema for tool input.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: serde_json::Value,

    /// Optional JSON Schema for structured output.
    #[serde(rename = "outputSchema", default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

impl ToolInfo {
    /// Create a tool with just a name and description (no schema).
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: serde_json::json!({}),
            output_schema: None,
        }
    }
}

/// Result of a tool call.
///
/// A result with `is_error` set is still a successfully received result: the
/// content carries the server's diagnostic text and must be surfaced, not
/// discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Whether the server flagged this result as an error.
    #[serde(rename = "isError", default)]
    pub is_error: bool,

    /// Content items, in the order the server declared them.
    #[serde(default)]
    pub content: Vec<ToolContent>,

    /// Optional structured payload.
    #[serde(rename = "structuredContent", default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

impl ToolCallResult {
    /// Create a successful single-text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            is_error: false,
            content: vec![ToolContent::Text { text: text.into() }],
            structured: None,
        }
    }

    /// Create an error result carrying a diagnostic message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            structured: None,
        }
    }

    /// Concatenate all text content into a single string.
    pub fn as_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Content item types a tool call can return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Plain text content.
    Text {
        /// The text content.
        text: String,
    },

    /// Binary content with a MIME type.
    Image {
        /// Base64-encoded data.
        data: String,
        /// MIME type of the data.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Structured resource reference.
    Resource {
        /// URI of the resource.
        uri: String,
        /// Optional MIME type.
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Optional inline text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

/// Server identity reported during the initialize handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,

    /// Server version.
    pub version: String,

    /// Protocol version the server negotiated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            version: "0.0.0".to_string(),
            protocol_version: None,
        }
    }
}
