// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Toolgate - expose MCP tool servers as discoverable commands.
//!
//! Toolgate connects to tool servers speaking JSON-RPC over a spawned child
//! process or over HTTP, lists the tools they expose, and invokes them
//! individually. Tool catalogs are cached on disk under a TTL so the command
//! surface does not pay a fresh handshake per invocation.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Tool, call-result and server-identity types
//! - [`error`] - Error types and result alias
//! - [`config`] - Server endpoint definitions and config loading
//! - [`transport`] - Stdio and HTTP transports behind one trait
//! - [`session`] - Connect-once-per-operation session lifecycle
//! - [`catalog`] - Persisted TTL-bounded catalog cache and resolution
//! - [`schema`] - Schema-to-parameter mapping and result normalization
//!
//! # Example
//!
//! ```rust,ignore
//! use toolgate::config::ServersConfig;
//! use toolgate::session::ServerSession;
//!
//! let config = ServersConfig::load("servers.json")?;
//! let endpoint = config.get("filesystem").unwrap().clone();
//!
//! let session = ServerSession::new("filesystem", endpoint);
//! let tools = session.get_tools().await?;
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod schema;
pub mod session;
pub mod transport;
pub mod types;

// Re-export commonly used types at crate root
pub use catalog::{CatalogCache, CatalogEntry, ServerCatalog};
pub use config::{ServerEndpoint, ServersConfig};
pub use error::{CacheError, Result, SchemaError, TransportError};
pub use schema::{ParameterKind, ParameterSet, ParameterSpec};
pub use session::ServerSession;
pub use transport::Transport;
pub use types::{ServerInfo, ToolCallResult, ToolContent, ToolInfo};

/// Toolgate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
