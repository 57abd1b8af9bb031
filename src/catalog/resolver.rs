// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cache-aware catalog resolution across the configured server set.
//!
//! Each server's resolution is an independent connect/list/close cycle, so
//! the whole set fans out concurrently. A failing server contributes an
//! empty catalog plus a warning instead of aborting the others.

use std::collections::HashMap;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::ServerEndpoint;
use crate::session::ServerSession;
use crate::types::ToolInfo;

use super::CatalogCache;

/// Outcome of resolving one server's catalog.
#[derive(Debug, Clone)]
pub struct ServerCatalog {
    /// Server name.
    pub server: String,

    /// Resolved tools; empty when the server was unavailable.
    pub tools: Vec<ToolInfo>,

    /// Whether the tools came from the cache.
    pub from_cache: bool,

    /// Error message when the server could not be reached.
    pub error: Option<String>,
}

impl ServerCatalog {
    fn unavailable(server: String, error: String) -> Self {
        Self {
            server,
            tools: Vec::new(),
            from_cache: false,
            error: Some(error),
        }
    }
}

/// Resolve one server's catalog: cache first, then a fresh session.
///
/// With `force_refresh` the cache is bypassed (and overwritten on success).
/// A connection failure is captured in the returned catalog rather than
/// propagated; cache write failures only warn.
pub async fn resolve_one(
    server: &str,
    endpoint: &ServerEndpoint,
    cache: &CatalogCache,
    force_refresh: bool,
) -> ServerCatalog {
    if !force_refresh {
        if let Some(entry) = cache.get(server) {
            debug!(server = %server, tools = entry.tools.len(), "catalog cache hit");
            return ServerCatalog {
                server: server.to_string(),
                tools: entry.tools,
                from_cache: true,
                error: None,
            };
        }
    }

    let session = ServerSession::new(server, endpoint.clone());
    match session.get_catalog().await {
        Ok((tools, server_info)) => {
            if let Err(e) = cache.put(server, &tools, server_info.as_ref()) {
                warn!(server = %server, error = %e, "failed to persist catalog");
            }
            ServerCatalog {
                server: server.to_string(),
                tools,
                from_cache: false,
                error: None,
            }
        }
        Err(e) => {
            warn!(server = %server, error = %e, "catalog resolution failed");
            ServerCatalog::unavailable(server.to_string(), e.to_string())
        }
    }
}

/// Resolve catalogs for a whole server set concurrently.
///
/// Results come back sorted by server name. Per-server failures are isolated;
/// the overall resolution always completes.
pub async fn resolve_catalogs(
    servers: &HashMap<String, ServerEndpoint>,
    cache: &CatalogCache,
    force_refresh: bool,
) -> Vec<ServerCatalog> {
    let mut tasks = JoinSet::new();

    for (name, endpoint) in servers {
        let name = name.clone();
        let endpoint = endpoint.clone();
        let cache = cache.clone();
        tasks.spawn(async move { resolve_one(&name, &endpoint, &cache, force_refresh).await });
    }

    let mut catalogs = Vec::with_capacity(servers.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(catalog) => catalogs.push(catalog),
            Err(e) => warn!(error = %e, "catalog resolution task panicked"),
        }
    }

    catalogs.sort_unstable_by(|a, b| a.server.cmp(&b.server));
    catalogs
}
