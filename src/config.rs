// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Server definitions and configuration loading.
//!
//! Servers are declared in a JSON file mapping a server name to an endpoint:
//!
//! ```json
//! {
//!   "servers": {
//!     "filesystem": {
//!       "transport": "stdio",
//!       "command": "npx",
//!       "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path"],
//!       "env": { "NODE_ENV": "production" }
//!     },
//!     "github": {
//!       "transport": "http",
//!       "url": "https://mcp.github.com/v1",
//!       "headers": { "Authorization": "Bearer ${GITHUB_TOKEN}" }
//!     }
//!   }
//! }
//! ```
//!
//! `${VAR}` references in env values and header values are expanded from the
//! ambient environment at load time, so transports always see fully resolved
//! endpoints.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Resolved endpoint for a single tool server.
///
/// The variant tag determines which transport implementation is constructed;
/// the single match point lives in [`crate::transport::for_endpoint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ServerEndpoint {
    /// Local child process speaking JSON-RPC over stdio.
    Stdio {
        /// Executable to spawn.
        command: String,

        /// Arguments passed to the executable.
        #[serde(default)]
        args: Vec<String>,

        /// Environment overlay merged over the ambient environment.
        #[serde(default)]
        env: HashMap<String, String>,

        /// Working directory for the child process.
        #[serde(default)]
        cwd: Option<String>,
    },

    /// Remote HTTP endpoint (streamable HTTP with SSE fallback).
    Http {
        /// Base URL of the server.
        url: String,

        /// Headers sent with every request.
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl ServerEndpoint {
    /// Create a stdio endpoint.
    pub fn stdio(command: impl Into<String>) -> Self {
        Self::Stdio {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Create an HTTP endpoint.
    pub fn http(url: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Add arguments (stdio only; no-op for HTTP).
    pub fn with_args(mut self, new_args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if let Self::Stdio { ref mut args, .. } = self {
            *args = new_args.into_iter().map(|s| s.into()).collect();
        }
        self
    }

    /// Set the environment overlay (stdio only; no-op for HTTP).
    pub fn with_env(
        mut self,
        new_env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        if let Self::Stdio { ref mut env, .. } = self {
            *env = new_env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        }
        self
    }

    /// Set request headers (HTTP only; no-op for stdio).
    pub fn with_headers(
        mut self,
        new_headers: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        if let Self::Http { ref mut headers, .. } = self {
            *headers = new_headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect();
        }
        self
    }

    /// Expand `${VAR}` references in env values and header values.
    fn expand(&mut self) {
        match self {
            Self::Stdio { env, .. } => {
                for value in env.values_mut() {
                    *value = expand_vars(value);
                }
            }
            Self::Http { headers, .. } => {
                for value in headers.values_mut() {
                    *value = expand_vars(value);
                }
            }
        }
    }
}

/// The configured server set, keyed by server name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersConfig {
    /// Map of server name to endpoint.
    #[serde(default)]
    pub servers: HashMap<String, ServerEndpoint>,
}

impl ServersConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file, expanding `${VAR}` references.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string, expanding `${VAR}` references.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        for endpoint in config.servers.values_mut() {
            endpoint.expand();
        }
        Ok(config)
    }

    /// Get a server endpoint by name.
    pub fn get(&self, name: &str) -> Option<&ServerEndpoint> {
        self.servers.get(name)
    }

    /// Server names in sorted order for stable output.
    pub fn server_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.servers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Default config file location (`<config dir>/toolgate/servers.json`).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolgate")
        .join("servers.json")
}

/// Default cache directory (`<cache dir>/toolgate/catalogs`).
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".toolgate-cache"))
        .join("toolgate")
        .join("catalogs")
}

/// Expand `${VAR}` references from the ambient environment.
///
/// Unknown variables expand to the empty string; an unterminated `${` is left
/// as-is.
pub fn expand_vars(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
        } else {
            break;
        }
    }
    result
}
