// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persisted, TTL-bounded cache of per-server tool catalogs.
//!
//! One JSON file per server under the cache directory, named by a
//! filesystem-safe transform of the server identity. Staleness is detected
//! lazily on read; there is no background sweeper, so the cache stays usable
//! from short-lived processes. A corrupt entry is indistinguishable from an
//! expired one: both are deleted on read and reported as a miss. Concurrent
//! writers to the same entry are not locked against each other; last writer
//! wins, and a reader that sees a half-written file treats it as corrupt.

pub mod resolver;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::types::{ServerInfo, ToolInfo};

pub use resolver::{resolve_catalogs, resolve_one, ServerCatalog};

/// Default time-to-live for cached catalogs.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// One persisted catalog capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Server identity this entry belongs to.
    pub server: String,

    /// When the catalog was captured.
    #[serde(rename = "cachedAt")]
    pub cached_at: DateTime<Utc>,

    /// Tools the server exposed at capture time.
    pub tools: Vec<ToolInfo>,

    /// Server identity metadata, when the handshake reported one.
    #[serde(rename = "serverInfo", default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
}

/// Summary returned by [`CatalogCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Whether caching is enabled.
    pub enabled: bool,

    /// Configured time-to-live in seconds.
    pub ttl_secs: u64,

    /// Servers with a still-valid entry, sorted by name.
    pub servers: Vec<String>,

    /// Total tools across all still-valid entries.
    pub total_tools: usize,
}

/// TTL-bounded, per-server catalog store.
#[derive(Debug, Clone)]
pub struct CatalogCache {
    dir: PathBuf,
    ttl: Duration,
    enabled: bool,
}

impl CatalogCache {
    /// Create a cache rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            enabled,
        }
    }

    /// The configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn entry_path(&self, server: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_identity(server)))
    }

    /// Read and validate one entry file.
    ///
    /// Deletes the file and returns `None` when it is unparsable or its age
    /// has reached the TTL. Never errors: a damaged cache must not take down
    /// catalog resolution.
    fn read_entry(&self, path: &Path) -> Option<CatalogEntry> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache entry");
                return None;
            }
        };

        let entry: CatalogEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry, purging");
                let _ = std::fs::remove_file(path);
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(entry.cached_at);
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        if age >= ttl {
            debug!(path = %path.display(), "cache entry expired, purging");
            let _ = std::fs::remove_file(path);
            return None;
        }

        Some(entry)
    }

    /// Get the cached catalog for a server, if present and still valid.
    ///
    /// An expired or corrupt entry is purged as a side effect and reported
    /// as a miss. The returned entry is an owned copy; later invalidation
    /// does not touch it.
    pub fn get(&self, server: &str) -> Option<CatalogEntry> {
        if !self.enabled {
            return None;
        }
        self.read_entry(&self.entry_path(server))
    }

    /// Persist a catalog capture with the current timestamp.
    ///
    /// A no-op when caching is disabled.
    pub fn put(
        &self,
        server: &str,
        tools: &[ToolInfo],
        server_info: Option<&ServerInfo>,
    ) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }

        std::fs::create_dir_all(&self.dir)?;

        let entry = CatalogEntry {
            server: server.to_string(),
            cached_at: Utc::now(),
            tools: tools.to_vec(),
            server_info: server_info.cloned(),
        };

        let json = serde_json::to_string_pretty(&entry)?;
        std::fs::write(self.entry_path(server), json)?;
        Ok(())
    }

    /// Delete one server's entry. Returns whether anything was deleted.
    pub fn invalidate(&self, server: &str) -> Result<bool, CacheError> {
        match std::fs::remove_file(self.entry_path(server)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every persisted entry. Returns the number deleted.
    pub fn invalidate_all(&self) -> Result<usize, CacheError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path)?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Summarize the still-valid entries.
    ///
    /// Walks the cache directory; expired and corrupt files encountered
    /// along the way are purged exactly as on `get`.
    pub fn stats(&self) -> CacheStats {
        let mut servers = Vec::new();
        let mut total_tools = 0;

        if self.enabled {
            if let Ok(entries) = std::fs::read_dir(&self.dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    if let Some(entry) = self.read_entry(&path) {
                        total_tools += entry.tools.len();
                        servers.push(entry.server);
                    }
                }
            }
        }

        servers.sort_unstable();
        CacheStats {
            enabled: self.enabled,
            ttl_secs: self.ttl.as_secs(),
            servers,
            total_tools,
        }
    }
}

/// Transform a server identity into a safe file stem.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`.
fn sanitize_identity(server: &str) -> String {
    server
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tools() -> Vec<ToolInfo> {
        vec![
            ToolInfo::new("read_file", "Read a file"),
            ToolInfo::new("write_file", "Write a file"),
        ]
    }

    fn cache_in(dir: &TempDir, ttl: Duration) -> CatalogCache {
        CatalogCache::new(dir.path(), ttl, true)
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(60));

        cache.put("alpha", &sample_tools(), None).unwrap();

        let entry = cache.get("alpha").unwrap();
        assert_eq!(entry.server, "alpha");
        assert_eq!(entry.tools.len(), 2);
        assert_eq!(entry.tools[0].name, "read_file");
    }

    #[test]
    fn test_get_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(60));
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn test_expired_entry_is_purged_on_read() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(1));

        cache.put("alpha", &sample_tools(), None).unwrap();
        let path = cache.entry_path("alpha");

        // Backdate the capture past the TTL.
        let mut entry = cache.get("alpha").unwrap();
        entry.cached_at = Utc::now() - chrono::Duration::seconds(5);
        std::fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();

        assert!(cache.get("alpha").is_none());
        assert!(!path.exists(), "expired entry file must be deleted");

        // A second get finds nothing persisted.
        assert!(cache.get("alpha").is_none());
    }

    #[test]
    fn test_entry_valid_within_ttl() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Duration::from_millis(1000));

        cache.put("alpha", &sample_tools(), None).unwrap();
        let path = cache.entry_path("alpha");

        // Half the TTL old: still valid.
        let mut entry = cache.get("alpha").unwrap();
        entry.cached_at = Utc::now() - chrono::Duration::milliseconds(500);
        std::fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();

        assert!(cache.get("alpha").is_some());

        // Past the TTL: gone, file deleted.
        let mut entry = cache.get("alpha").unwrap();
        entry.cached_at = Utc::now() - chrono::Duration::milliseconds(1500);
        std::fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();

        assert!(cache.get("alpha").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_entry_is_purged_on_read() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(60));

        let path = cache.entry_path("broken");
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(cache.get("broken").is_none());
        assert!(!path.exists(), "corrupt entry file must be deleted");
    }

    #[test]
    fn test_disabled_cache_is_inert() {
        let dir = TempDir::new().unwrap();
        let cache = CatalogCache::new(dir.path(), Duration::from_secs(60), false);

        cache.put("alpha", &sample_tools(), None).unwrap();
        assert!(cache.get("alpha").is_none());
        assert!(!cache.entry_path("alpha").exists());

        let stats = cache.stats();
        assert!(!stats.enabled);
        assert!(stats.servers.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(60));

        cache.put("alpha", &sample_tools(), None).unwrap();
        assert!(cache.invalidate("alpha").unwrap());
        assert!(!cache.invalidate("alpha").unwrap());
        assert!(cache.get("alpha").is_none());
    }

    #[test]
    fn test_invalidate_all() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(60));

        cache.put("alpha", &sample_tools(), None).unwrap();
        cache.put("beta", &sample_tools()[..1], None).unwrap();

        assert_eq!(cache.invalidate_all().unwrap(), 2);
        assert_eq!(cache.invalidate_all().unwrap(), 0);
    }

    #[test]
    fn test_invalidate_all_missing_dir() {
        let dir = TempDir::new().unwrap();
        let cache = CatalogCache::new(dir.path().join("never-created"), Duration::from_secs(60), true);
        assert_eq!(cache.invalidate_all().unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(60));

        let info = ServerInfo {
            name: "files".to_string(),
            version: "1.0.0".to_string(),
            protocol_version: None,
        };
        cache.put("beta", &sample_tools(), Some(&info)).unwrap();
        cache.put("alpha", &sample_tools()[..1], None).unwrap();

        let stats = cache.stats();
        assert!(stats.enabled);
        assert_eq!(stats.ttl_secs, 60);
        assert_eq!(stats.servers, vec!["alpha", "beta"]);
        assert_eq!(stats.total_tools, 3);
    }

    #[test]
    fn test_sanitize_identity() {
        assert_eq!(sanitize_identity("filesystem"), "filesystem");
        assert_eq!(sanitize_identity("my server/2"), "my_server_2");
        assert_eq!(sanitize_identity("a.b-c_d"), "a.b-c_d");
    }

    #[test]
    fn test_entries_are_owned_copies() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Duration::from_secs(60));

        cache.put("alpha", &sample_tools(), None).unwrap();
        let entry = cache.get("alpha").unwrap();

        cache.invalidate("alpha").unwrap();

        // The handed-out copy is unaffected by invalidation.
        assert_eq!(entry.tools.len(), 2);
    }
}
