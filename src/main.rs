// Copyright 2026 The toolgate authors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Toolgate main entry point - CLI over the catalog cache and sessions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};

use toolgate::catalog::{self, CatalogCache};
use toolgate::config::{self, ServersConfig};
use toolgate::error::SchemaError;
use toolgate::schema;
use toolgate::session::ServerSession;
use toolgate::types::ToolInfo;

/// Toolgate - expose MCP tool servers as discoverable commands.
#[derive(Parser)]
#[command(name = "toolgate")]
#[command(author, version, about = "Expose MCP tool servers as discoverable commands", long_about = None)]
struct Cli {
    /// Path to the servers config file
    #[arg(short, long, env = "TOOLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for cached catalogs
    #[arg(long, env = "TOOLGATE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Catalog cache time-to-live in seconds
    #[arg(long, env = "TOOLGATE_CACHE_TTL", default_value_t = 3600)]
    ttl: u64,

    /// Disable the catalog cache entirely
    #[arg(long)]
    no_cache: bool,

    /// Show debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured servers
    Servers,

    /// List tools, for one server or all configured servers
    Tools {
        /// Server name from the config; omit to list every server
        server: Option<String>,

        /// Bypass the cache and ask the server directly
        #[arg(short, long)]
        refresh: bool,
    },

    /// Call one tool on a server
    Call {
        /// Server name from the config
        server: String,

        /// Tool name as listed by `tools`
        tool: String,

        /// Tool argument as key=value (repeatable)
        #[arg(short, long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// Raw JSON object merged into the arguments
        #[arg(long)]
        json: Option<String>,
    },

    /// Inspect or clear the catalog cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cached servers and totals
    Stats,

    /// Drop cached catalogs (one server, or all)
    Clear {
        /// Server to clear; omit to clear everything
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let cache_dir = cli
        .cache_dir
        .clone()
        .unwrap_or_else(config::default_cache_dir);
    let cache = CatalogCache::new(cache_dir, Duration::from_secs(cli.ttl), !cli.no_cache);

    match cli.command {
        Commands::Servers => {
            let servers = ServersConfig::load(&config_path)?;
            handle_servers(&servers);
            Ok(())
        }
        Commands::Tools { server, refresh } => {
            let servers = ServersConfig::load(&config_path)?;
            match server {
                Some(server) => handle_tools(&servers, &cache, &server, refresh).await,
                None => handle_all_tools(&servers, &cache, refresh).await,
            }
        }
        Commands::Call {
            server,
            tool,
            args,
            json,
        } => {
            let servers = ServersConfig::load(&config_path)?;
            handle_call(&servers, &cache, &server, &tool, &args, json.as_deref()).await
        }
        Commands::Cache { command } => handle_cache(&cache, command),
    }
}

fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt::init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .init();
    }
}

fn handle_servers(servers: &ServersConfig) {
    if servers.servers.is_empty() {
        println!("{}", "No servers configured".yellow());
        return;
    }

    for name in servers.server_names() {
        let kind = match servers.get(name) {
            Some(toolgate::ServerEndpoint::Stdio { command, .. }) => {
                format!("stdio ({})", command)
            }
            Some(toolgate::ServerEndpoint::Http { url, .. }) => format!("http ({})", url),
            None => continue,
        };
        println!("{}  {}", name.cyan().bold(), kind.dimmed());
    }
}

async fn handle_tools(
    servers: &ServersConfig,
    cache: &CatalogCache,
    server: &str,
    refresh: bool,
) -> anyhow::Result<()> {
    let endpoint = servers
        .get(server)
        .ok_or_else(|| anyhow::anyhow!("unknown server: {}", server))?;

    let resolved = catalog::resolve_one(server, endpoint, cache, refresh).await;

    if let Some(error) = &resolved.error {
        eprintln!("{} {}", "warning:".yellow(), error);
    }

    if resolved.tools.is_empty() {
        println!("{}", "No tools available".yellow());
        return Ok(());
    }

    let source = if resolved.from_cache { "cached" } else { "live" };
    println!(
        "{} {} {}",
        server.cyan().bold(),
        format!("({} tools,", resolved.tools.len()).dimmed(),
        format!("{})", source).dimmed()
    );

    for tool in &resolved.tools {
        print_tool(tool);
    }
    Ok(())
}

async fn handle_all_tools(
    servers: &ServersConfig,
    cache: &CatalogCache,
    refresh: bool,
) -> anyhow::Result<()> {
    if servers.servers.is_empty() {
        println!("{}", "No servers configured".yellow());
        return Ok(());
    }

    let catalogs = catalog::resolve_catalogs(&servers.servers, cache, refresh).await;

    for resolved in &catalogs {
        if let Some(error) = &resolved.error {
            println!(
                "{}  {}",
                resolved.server.cyan().bold(),
                format!("unavailable: {}", error).yellow()
            );
            continue;
        }

        let source = if resolved.from_cache { "cached" } else { "live" };
        println!(
            "{}  {}",
            resolved.server.cyan().bold(),
            format!("({} tools, {})", resolved.tools.len(), source).dimmed()
        );
        for tool in &resolved.tools {
            print_tool(tool);
        }
    }
    Ok(())
}

fn print_tool(tool: &ToolInfo) {
    let description = tool.description.as_deref().unwrap_or("");
    println!("  {}  {}", tool.name.green(), description);

    let params = schema::parameter_set(tool);
    for param in &params.params {
        let mut notes = vec![param.kind.as_str().to_string()];
        if param.required {
            notes.push("required".to_string());
        }
        if let Some(values) = &param.allowed_values {
            notes.push(format!("one of: {}", values.join(", ")));
        }
        if let Some(default) = &param.default {
            notes.push(format!("default: {}", default));
        }
        println!(
            "    {} ({})  {}",
            param.name.dimmed(),
            notes.join(", "),
            param.description.as_deref().unwrap_or("")
        );
    }
}

async fn handle_call(
    servers: &ServersConfig,
    cache: &CatalogCache,
    server: &str,
    tool_name: &str,
    arg_pairs: &[String],
    json: Option<&str>,
) -> anyhow::Result<()> {
    let endpoint = servers
        .get(server)
        .ok_or_else(|| anyhow::anyhow!("unknown server: {}", server))?;

    // The catalog supplies the schema the raw arguments are parsed against.
    let resolved = catalog::resolve_one(server, endpoint, cache, false).await;
    if let Some(error) = &resolved.error {
        anyhow::bail!("server '{}' unavailable: {}", server, error);
    }

    let tool = resolved
        .tools
        .iter()
        .find(|t| t.name == tool_name)
        .ok_or_else(|| anyhow::anyhow!("unknown tool '{}' on server '{}'", tool_name, server))?;

    let params = schema::parameter_set(tool);
    let raw = collect_raw_args(arg_pairs, json)?;

    let missing = params.missing_required(&raw);
    if !missing.is_empty() {
        return Err(SchemaError::MissingRequired(missing.join(", ")).into());
    }

    let args = schema::parse_values(&raw, &params)?;

    let session = ServerSession::new(server, endpoint.clone());
    let result = session.call_tool(tool_name, Value::Object(args)).await?;

    let output = schema::normalize_result(&result);
    println!("{}", serde_json::to_string_pretty(&output)?);

    if result.is_error {
        // The server answered; its diagnostic is the output above.
        eprintln!("{}", "tool reported an error".red());
        std::process::exit(1);
    }
    Ok(())
}

/// Fold `key=value` pairs and an optional raw JSON object into one map.
fn collect_raw_args(pairs: &[String], json: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    let mut raw = Map::new();

    if let Some(json) = json {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => raw.extend(map),
            _ => anyhow::bail!("--json must be a JSON object"),
        }
    }

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("argument '{}' is not key=value", pair))?;
        raw.insert(key.to_string(), Value::String(value.to_string()));
    }

    Ok(raw)
}

fn handle_cache(cache: &CatalogCache, command: CacheCommands) -> anyhow::Result<()> {
    match command {
        CacheCommands::Stats => {
            let stats = cache.stats();
            println!(
                "{} {}",
                "enabled:".dimmed(),
                if stats.enabled { "yes" } else { "no" }
            );
            println!("{} {}s", "ttl:".dimmed(), stats.ttl_secs);
            println!("{} {}", "cached tools:".dimmed(), stats.total_tools);
            if stats.servers.is_empty() {
                println!("{} none", "servers:".dimmed());
            } else {
                println!("{} {}", "servers:".dimmed(), stats.servers.join(", "));
            }
        }
        CacheCommands::Clear { server } => match server {
            Some(server) => {
                if cache.invalidate(&server)? {
                    println!("Cleared catalog for {}", server.cyan());
                } else {
                    println!("{}", format!("No cached catalog for {}", server).yellow());
                }
            }
            None => {
                let deleted = cache.invalidate_all()?;
                println!("Cleared {} cached catalog(s)", deleted);
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_raw_args_pairs() {
        let raw = collect_raw_args(
            &["path=/tmp/x".to_string(), "count=3".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(raw.get("path"), Some(&serde_json::json!("/tmp/x")));
        assert_eq!(raw.get("count"), Some(&serde_json::json!("3")));
    }

    #[test]
    fn test_collect_raw_args_json_merge() {
        let raw = collect_raw_args(
            &["b=pair".to_string()],
            Some(r#"{"a": 1, "b": "json"}"#),
        )
        .unwrap();
        assert_eq!(raw.get("a"), Some(&serde_json::json!(1)));
        // key=value pairs win over the JSON object.
        assert_eq!(raw.get("b"), Some(&serde_json::json!("pair")));
    }

    #[test]
    fn test_collect_raw_args_rejects_non_object_json() {
        assert!(collect_raw_args(&[], Some("[1, 2]")).is_err());
        assert!(collect_raw_args(&["noequals".to_string()], None).is_err());
    }
}
