mod bridge;
mod buffer;
mod config;
mod error;
mod storage;

use anyhow::{Context, Result, bail};
use crate::bridge::{Bridge, BridgeRequest, BridgeResponse, Encoding, ResponseData};
use crate::buffer::FileBufferCache;
use crate::config::ConfigManager;
use crate::storage::LocalCache;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

// ============================================================================
// CLI Argument Parsing
// ============================================================================

#[derive(Parser)]
#[command(name = "cceditor-shell", version, about = "CCEditor desktop shell - file and storage bridge")]
struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Config file to use instead of the per-user one
    #[arg(long = "config", global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve bridge requests over HTTP (or stdio with --stdio)
    Serve {
        /// Address to bind (defaults to server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Read requests from stdin and answer on stdout
        #[arg(long)]
        stdio: bool,
    },
    /// Print a file's contents
    Read {
        path: PathBuf,
    },
    /// Write a file (content from --from or stdin)
    Write {
        path: PathBuf,
        /// Take content from this file instead of stdin
        #[arg(long)]
        from: Option<PathBuf>,
    },
    /// Check whether content matches what is saved on disk
    Compare {
        path: PathBuf,
        /// Take content from this file instead of stdin
        #[arg(long)]
        from: Option<PathBuf>,
        /// Re-read the file even if a snapshot is cached
        #[arg(long)]
        force: bool,
    },
    /// Manage the persistent key-value store
    Storage {
        #[command(subcommand)]
        action: StorageAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum StorageAction {
    /// Get a value
    Get { key: String },
    /// Set a value (parsed as JSON, stored as a string otherwise) and save
    Set { key: String, value: String },
    /// Remove a value and save
    Remove { key: String },
    /// List keys
    Keys,
    /// Print every stored value
    Data,
    /// Remove every value and the backing document
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Set a config value (e.g. "server.port", "cache.ttl_secs")
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries responses in these modes, so logs go to stderr
    let json_mode = std::env::args().any(|arg| arg == "--json");
    let stdio_mode = std::env::args().any(|arg| arg == "--stdio");

    // Initialize structured logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cceditor_shell=info"));

    if json_mode || stdio_mode {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    } else if std::env::var("CCEDITOR_LOG_JSON").is_ok() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }

    let cli = Cli::parse();
    let manager = match cli.config_file {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    };

    run_command(cli.command, manager, cli.json).await
}

// ============================================================================
// Command Runner
// ============================================================================

async fn run_command(command: Commands, mut manager: ConfigManager, json_mode: bool) -> Result<()> {
    match command {
        Commands::Serve { host, port, stdio } => {
            let bridge = open_bridge(&manager)?;
            if stdio {
                crate::bridge::stdio::serve(bridge).await?;
            } else {
                let server = &manager.get().server;
                let host = host.unwrap_or_else(|| server.host.clone());
                let port = port.unwrap_or(server.port);
                let addr: SocketAddr = format!("{}:{}", host, port)
                    .parse()
                    .with_context(|| format!("Invalid address: {}:{}", host, port))?;
                crate::bridge::server::serve(bridge, addr).await?;
            }
        }
        Commands::Read { path } => {
            let bridge = open_bridge(&manager)?;
            let response = bridge.handle(BridgeRequest::ReadFile {
                path: std::path::absolute(&path)?,
            });
            print_response(&response, json_mode)?;
        }
        Commands::Write { path, from } => {
            let bridge = open_bridge(&manager)?;
            let (content, encoding) = content_field(read_input(from.as_deref())?);
            let response = bridge.handle(BridgeRequest::WriteFile {
                path: std::path::absolute(&path)?,
                content,
                encoding,
            });
            print_response(&response, json_mode)?;
        }
        Commands::Compare { path, from, force } => {
            let bridge = open_bridge(&manager)?;
            let (content, encoding) = content_field(read_input(from.as_deref())?);
            let response = bridge.handle(BridgeRequest::CompareSavedContent {
                path: std::path::absolute(&path)?,
                content,
                encoding,
                force_refresh: force,
            });
            print_response(&response, json_mode)?;
        }
        Commands::Storage { action } => {
            let bridge = open_bridge(&manager)?;
            let response = match action {
                StorageAction::Get { key } => bridge.handle(BridgeRequest::StorageGet { key }),
                StorageAction::Set { key, value } => {
                    let value = serde_json::from_str(&value)
                        .unwrap_or(serde_json::Value::String(value));
                    save_after(&bridge, bridge.handle(BridgeRequest::StorageSet { key, value }))
                }
                StorageAction::Remove { key } => {
                    save_after(&bridge, bridge.handle(BridgeRequest::StorageRemove { key }))
                }
                StorageAction::Keys => bridge.handle(BridgeRequest::StorageKeys),
                StorageAction::Data => bridge.handle(BridgeRequest::StorageData),
                StorageAction::Clear => bridge.handle(BridgeRequest::StorageClear),
            };
            print_response(&response, json_mode)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                if json_mode {
                    println!("{}", serde_json::to_string(manager.get())?);
                } else {
                    print!("{}", toml::to_string_pretty(manager.get())?);
                }
            }
            ConfigAction::Path => {
                println!("{}", manager.get_config_path().display());
            }
            ConfigAction::Set { key, value } => {
                manager.set(&key, &value)?;
                if json_mode {
                    println!("{}", serde_json::json!({"success": true, "data": {}, "error": null}));
                } else {
                    println!("Set {} = {}", key, value);
                }
            }
        },
    }

    Ok(())
}

fn open_bridge(manager: &ConfigManager) -> Result<Bridge> {
    let config = manager.get();
    let storage = LocalCache::open(&manager.storage_dir()?, &config.storage.identifier)?;
    let buffers = FileBufferCache::with_ttl(config.cache.ttl());
    tracing::debug!(
        ttl_secs = buffers.ttl().as_secs(),
        storage = %storage.document_path().display(),
        identifier = storage.identifier(),
        "Bridge opened"
    );
    Ok(Bridge::new(buffers, storage))
}

// Persist a successful storage mutation
fn save_after(bridge: &Bridge, response: BridgeResponse) -> BridgeResponse {
    if !response.success {
        return response;
    }
    let saved = bridge.handle(BridgeRequest::StorageSave);
    if saved.success { response } else { saved }
}

fn read_input(from: Option<&Path>) -> Result<Vec<u8>> {
    match from {
        Some(path) => std::fs::read(path).with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn content_field(bytes: Vec<u8>) -> (String, Encoding) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, Encoding::Utf8),
        Err(e) => crate::bridge::encode(e.as_bytes()),
    }
}

fn print_response(response: &BridgeResponse, json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string(response)?);
        if !response.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    if let Some(error) = &response.error {
        bail!("{} ({})", error.message, error.kind);
    }

    match &response.data {
        Some(ResponseData::File {
            content, encoding, ..
        }) => match encoding {
            Encoding::Utf8 => print!("{}", content),
            Encoding::Base64 => println!("{}", content),
        },
        Some(ResponseData::Compared { equal }) => {
            println!("{}", if *equal { "equal" } else { "different" });
        }
        Some(ResponseData::Value { value }) => println!("{}", serde_json::to_string_pretty(value)?),
        Some(ResponseData::Keys { keys }) => {
            for key in keys {
                println!("{}", key);
            }
        }
        Some(ResponseData::Data { data }) => println!("{}", serde_json::to_string_pretty(data)?),
        Some(ResponseData::Invalidated { removed }) => println!("removed: {}", removed),
        Some(ResponseData::Evicted { evicted }) => println!("evicted: {}", evicted),
        Some(ResponseData::Stats {
            entries,
            bytes,
            oldest_age_secs,
        }) => {
            println!("Entries: {}", entries);
            println!("Bytes: {}", bytes);
            if let Some(age) = oldest_age_secs {
                println!("Oldest: {}s", age);
            }
        }
        Some(ResponseData::Done {}) | None => println!("ok"),
    }
    Ok(())
}
