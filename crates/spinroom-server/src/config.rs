use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Public URL of this server (e.g., https://rooms.example.com).
    /// Used for CORS configuration.
    pub public_url: Option<String>,
    /// Distinguishes snowflake ids across instances sharing a
    /// snapshot directory.
    #[serde(default)]
    pub worker_id: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
            public_url: None,
            worker_id: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotBackendKind {
    Memory,
    File,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_backend")]
    pub backend: SnapshotBackendKind,
    /// Directory for the file backend.
    #[serde(default = "default_snapshot_dir")]
    pub dir: String,
    #[serde(default = "default_snapshot_interval")]
    pub interval_seconds: u64,
    /// How long an empty room's snapshot stays revivable.
    #[serde(default = "default_snapshot_ttl")]
    pub ttl_seconds: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            backend: default_snapshot_backend(),
            dir: default_snapshot_dir(),
            interval_seconds: default_snapshot_interval(),
            ttl_seconds: default_snapshot_ttl(),
        }
    }
}

fn default_snapshot_backend() -> SnapshotBackendKind {
    SnapshotBackendKind::Memory
}

fn default_snapshot_dir() -> String {
    "./data/snapshots".into()
}

fn default_snapshot_interval() -> u64 {
    10
}

fn default_snapshot_ttl() -> u64 {
    3600
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();
            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, generate_config_template(&config))?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };

        // Environment variable overrides
        if let Ok(value) = std::env::var("SPINROOM_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("SPINROOM_PUBLIC_URL") {
            config.server.public_url = Some(value);
        }
        if let Ok(value) = std::env::var("SPINROOM_WORKER_ID") {
            if let Ok(parsed) = value.parse::<u16>() {
                config.server.worker_id = parsed;
            }
        }
        if let Ok(value) = std::env::var("SPINROOM_SNAPSHOT_BACKEND") {
            match value.trim().to_ascii_lowercase().as_str() {
                "memory" => config.snapshot.backend = SnapshotBackendKind::Memory,
                "file" => config.snapshot.backend = SnapshotBackendKind::File,
                _ => tracing::warn!(
                    "Ignoring invalid SPINROOM_SNAPSHOT_BACKEND value '{}'; expected memory or file",
                    value
                ),
            }
        }
        if let Ok(value) = std::env::var("SPINROOM_SNAPSHOT_DIR") {
            config.snapshot.dir = value;
        }
        if let Ok(value) = std::env::var("SPINROOM_SNAPSHOT_INTERVAL_SECONDS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.snapshot.interval_seconds = parsed;
            }
        }
        if let Ok(value) = std::env::var("SPINROOM_SNAPSHOT_TTL_SECONDS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.snapshot.ttl_seconds = parsed;
            }
        }

        Ok(config)
    }
}

fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Spinroom server configuration
# Every value here can be overridden with a SPINROOM_* environment
# variable, e.g. SPINROOM_BIND_ADDRESS or SPINROOM_SNAPSHOT_BACKEND.

[server]
bind_address = "{bind}"
# public_url = "https://rooms.example.com"
worker_id = {worker}

[snapshot]
# "memory" keeps room snapshots in-process; "file" writes one JSON
# document per room under `dir` and survives restarts.
backend = "{backend}"
dir = "{dir}"
interval_seconds = {interval}
ttl_seconds = {ttl}
"#,
        bind = config.server.bind_address,
        worker = config.server.worker_id,
        backend = match config.snapshot.backend {
            SnapshotBackendKind::Memory => "memory",
            SnapshotBackendKind::File => "file",
        },
        dir = config.snapshot.dir,
        interval = config.snapshot.interval_seconds,
        ttl = config.snapshot.ttl_seconds,
    )
}
