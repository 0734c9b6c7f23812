//! Bootstrap configuration and root folder resolution
//!
//! The TOML file only carries bootstrap settings: where data lives, how the
//! HTTP server binds, logging, pipeline tuning and provider credentials.
//! Every field has a built-in default so an empty (or missing) file is valid.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--config`, `--root-folder`, `--port`)
//! 2. Environment variables (`ROOMAI_CONFIG`, `ROOMAI_ROOT_FOLDER`, `ROOMAI_*_API_KEY`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "ROOMAI_CONFIG";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "ROOMAI_ROOT_FOLDER";

const DEFAULT_PORT: u16 = 5780;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder for the database and uploaded images
    pub root_folder: Option<PathBuf>,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub upload: UploadConfig,
    pub providers: ProvidersConfig,
}

/// HTTP server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    /// (trace, debug, info, warn, error, or a full EnvFilter directive)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Job store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite file in the root folder
    #[default]
    Sqlite,
    /// Process-local map; jobs are lost on restart
    Memory,
}

/// Job store and retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite file name, relative to the root folder unless absolute
    pub database_file: PathBuf,
    /// Finished jobs older than this are purged
    pub retention_hours: i64,
    /// How often the retention sweeper runs
    pub sweep_interval_secs: u64,
    /// Upper bound on retrying a write while SQLite reports "database is locked"
    pub max_lock_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_file: PathBuf::from("roomai.db"),
            retention_hours: 24,
            sweep_interval_secs: 3600,
            max_lock_wait_ms: 5000,
        }
    }
}

/// Pipeline execution tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on a single stage, including its provider fallbacks
    pub stage_timeout_secs: u64,
    /// Pipelines allowed to run at the same time; further jobs wait as pending
    pub max_concurrent_jobs: usize,
    /// Fixed pause between consecutive image generation calls of one job
    pub image_request_delay_ms: u64,
    /// Number of design proposals generated per design job
    pub concepts_per_design: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 600,
            max_concurrent_jobs: 4,
            image_request_delay_ms: 12_000,
            concepts_per_design: 3,
        }
    }
}

/// Upload validation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// External AI provider settings
///
/// API keys here are the lowest-priority source; environment variables win.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    /// Smaller model used for prompt translation
    pub anthropic_translation_model: String,

    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,

    pub replicate_api_token: Option<String>,
    pub replicate_base_url: String,
    pub sdxl_version: String,

    pub huggingface_api_token: Option<String>,
    pub sam_endpoint: String,

    /// Shopping region for product links and currency (CA, US, CN)
    pub region: String,

    /// Answer room analysis with canned data when no vision provider is usable
    pub demo_vision: bool,

    /// Request quota applied per provider client
    pub requests_per_minute: u32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            anthropic_translation_model: "claude-3-haiku-20240307".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            replicate_api_token: None,
            replicate_base_url: "https://api.replicate.com".to_string(),
            sdxl_version: "c221b2b8ef527988fb59bf24a8b97c4561f1c671f73bd389f866bfb27c061316"
                .to_string(),
            huggingface_api_token: None,
            sam_endpoint: "https://api-inference.huggingface.co/models/facebook/sam-vit-huge"
                .to_string(),
            region: "CA".to_string(),
            demo_vision: false,
            requests_per_minute: 60,
        }
    }
}

impl TomlConfig {
    /// Path of the SQLite database for a resolved root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        if self.store.database_file.is_absolute() {
            self.store.database_file.clone()
        } else {
            root_folder.join(&self.store.database_file)
        }
    }
}

/// Load TOML configuration from a file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve the configuration file path
///
/// Returns `None` when no source names a file and the default location does
/// not exist; callers then run on built-in defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config directory
    dirs::config_dir()
        .map(|d| d.join("roomai").join("roomai.toml"))
        .filter(|p| p.exists())
}

/// Load configuration from the resolved path, or defaults when there is none
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration file");
            load_toml_config(&path)
        }
        None => Ok(TomlConfig::default()),
    }
}

/// Root folder resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("roomai"))
        .unwrap_or_else(|| PathBuf::from("./roomai_data"))
}

/// Create the root folder (and parents) if missing
pub fn ensure_root_folder(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
        tracing::info!(path = %root_folder.display(), "Created root folder");
    }
    Ok(())
}
