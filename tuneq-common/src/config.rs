//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration follows the priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Secrets (API keys, bot tokens) never have a compiled default. A missing
//! secret is a configuration error reported at startup.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "TUNEQ_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The service must restart
/// to pick up changes to the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and scratch directory
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// HTTP bind address
    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub translator: TranslatorConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Job lifecycle tuning
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// A key stuck in `processing` longer than this may be re-claimed
    #[serde(default = "default_max_processing_age_secs")]
    pub max_processing_age_secs: u64,

    /// A key in `error` is reported as failed for this long before a new
    /// request may start a fresh attempt
    #[serde(default = "default_error_retry_after_secs")]
    pub error_retry_after_secs: u64,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    /// Maximum time to retry a store write while SQLite reports a lock
    #[serde(default = "default_max_lock_wait_ms")]
    pub max_lock_wait_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_processing_age_secs: default_max_processing_age_secs(),
            error_retry_after_secs: default_error_retry_after_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
            max_lock_wait_ms: default_max_lock_wait_ms(),
        }
    }
}

/// Query translation service settings
#[derive(Debug, Clone, Deserialize)]
pub struct TranslatorConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_translator_model")]
    pub model: String,

    #[serde(default = "default_translator_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_translator_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_translator_model(),
            endpoint: default_translator_endpoint(),
            timeout_secs: default_translator_timeout_secs(),
        }
    }
}

/// Audio fetcher settings
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_fetcher_binary")]
    pub binary: String,

    /// Optional cookies file passed to the fetcher
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            binary: default_fetcher_binary(),
            cookies_file: None,
        }
    }
}

/// Blob storage (Telegram Bot API) settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default)]
    pub chat_id: Option<String>,

    #[serde(default = "default_storage_api_base")]
    pub api_base: String,

    /// Prefix joined with the stored file id to form the retrieval URL
    #[serde(default = "default_file_url_base")]
    pub file_url_base: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_storage_api_base(),
            file_url_base: default_file_url_base(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_processing_age_secs() -> u64 {
    1800
}

fn default_error_retry_after_secs() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    600
}

fn default_upload_timeout_secs() -> u64 {
    120
}

fn default_max_lock_wait_ms() -> u64 {
    5000
}

fn default_translator_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_translator_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_translator_timeout_secs() -> u64 {
    30
}

fn default_fetcher_binary() -> String {
    "yt-dlp".to_string()
}

fn default_storage_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_file_url_base() -> String {
    "tg://audio/".to_string()
}

/// Load TOML bootstrap configuration
///
/// A missing file is not an error: a warning is logged and defaults are used.
/// A file that exists but cannot be parsed is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Default TOML config location (`<config dir>/tuneq/tuneq-api.toml`)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tuneq")
        .join("tuneq-api.toml")
}

/// Resolve the root folder
///
/// Priority: CLI argument → `TUNEQ_ROOT_FOLDER` → TOML `root_folder` →
/// OS-dependent default.
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tuneq"))
        .unwrap_or_else(|| PathBuf::from("./tuneq_data"))
}

/// Resolve a secret from environment, then TOML
///
/// Blank values are treated as absent.
pub fn resolve_secret(name: &str, env_var: &str, toml_value: Option<&String>) -> Result<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_secret(v));
    let toml_value = toml_value.filter(|v| is_valid_secret(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in both environment and TOML. Using environment ({}).",
            name, env_var
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable", name);
        return Ok(value);
    }

    if let Some(value) = toml_value {
        info!("{} loaded from TOML config", name);
        return Ok(value.clone());
    }

    Err(Error::Config(format!(
        "{} not configured. Set {} or add it to the TOML config file",
        name, env_var
    )))
}

/// Validate secret (non-empty, non-whitespace)
pub fn is_valid_secret(value: &str) -> bool {
    !value.trim().is_empty()
}
