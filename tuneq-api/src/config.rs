//! Service configuration for tuneq-api
//!
//! Resolves the runtime settings the binary needs from CLI arguments and the
//! TOML bootstrap file. Priority: CLI (clap also reads the environment) →
//! TOML → built-in defaults.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tuneq_common::config::{resolve_root_folder, TomlConfig};
use tuneq_common::{Error, Result};

use crate::db::StorePolicy;
use crate::workflow::PipelineTimeouts;

pub const DEFAULT_PORT: u16 = 5780;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DATABASE_FILE: &str = "tuneq.db";
pub const SCRATCH_DIR: &str = "tmp";

/// Values supplied on the command line (or via their env fallbacks)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
    pub bind_address: Option<String>,
}

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub scratch_dir: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub log_filter: String,
    pub store_policy: StorePolicy,
    pub pipeline_timeouts: PipelineTimeouts,
}

impl ServiceConfig {
    pub fn resolve(cli: &CliOverrides, toml_config: &TomlConfig) -> Self {
        let root_folder = resolve_root_folder(cli.root_folder.as_deref(), toml_config);

        Self {
            database_path: root_folder.join(DATABASE_FILE),
            scratch_dir: root_folder.join(SCRATCH_DIR),
            bind_address: cli
                .bind_address
                .clone()
                .or_else(|| toml_config.bind_address.clone())
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            port: cli.port.or(toml_config.port).unwrap_or(DEFAULT_PORT),
            log_filter: log_filter(&toml_config.logging.level),
            store_policy: StorePolicy::from(&toml_config.jobs),
            pipeline_timeouts: PipelineTimeouts::from(&toml_config.jobs),
            root_folder,
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address {}: {}", self.bind_address, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Create the root folder and the scratch directory if missing
    pub fn ensure_directories(&self) -> Result<()> {
        create_dir(&self.root_folder)?;
        create_dir(&self.scratch_dir)
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| Error::Config(format!("Failed to create {}: {}", path.display(), e)))
}

/// Expand a bare level into a filter for this crate and the HTTP layer
///
/// A value that already looks like a directive list is used as is.
pub fn log_filter(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("tuneq_api={level},tower_http={level}")
    }
}
