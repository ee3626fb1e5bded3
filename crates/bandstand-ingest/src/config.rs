use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for bandstand.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (BANDSTAND_* prefix)
/// 3. Config file (~/.config/bandstand/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite database.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: BANDSTAND_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/bandstand/bandstand.db
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,

    /// Served root for promoted documents.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Where uploads land before promotion. Must be on the same filesystem
    /// as `documents_dir` so promotion is a rename.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Per-call lock wait deadline for the database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Staged files older than this are swept.
    #[serde(default = "default_staging_max_age_secs")]
    pub staging_max_age_secs: u64,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_coloured")]
    pub coloured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            coloured: default_coloured(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            documents_dir: default_documents_dir(),
            staging_dir: default_staging_dir(),
            busy_timeout_ms: default_busy_timeout_ms(),
            staging_max_age_secs: default_staging_max_age_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/bandstand/config.toml
    /// Reads environment variables with BANDSTAND_ prefix.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("bandstand");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;

        Ok(config)
    }

    /// Load configuration with custom database path.
    ///
    /// This is used when the --db CLI flag is provided.
    pub fn load_with_db_path(db_path: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.database_path = db_path;
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn staging_max_age(&self) -> Duration {
        Duration::from_secs(self.staging_max_age_secs)
    }
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bandstand")
}

/// Get the default database path.
///
/// Returns: ~/.local/share/bandstand/bandstand.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    data_root().join("bandstand.db")
}

fn default_documents_dir() -> PathBuf {
    data_root().join("documents")
}

fn default_staging_dir() -> PathBuf {
    data_root().join("staging")
}

const fn default_busy_timeout_ms() -> u64 {
    3000
}

const fn default_staging_max_age_secs() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_coloured() -> bool {
    true
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/bandstand/config.toml
/// - macOS: ~/Library/Application Support/bandstand/config.toml
/// - Windows: %APPDATA%\bandstand\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bandstand")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Bandstand Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (BANDSTAND_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Path to the SQLite database
#
# Can also be set via:
# - CLI: bandstand --db /custom/path.db band mine
# - Environment: BANDSTAND_DATABASE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/bandstand.db"

# Served root for uploaded documents. Files are named by a generated id,
# never by the uploaded title.
#documents_dir = "/path/to/documents"

# Uploads are written here first and renamed into documents_dir once
# accepted. Keep it on the same filesystem as documents_dir.
#staging_dir = "/path/to/staging"

# How long a database call may wait for a lock before failing
#busy_timeout_ms = 3000

# Staged files older than this many seconds are removed by the sweep
#staging_max_age_secs = 3600

[logging]
level = "info"
coloured = true
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.database_path.as_os_str().is_empty());
        assert_ne!(config.documents_dir, config.staging_dir);
        assert_eq!(config.busy_timeout(), Duration::from_secs(3));
        assert_eq!(config.staging_max_age(), Duration::from_secs(3600));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_load() {
        // Should not fail even if config file doesn't exist
        let result = Config::load();
        assert!(result.is_ok());
    }

    #[test]
    fn test_config_with_custom_db_path() {
        let custom_path = PathBuf::from("/tmp/test.db");
        let config = Config::load_with_db_path(custom_path.clone());
        assert!(config.is_ok());
        assert_eq!(config.unwrap().database_path, custom_path);
    }
}
