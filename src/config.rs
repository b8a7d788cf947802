//! Backup configuration
//!
//! The config is a JSON file, read from `$SITEVAULT_CONFIG` when set and
//! otherwise from the platform config directory under "sitevault/".

use crate::chunked_upload::DEFAULT_CHUNK_SIZE;
use crate::error::{BackupError, BackupResult};
use crate::folder_sync::DEFAULT_UPLOAD_WORKERS;
use crate::retention::DEFAULT_DELETE_WORKERS;
use crate::uploader::DEFAULT_MAX_RETRIES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const APP_DIR_NAME: &str = "sitevault";
const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "SITEVAULT_CONFIG";

/// OAuth app credentials for the storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageCredentials {
    pub app_key: String,
    pub app_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Short identifier used in remote paths, artifact names, and alerts.
    pub site_name: String,
    /// Local directory being backed up.
    pub root_dir: PathBuf,
    /// Remote destination folder. Defaults to "/{site_name}".
    #[serde(default)]
    pub remote_folder: Option<String>,
    /// MySQL database to dump alongside the files, when set.
    #[serde(default)]
    pub database: Option<String>,
    /// Remote files strictly older than this many days are deleted.
    pub retention_days: i64,
    /// Mirror the site tree file-by-file instead of uploading one archive.
    #[serde(default)]
    pub mirror_tree: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_upload_workers")]
    pub upload_workers: usize,
    #[serde(default = "default_delete_workers")]
    pub delete_workers: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    pub storage: StorageCredentials,
    /// Sites pinged before the backup. Any non-200 response or transport
    /// error raises an alert. Bare hostnames are checked over HTTPS.
    #[serde(default)]
    pub check_sites: Vec<String>,
    /// Webhook URL for failure alerts. Alerts fall back to the log when unset.
    #[serde(default)]
    pub notify_webhook: Option<String>,
    /// Where archive-mode artifacts are staged. Defaults to the system temp dir.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_upload_workers() -> usize {
    DEFAULT_UPLOAD_WORKERS
}

fn default_delete_workers() -> usize {
    DEFAULT_DELETE_WORKERS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Get the path the config is read from.
pub fn config_file_path() -> BackupResult<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| BackupError::Config("could not find config directory".to_string()))?;
    Ok(config_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Get the directory where log files are written: `~/.sitevault/logs`.
pub fn logs_dir() -> BackupResult<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| BackupError::Config("could not find home directory".to_string()))?;
    Ok(home_dir.join(format!(".{APP_DIR_NAME}")).join("logs"))
}

impl BackupConfig {
    /// Load and validate the configuration.
    pub fn load() -> BackupResult<Self> {
        let path = config_file_path()?;
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            BackupError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            BackupError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BackupResult<()> {
        if self.site_name.trim().is_empty() {
            return Err(BackupError::Config("site_name must not be empty".to_string()));
        }
        if self.retention_days < 0 {
            return Err(BackupError::Config(
                "retention_days must not be negative".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(BackupError::Config("chunk_size must not be zero".to_string()));
        }
        if let Some(folder) = &self.remote_folder {
            if !folder.starts_with('/') {
                return Err(BackupError::Config(
                    "remote_folder must start with '/'".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn remote_folder(&self) -> String {
        self.remote_folder
            .clone()
            .unwrap_or_else(|| format!("/{}", self.site_name))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
