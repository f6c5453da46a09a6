use crate::utils::join_url;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Topic the upload service publishes finished uploads on
pub const DEFAULT_NOTIFY_TOPIC: &str = "xyz.tempus.mapupload.upload_finished";

fn default_download_limit() -> usize {
    4
}

fn default_check_interval_secs() -> u64 {
    60
}

fn default_extract_command() -> String {
    "aunpack".to_string()
}

fn default_extract_timeout_secs() -> u64 {
    300
}

fn default_notify_topic() -> String {
    DEFAULT_NOTIFY_TOPIC.to_string()
}

/// Where the remote map listing comes from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ListingConfig {
    /// Scrape the HTML index served at the fetch URL
    #[default]
    WebList,
    /// Read an object-storage bucket listing document
    #[serde(rename_all = "camelCase")]
    Bucket { list_url: String, key_prefix: String },
}

/// Notification bus connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyConfig {
    pub server: String,
    pub realm: String,
    #[serde(default = "default_notify_topic")]
    pub topic: String,
}

/// What happens to local maps the remote no longer lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalePolicy {
    /// Remove the file outright
    Delete,
    /// Move the file into the quarantine folder for manual recovery
    Quarantine,
}

/// Map updater configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdaterConfig {
    pub maps_path: PathBuf,
    pub fetch_url: String,
    #[serde(default)]
    pub listing: ListingConfig,
    /// Hard-delete stale maps instead of quarantining them
    #[serde(default)]
    pub delete_if_not_present: bool,
    /// Maximum number of maps downloaded at once
    #[serde(default = "default_download_limit")]
    pub download_limit: usize,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_extract_command")]
    pub extract_command: String,
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<NotifyConfig>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            maps_path: PathBuf::new(),
            fetch_url: String::new(),
            listing: ListingConfig::default(),
            delete_if_not_present: false,
            download_limit: default_download_limit(),
            check_interval_secs: default_check_interval_secs(),
            extract_command: default_extract_command(),
            extract_timeout_secs: default_extract_timeout_secs(),
            notify: None,
        }
    }
}

impl UpdaterConfig {
    pub fn stale_policy(&self) -> StalePolicy {
        if self.delete_if_not_present {
            StalePolicy::Delete
        } else {
            StalePolicy::Quarantine
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    /// Parse the fetch URL, which must be able to take path segments
    pub fn fetch_base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.fetch_url)
            .map_err(|e| ConfigError::Invalid(format!("fetch URL {:?}: {}", self.fetch_url, e)))?;
        if join_url(&url, "probe").is_none() {
            return Err(ConfigError::Invalid(format!(
                "fetch URL {:?} cannot be used as a base URL",
                self.fetch_url
            )));
        }
        Ok(url)
    }

    /// Check the configuration for values the updater cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maps_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("maps path is required".to_string()));
        }
        if self.fetch_url.is_empty() {
            return Err(ConfigError::Invalid("fetch URL is required".to_string()));
        }
        self.fetch_base_url()?;

        if let ListingConfig::Bucket { list_url, key_prefix } = &self.listing {
            if list_url.is_empty() {
                return Err(ConfigError::Invalid(
                    "list URL is required for bucket listings".to_string(),
                ));
            }
            Url::parse(list_url)
                .map_err(|e| ConfigError::Invalid(format!("list URL {:?}: {}", list_url, e)))?;
            if key_prefix.is_empty() {
                return Err(ConfigError::Invalid(
                    "key prefix is required for bucket listings".to_string(),
                ));
            }
        }

        if self.download_limit == 0 {
            return Err(ConfigError::Invalid(
                "download limit must be at least 1".to_string(),
            ));
        }
        if self.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "check interval must be at least 1 second".to_string(),
            ));
        }
        if let Some(notify) = &self.notify {
            if notify.server.is_empty() || notify.realm.is_empty() {
                return Err(ConfigError::Invalid(
                    "notification server and realm must both be set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Read a configuration file
pub async fn read_config(config_path: &Path) -> Result<UpdaterConfig, ConfigError> {
    let content = fs::read_to_string(config_path).await?;
    let config: UpdaterConfig = serde_json::from_str(&content)?;
    Ok(config)
}
