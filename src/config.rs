//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::epg::{FilterOptions, DEFAULT_HORIZON_DAYS};
use crate::error::{GrabberError, GrabberResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrabberConfig {
    /// Forward window for programmes, in days
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default = "default_output_path")]
    pub output_path: String,
    #[serde(default = "default_true")]
    pub compress_output: bool,
    // Fetcher settings
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_horizon_days() -> u32 { DEFAULT_HORIZON_DAYS }
fn default_output_path() -> String { "myepg.xml.gz".to_string() }
fn default_true() -> bool { true }
fn default_user_agent() -> String { "EpgGrabber/1.0".to_string() }
fn default_connect_timeout() -> u64 { 30 }
fn default_read_timeout() -> u64 { 120 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay() -> u64 { 2000 }

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            output_path: default_output_path(),
            compress_output: true,
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl GrabberConfig {
    /// `<config_dir>/epg_grabber/config.json`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("epg_grabber");
        path.push("config.json");
        path
    }

    /// Load from `path`. A missing file yields defaults; a file that exists
    /// but cannot be read or parsed is an error.
    pub fn load_from(path: &Path) -> GrabberResult<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| GrabberError::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        serde_json::from_str(&content).map_err(|e| GrabberError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn save_to(&self, path: &Path) -> GrabberResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| GrabberError::Config {
                message: format!("{}: {}", parent.display(), e),
            })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| GrabberError::Config {
            message: e.to_string(),
        })?;
        fs::write(path, content).map_err(|e| GrabberError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            horizon_days: self.horizon_days,
            reference_time: None,
        }
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            max_retries: self.max_retries.max(1),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Settings handed to the fetcher
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Total attempts per address, at least one
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        GrabberConfig::default().download_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GrabberConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, GrabberConfig::default());
        assert_eq!(config.horizon_days, 2);
        assert!(config.compress_output);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "horizon_days": 5, "output_path": "guide.xml" }"#).unwrap();

        let config = GrabberConfig::load_from(&path).unwrap();
        assert_eq!(config.horizon_days, 5);
        assert_eq!(config.output_path, "guide.xml");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.filter_options().horizon_days, 5);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            GrabberConfig::load_from(&path),
            Err(GrabberError::Config { .. })
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = GrabberConfig {
            horizon_days: 4,
            compress_output: false,
            ..GrabberConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(GrabberConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_download_config_always_tries_once() {
        let config = GrabberConfig {
            max_retries: 0,
            ..GrabberConfig::default()
        };
        assert_eq!(config.download_config().max_retries, 1);
    }
}
