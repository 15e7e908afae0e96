//! Configuration management for blocksync.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::enforcer::BackendKind;
use crate::error::SyncError;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/blocksync/config.yaml";

/// Environment variable overriding the feed access key
pub const FEED_KEY_ENV: &str = "BLOCKSYNC_FEED_KEY";

/// Secure string type that zeroizes memory on drop.
/// Holds the feed access key.
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote blacklist/whitelist feed
    pub feed: FeedConfig,

    /// Process IPv6 lists and rules as well as IPv4
    pub dual_stack: bool,

    /// Firewall backend (auto, firewalld, iptables, netsh)
    pub backend: BackendChoice,

    /// Activity log, appended to on every run
    pub log_file: PathBuf,

    /// Lock file preventing overlapping runs
    pub lock_file: PathBuf,

    /// Upper bound on each firewall tool invocation
    pub command_timeout_secs: u64,

    /// Exit non-zero when any rule operation failed
    pub strict_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            dual_stack: true,
            backend: BackendChoice::Auto,
            log_file: PathBuf::from("/var/log/blocksync.log"),
            lock_file: PathBuf::from("/var/run/blocksync.lock"),
            command_timeout_secs: 30,
            strict_exit: false,
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), SyncError> {
        let invalid = |msg: String| Err(SyncError::Config(msg));

        if !self.feed.url.starts_with("https://") {
            return invalid(format!("Feed URL must use HTTPS: {}", self.feed.url));
        }

        if self.feed.timeout_secs == 0 {
            return invalid("feed.timeout_secs must be greater than zero".to_string());
        }

        if self.command_timeout_secs == 0 {
            return invalid("command_timeout_secs must be greater than zero".to_string());
        }

        if self.log_file.as_os_str().is_empty() {
            return invalid("log_file must not be empty".to_string());
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Endpoint returning the JSON document
    pub url: String,
    /// Access key sent as the `key` query parameter.
    /// Can also come from BLOCKSYNC_FEED_KEY or `key_env`.
    pub key: SecureString,
    /// Environment variable name to read the key from (optional)
    pub key_env: Option<String>,
    /// HTTP request timeout
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://blacklist.example.com/api.php".to_string(),
            key: SecureString::default(),
            key_env: None,
            timeout_secs: 30,
        }
    }
}

impl FeedConfig {
    /// Get the effective key, checking env vars first
    pub fn get_key(&self) -> SecureString {
        if let Some(ref env_name) = self.key_env {
            if let Ok(val) = env::var(env_name) {
                return SecureString::new(val);
            }
        }
        if let Ok(val) = env::var(FEED_KEY_ENV) {
            return SecureString::new(val);
        }
        self.key.clone()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Probe firewalld, then iptables, then netsh
    #[default]
    Auto,
    Firewalld,
    Iptables,
    Netsh,
}

impl BackendChoice {
    /// The forced backend, or `None` for auto-detection
    pub fn kind(self) -> Option<BackendKind> {
        match self {
            BackendChoice::Auto => None,
            BackendChoice::Firewalld => Some(BackendKind::Firewalld),
            BackendChoice::Iptables => Some(BackendKind::Iptables),
            BackendChoice::Netsh => Some(BackendKind::Netsh),
        }
    }
}
