use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_feed_base_url() -> String {
    "https://sandbox.plaid.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// External feed connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub secret: Option<String>,
    /// Per-request timeout against the feed. A stalled page fetch aborts
    /// the sync call instead of blocking it indefinitely.
    pub request_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_base_url(),
            client_id: None,
            secret: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl FeedConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// On-disk configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Blob data directory. Relative paths resolve against the config
    /// file's directory.
    pub data_dir: Option<PathBuf>,

    /// Address the HTTP server binds to.
    pub bind_addr: Option<String>,

    pub feed: FeedConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.join("data"),
        }
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./spendbook.toml` if it exists in the current directory
/// 2. `~/.local/share/spendbook/spendbook.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("spendbook.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("spendbook").join("spendbook.toml");
    }

    local_config
}

/// Loaded configuration with resolved paths and feed credentials.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub bind_addr: String,
    pub feed_base_url: String,
    pub feed_client_id: Option<SecretString>,
    pub feed_secret: Option<SecretString>,
    pub feed_request_timeout: Duration,
}

impl ResolvedConfig {
    /// Load and resolve config from a file path, falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };

        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?
            .to_path_buf();

        let config = Config::load_or_default(&config_path)?;
        let data_dir = config.resolve_data_dir(&config_dir);
        let feed_request_timeout = config.feed.request_timeout();

        // Environment variables win over the config file for credentials,
        // so secrets can stay out of the TOML.
        let client_id = std::env::var("SPENDBOOK_FEED_CLIENT_ID")
            .ok()
            .or(config.feed.client_id);
        let secret = std::env::var("SPENDBOOK_FEED_SECRET")
            .ok()
            .or(config.feed.secret);

        Ok(Self {
            data_dir,
            bind_addr: config.bind_addr.unwrap_or_else(default_bind_addr),
            feed_base_url: config.feed.base_url,
            feed_client_id: client_id.map(|v| SecretString::new(v.into())),
            feed_secret: secret.map(|v| SecretString::new(v.into())),
            feed_request_timeout,
        })
    }
}
